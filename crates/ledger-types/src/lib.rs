//! Common types module for the ledger transaction engine.
//!
//! This module defines the core data types shared by every engine crate:
//! transaction records and their lifecycle, transfer arguments and ledger
//! rejections, storage keys and the implementation registry used to wire
//! pluggable backends from configuration.

/// Implementation registry for config-selected backends.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Transaction record types and lifecycle transitions.
pub mod transaction;
/// Transfer request, rejection and identity types.
pub mod transfer;
/// Utility functions for serialization, formatting and timestamps.
pub mod utils;

pub use registry::ImplementationRegistry;
pub use storage::*;
pub use transaction::*;
pub use transfer::*;
pub use utils::{current_timestamp_millis, current_timestamp_nanos, format_tokens};
