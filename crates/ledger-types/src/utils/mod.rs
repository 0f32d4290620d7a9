//! Utility functions for common conversions and formatting.
//!
//! This module provides the serde helpers that keep 64-bit integers exact in
//! persisted state, token amount formatting, and timestamp retrieval.

pub mod formatting;
pub mod helpers;
pub mod serde_u64;

pub use formatting::format_tokens;
pub use helpers::{current_timestamp_millis, current_timestamp_nanos};
