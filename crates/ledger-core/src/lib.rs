//! Core engine for the ledger transaction client.
//!
//! Ties the gateway, the transaction store and the confirmation monitor
//! together behind `LedgerClient`, and builds a client from configuration
//! through `LedgerBuilder`.

pub mod builder;
pub mod client;
pub mod monitoring;
pub mod recovery;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, LedgerBuilder, LedgerFactories};
pub use client::{ClientError, LedgerClient};
pub use monitoring::{ConfirmationMonitor, TIMEOUT_ERROR};
pub use recovery::RecoveryReport;
