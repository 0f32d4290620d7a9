//! Asynchronous monitoring of accepted transfers.
//!
//! Every pending transaction gets one watch that races the ledger's
//! confirmation against a fixed deadline and records whichever comes first.

pub mod confirmation;

pub use confirmation::{ConfirmationMonitor, TIMEOUT_ERROR};
