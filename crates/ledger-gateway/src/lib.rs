//! Ledger gateway module for the ledger transaction engine.
//!
//! This module defines the narrow interface the engine uses to reach the
//! external ledger: submitting transfers, looking up whether an accepted
//! transfer has settled, and querying balances. Concrete gateways are
//! selected from configuration through the implementation registry.

use async_trait::async_trait;
use ledger_types::{
	BlockIndex, ConfirmationData, Identity, ImplementationRegistry, Tokens, TransferError,
	TransferRequest,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod simulated;
}

/// Errors that can occur while talking to the ledger.
///
/// `Rejected` is the ledger answering with a structured refusal; every other
/// variant means the ledger's answer was never obtained.
#[derive(Debug, Error)]
pub enum GatewayError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The ledger refused the transfer.
	#[error("Transfer rejected: {0}")]
	Rejected(TransferError),
	/// The ledger answered with something the gateway could not interpret.
	#[error("Invalid ledger response: {0}")]
	InvalidResponse(String),
	/// A call was made before `connect`.
	#[error("Gateway not connected")]
	NotConnected,
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface to the external ledger.
///
/// Implementations must be safe to call concurrently; the engine issues
/// transfers and confirmation checks from many tasks at once.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
	/// Establishes the session used for subsequent calls.
	async fn connect(&self, identity: &Identity) -> Result<(), GatewayError>;

	/// Submits a transfer and returns the block index the ledger assigned.
	async fn submit_transfer(&self, request: &TransferRequest) -> Result<BlockIndex, GatewayError>;

	/// Looks up settlement of an accepted transfer.
	///
	/// Returns `None` while the transfer is not settled yet.
	async fn check_confirmation(
		&self,
		index: BlockIndex,
	) -> Result<Option<ConfirmationData>, GatewayError>;

	/// Returns the balance of an account.
	async fn get_balance(&self, account: &str) -> Result<Tokens, GatewayError>;
}

/// Type alias for gateway factory functions.
pub type GatewayFactory = fn(&toml::Value) -> Result<Box<dyn LedgerGateway>, GatewayError>;

/// Registry trait for gateway implementations.
pub trait GatewayRegistry: ImplementationRegistry<Factory = GatewayFactory> {}

/// Get all registered gateway implementations.
pub fn get_all_implementations() -> Vec<(&'static str, GatewayFactory)> {
	use implementations::{http, simulated};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(simulated::Registry::NAME, simulated::Registry::factory()),
	]
}
