//! Client facade over the ledger engine.
//!
//! `LedgerClient` is the only component callers talk to. It submits transfers
//! through the gateway, records every attempt in the transaction store, and
//! hands accepted transfers to the confirmation monitor. `transfer` returns
//! as soon as the ledger answers; the final outcome of an accepted transfer
//! is observed through the record's status.

use crate::monitoring::ConfirmationMonitor;
use crate::recovery;
use ledger_config::MonitorConfig;
use ledger_gateway::{GatewayError, LedgerGateway};
use ledger_storage::{StorageError, TransactionStore};
use ledger_types::{
	current_timestamp_millis, current_timestamp_nanos, Identity, Tokens, TransactionId,
	TransactionRecord, TransactionStatus, TransferArgs, TransferError, TransferRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The client has not been initialized, or has been destroyed.
	#[error("Client not initialized")]
	NotInitialized,
	/// The transfer arguments were rejected before reaching the ledger.
	#[error("Invalid arguments: {0}")]
	InvalidArgs(String),
	/// The ledger refused the transfer.
	#[error("{0}")]
	Rejected(TransferError),
	/// The ledger could not be reached or answered unexpectedly.
	#[error("Network error: {0}")]
	Network(GatewayError),
	/// The transaction history could not be written.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Client for submitting transfers and tracking their outcome.
pub struct LedgerClient {
	gateway: Arc<dyn LedgerGateway>,
	store: Arc<TransactionStore>,
	monitor: ConfirmationMonitor,
	/// Lifecycle flag. Transfers hold a read guard while recording their
	/// outcome so `destroy` cannot interleave with that step.
	initialized: RwLock<bool>,
}

impl LedgerClient {
	pub fn new(
		gateway: Arc<dyn LedgerGateway>,
		store: Arc<TransactionStore>,
		monitor_config: MonitorConfig,
	) -> Self {
		let monitor = ConfirmationMonitor::new(gateway.clone(), store.clone(), &monitor_config);
		Self {
			gateway,
			store,
			monitor,
			initialized: RwLock::new(false),
		}
	}

	/// Connects to the ledger, loads persisted history and resumes watches
	/// for transfers that were still pending.
	///
	/// Corrupt or unreadable history never makes this fail; the client then
	/// starts with an empty history. Calling it on an initialized client does
	/// nothing.
	#[instrument(skip_all, fields(identity = %identity))]
	pub async fn initialize(&self, identity: &Identity) -> Result<(), ClientError> {
		let mut initialized = self.initialized.write().await;
		if *initialized {
			tracing::debug!("Client already initialized");
			return Ok(());
		}

		self.gateway
			.connect(identity)
			.await
			.map_err(ClientError::Network)?;

		let loaded = self.store.load().await;
		let report = recovery::resume_pending(&self.store, &self.monitor).await;
		*initialized = true;

		tracing::info!(
			records = loaded,
			pending = report.resumed + report.expired,
			"Initialized ledger client"
		);
		Ok(())
	}

	/// Submits a transfer.
	///
	/// Returns the block index assigned by the ledger once it accepts the
	/// transfer, without waiting for confirmation. A rejected or undelivered
	/// transfer is recorded as failed under a local id and its error returned.
	///
	/// If the client is destroyed while the ledger call is in flight, an
	/// accepted transfer is still written to storage and its id returned; it
	/// is watched again on the next `initialize`. A failed one is not recorded.
	#[instrument(skip_all, fields(to = %args.to, amount = args.amount))]
	pub async fn transfer(&self, args: TransferArgs) -> Result<TransactionId, ClientError> {
		if !self.is_initialized().await {
			return Err(ClientError::NotInitialized);
		}
		args.validate().map_err(ClientError::InvalidArgs)?;

		let request = TransferRequest::from_args(&args, Some(current_timestamp_nanos()));
		let result = self.gateway.submit_transfer(&request).await;

		let initialized = self.initialized.read().await;
		let created_at = current_timestamp_millis();

		if !*initialized {
			return match result {
				Ok(index) => {
					let record = TransactionRecord::pending(index, &args, created_at);
					let id = record.id;
					self.store.create_durable(record).await.map_err(|e| {
						tracing::error!(tx_id = %id, error = %e, "Failed to record accepted transfer");
						ClientError::Storage(e)
					})?;
					tracing::warn!(tx_id = %id, "Transfer accepted after client was destroyed, not watching it");
					Ok(id)
				},
				Err(e) => {
					tracing::warn!(error = %e, "Client destroyed while transfer was in flight, not recording it");
					Err(client_error(e))
				},
			};
		}

		match result {
			Ok(index) => {
				let record = TransactionRecord::pending(index, &args, created_at);
				let id = record.id;
				self.store.create(record).await.map_err(|e| {
					tracing::error!(tx_id = %id, error = %e, "Failed to record accepted transfer");
					ClientError::Storage(e)
				})?;
				self.monitor.watch(index, self.monitor.timeout());
				tracing::info!(tx_id = %id, "Transfer accepted");
				Ok(id)
			},
			Err(GatewayError::Rejected(rejection)) => {
				let id = self
					.record_failure(&args, rejection.to_string(), created_at)
					.await;
				tracing::warn!(tx_id = %id, reason = %rejection, "Transfer rejected");
				Err(ClientError::Rejected(rejection))
			},
			Err(e) => {
				let id = self.record_failure(&args, e.to_string(), created_at).await;
				tracing::warn!(tx_id = %id, error = %e, "Transfer not delivered");
				Err(ClientError::Network(e))
			},
		}
	}

	/// Records a transfer the ledger never accepted.
	///
	/// A storage failure here is logged; the caller still gets the ledger's
	/// answer rather than the storage error.
	async fn record_failure(
		&self,
		args: &TransferArgs,
		error: String,
		created_at: u64,
	) -> TransactionId {
		let id = self.store.allocate_local_id().await;
		let record = TransactionRecord::failed(id, args, error, created_at);
		if let Err(e) = self.store.create(record).await {
			tracing::error!(tx_id = %id, error = %e, "Failed to record failed transfer");
		}
		id
	}

	/// Returns the record with the given id.
	pub async fn get_transaction(&self, id: &TransactionId) -> Option<TransactionRecord> {
		self.store.get(id).await
	}

	/// Returns every transaction still waiting for confirmation.
	pub async fn get_pending_transactions(&self) -> Vec<TransactionRecord> {
		self.store.list_by_status(TransactionStatus::Pending).await
	}

	/// Returns the full history ordered by id.
	pub async fn get_transactions(&self) -> Vec<TransactionRecord> {
		self.store.list().await
	}

	/// Queries the ledger balance of an account.
	#[instrument(skip_all, fields(account = %account))]
	pub async fn get_balance(&self, account: &str) -> Result<Tokens, ClientError> {
		if !self.is_initialized().await {
			return Err(ClientError::NotInitialized);
		}
		self.gateway
			.get_balance(account)
			.await
			.map_err(ClientError::Network)
	}

	/// Stops every watch and wipes the history from memory and storage.
	pub async fn clear_history(&self) -> Result<(), ClientError> {
		let initialized = self.initialized.read().await;
		if !*initialized {
			return Err(ClientError::NotInitialized);
		}
		self.monitor.shutdown().await;
		self.store.clear().await?;
		tracing::info!("Cleared transaction history");
		Ok(())
	}

	/// Tears the client down.
	///
	/// Cancels all watches and waits for them to exit, then drops the
	/// in-memory history. Persisted history is kept for the next
	/// `initialize`. No record changes after this returns.
	pub async fn destroy(&self) {
		{
			let mut initialized = self.initialized.write().await;
			if !*initialized {
				return;
			}
			*initialized = false;
		}

		let watches = self.monitor.active_watches();
		self.monitor.shutdown().await;
		self.store.unload().await;
		tracing::info!(watches, "Destroyed ledger client");
	}

	pub async fn is_initialized(&self) -> bool {
		*self.initialized.read().await
	}

	/// Number of transactions currently being watched.
	pub fn active_watches(&self) -> usize {
		self.monitor.active_watches()
	}
}

fn client_error(e: GatewayError) -> ClientError {
	match e {
		GatewayError::Rejected(rejection) => ClientError::Rejected(rejection),
		e => ClientError::Network(e),
	}
}
