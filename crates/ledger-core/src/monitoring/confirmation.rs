//! Confirmation watches for pending transactions.
//!
//! A watch polls `LedgerGateway::check_confirmation` at a fixed interval,
//! first one interval after it starts, until the ledger reports settlement or
//! the deadline passes. Each watch owns a child of the monitor's root
//! cancellation token, so `shutdown` can stop all of them at once and then
//! wait for every task to exit.

use futures::future::join_all;
use ledger_config::MonitorConfig;
use ledger_gateway::LedgerGateway;
use ledger_storage::TransactionStore;
use ledger_types::{
	current_timestamp_millis, BlockIndex, ConfirmationData, SettlementOutcome, TransactionId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Failure reason recorded when a transfer is not confirmed in time.
pub const TIMEOUT_ERROR: &str = "Transaction timeout";

type WatchMap = HashMap<TransactionId, JoinHandle<()>>;

/// Everything a watch task needs, cloned into each task.
#[derive(Clone)]
struct WatchContext {
	gateway: Arc<dyn LedgerGateway>,
	store: Arc<TransactionStore>,
	poll_interval: Duration,
	watches: Arc<Mutex<WatchMap>>,
}

/// Owns one cancellable watch per pending transaction.
pub struct ConfirmationMonitor {
	context: WatchContext,
	timeout: Duration,
	root: Mutex<CancellationToken>,
}

impl ConfirmationMonitor {
	pub fn new(
		gateway: Arc<dyn LedgerGateway>,
		store: Arc<TransactionStore>,
		config: &MonitorConfig,
	) -> Self {
		Self {
			context: WatchContext {
				gateway,
				store,
				poll_interval: config.poll_interval(),
				watches: Arc::new(Mutex::new(HashMap::new())),
			},
			timeout: config.timeout(),
			root: Mutex::new(CancellationToken::new()),
		}
	}

	/// Deadline applied to every newly accepted transfer.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Starts watching an accepted transfer.
	///
	/// `remaining` is the time left until the transfer is failed with
	/// [`TIMEOUT_ERROR`]. A watch started with nothing remaining performs a
	/// single confirmation check before failing. Returns `false` if the
	/// transfer is already being watched.
	pub fn watch(&self, index: BlockIndex, remaining: Duration) -> bool {
		let id = TransactionId::Block(index);
		let cancel = lock(&self.root).child_token();

		// Held across the spawn so a watch that finishes immediately cannot
		// deregister before it is registered.
		let mut watches = lock(&self.context.watches);
		if watches.contains_key(&id) {
			return false;
		}

		let deadline = Instant::now() + remaining;
		let context = self.context.clone();
		let task = tokio::spawn(async move {
			context.run(index, deadline, cancel).await;
			lock(&context.watches).remove(&id);
		});
		watches.insert(id, task);

		tracing::debug!(tx_id = %id, remaining_secs = remaining.as_secs(), "Watching transaction");
		true
	}

	/// Number of watches that have not resolved yet.
	pub fn active_watches(&self) -> usize {
		lock(&self.context.watches).len()
	}

	pub fn is_watching(&self, id: &TransactionId) -> bool {
		lock(&self.context.watches).contains_key(id)
	}

	/// Cancels every watch and waits until all watch tasks have exited.
	///
	/// Watches started afterwards use a fresh root token, so the monitor can
	/// be reused after a shutdown.
	pub async fn shutdown(&self) {
		{
			let mut root = lock(&self.root);
			root.cancel();
			*root = CancellationToken::new();
		}

		let tasks: Vec<JoinHandle<()>> = lock(&self.context.watches)
			.drain()
			.map(|(_, task)| task)
			.collect();
		let count = tasks.len();

		for result in join_all(tasks).await {
			if let Err(e) = result {
				tracing::error!(error = %e, "Watch task ended abnormally");
			}
		}
		tracing::debug!(watches = count, "Stopped confirmation monitor");
	}
}

impl WatchContext {
	#[instrument(skip_all, fields(tx_id = index))]
	async fn run(&self, index: BlockIndex, deadline: Instant, cancel: CancellationToken) {
		if Instant::now() >= deadline {
			let confirmation = tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				confirmation = self.check(index) => confirmation,
			};
			match confirmation {
				Some(confirmation) => self.confirm(index, confirmation).await,
				None => self.expire(index).await,
			}
			return;
		}

		let mut ticker =
			tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let expiry = tokio::time::sleep_until(deadline);
		tokio::pin!(expiry);

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				_ = &mut expiry => {
					self.expire(index).await;
					return;
				},
				_ = ticker.tick() => {},
			}

			// Only the ledger call races the deadline. Once a confirmation is
			// seen, recording it must not be interrupted.
			let confirmation = tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				_ = &mut expiry => {
					self.expire(index).await;
					return;
				},
				confirmation = self.check(index) => confirmation,
			};
			if let Some(confirmation) = confirmation {
				self.confirm(index, confirmation).await;
				return;
			}
		}
	}

	/// Polls the ledger once.
	async fn check(&self, index: BlockIndex) -> Option<ConfirmationData> {
		match self.gateway.check_confirmation(index).await {
			Ok(Some(confirmation)) => Some(confirmation),
			Ok(None) => {
				tracing::trace!("Waiting for confirmation");
				None
			},
			Err(e) => {
				tracing::warn!(error = %e, "Confirmation check failed");
				None
			},
		}
	}

	async fn confirm(&self, index: BlockIndex, confirmation: ConfirmationData) {
		let settled_at = confirmation
			.settled_at
			.unwrap_or_else(current_timestamp_millis);
		self.settle(index, SettlementOutcome::Confirmed, settled_at)
			.await;
	}

	async fn expire(&self, index: BlockIndex) {
		tracing::warn!("Transaction not confirmed before deadline");
		self.settle(
			index,
			SettlementOutcome::Failed {
				reason: TIMEOUT_ERROR.to_string(),
			},
			current_timestamp_millis(),
		)
		.await;
	}

	async fn settle(&self, index: BlockIndex, outcome: SettlementOutcome, settled_at: u64) {
		let id = TransactionId::Block(index);
		match self.store.settle(&id, &outcome, settled_at).await {
			Ok(Some(record)) => {
				tracing::info!(status = %record.status, "Settled");
			},
			Ok(None) => {
				tracing::debug!("Transaction already settled or unknown");
			},
			Err(e) => {
				tracing::error!(error = %e, "Failed to record settlement");
			},
		}
	}
}

/// Locks a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
