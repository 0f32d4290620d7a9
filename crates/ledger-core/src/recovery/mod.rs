//! Resumes confirmation watches for transfers left pending by a previous run.
//!
//! A pending record keeps its original deadline across restarts: the watch is
//! resumed with whatever part of the timeout is left, measured from the
//! record's `created_at`. Records already past their deadline get a single
//! confirmation check before they are failed.

use crate::monitoring::ConfirmationMonitor;
use ledger_storage::TransactionStore;
use ledger_types::{current_timestamp_millis, TransactionStatus};
use std::time::Duration;
use tracing::instrument;

/// Report of the recovery operation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Pending records whose watch was resumed with time left.
	pub resumed: usize,
	/// Pending records already past their deadline.
	pub expired: usize,
}

/// Time left before a record created at `created_at` times out.
pub(crate) fn remaining_time(created_at: u64, now: u64, timeout: Duration) -> Duration {
	let elapsed = Duration::from_millis(now.saturating_sub(created_at));
	timeout.saturating_sub(elapsed)
}

/// Starts a watch for every pending record in the store.
#[instrument(skip_all)]
pub async fn resume_pending(
	store: &TransactionStore,
	monitor: &ConfirmationMonitor,
) -> RecoveryReport {
	let mut report = RecoveryReport::default();
	let pending = store.list_by_status(TransactionStatus::Pending).await;
	if pending.is_empty() {
		return report;
	}

	let now = current_timestamp_millis();
	for record in pending {
		let Some(index) = record.id.block_index() else {
			continue;
		};
		let remaining = remaining_time(record.created_at, now, monitor.timeout());
		if remaining.is_zero() {
			report.expired += 1;
		} else {
			report.resumed += 1;
		}
		monitor.watch(index, remaining);
	}

	tracing::info!(
		resumed = report.resumed,
		expired = report.expired,
		"Resumed pending transactions"
	);
	report
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::ScriptedGateway;
	use ledger_config::MonitorConfig;
	use ledger_storage::implementations::memory::MemoryStorage;
	use ledger_types::{TransactionId, TransactionRecord, TransferArgs};
	use std::sync::Arc;

	#[test]
	fn test_remaining_time() {
		let timeout = Duration::from_secs(60);
		assert_eq!(remaining_time(1_000, 1_000, timeout), timeout);
		assert_eq!(
			remaining_time(1_000, 21_000, timeout),
			Duration::from_secs(40)
		);
		assert_eq!(remaining_time(1_000, 100_000, timeout), Duration::ZERO);
		// A clock that went backwards does not extend the deadline
		assert_eq!(remaining_time(5_000, 1_000, timeout), timeout);
	}

	#[tokio::test(start_paused = true)]
	async fn test_resume_pending() {
		let gateway = Arc::new(ScriptedGateway::new());
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		store.load().await;

		let args = TransferArgs::new("account-id", 1, 10_000);
		let now = current_timestamp_millis();
		store
			.put(TransactionRecord::pending(1, &args, now))
			.await
			.unwrap();
		store
			.put(TransactionRecord::pending(2, &args, now - 120_000))
			.await
			.unwrap();
		store
			.put(TransactionRecord::failed(
				TransactionId::Local(0),
				&args,
				"Ledger temporarily unavailable",
				now,
			))
			.await
			.unwrap();

		let monitor = ConfirmationMonitor::new(gateway, store.clone(), &MonitorConfig::default());
		let report = resume_pending(&store, &monitor).await;
		assert_eq!(
			report,
			RecoveryReport {
				resumed: 1,
				expired: 1
			}
		);
		assert!(monitor.is_watching(&TransactionId::Block(1)));

		tokio::time::advance(Duration::from_millis(10)).await;
		tokio::task::yield_now().await;
		let expired = store.get(&TransactionId::Block(2)).await.unwrap();
		assert_eq!(expired.status, TransactionStatus::Failed);
		assert_eq!(
			expired.error.as_deref(),
			Some(crate::monitoring::TIMEOUT_ERROR)
		);
		assert!(store.get(&TransactionId::Block(1)).await.unwrap().is_pending());

		monitor.shutdown().await;
	}
}
