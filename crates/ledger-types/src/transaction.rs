//! Transaction record types for the ledger engine.
//!
//! A record is created when a transfer is attempted and moves at most once,
//! from `Pending` to one of the terminal states. All transition helpers here
//! are no-ops on terminal records.

use crate::utils::serde_u64;
use crate::TransferArgs;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ledger-assigned index of an accepted transfer.
pub type BlockIndex = u64;

/// Prefix used when rendering local ids.
const LOCAL_ID_PREFIX: &str = "local-";

/// Identifier of a transaction record.
///
/// Accepted transfers are keyed by the block index the ledger assigned.
/// Attempts the ledger never accepted have no block index and get an id from
/// a separate local sequence so the two namespaces never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransactionId {
	/// Block index assigned by the ledger on acceptance.
	Block(BlockIndex),
	/// Engine-assigned id for a rejected or undelivered transfer.
	Local(u64),
}

impl TransactionId {
	/// Returns the block index if the ledger accepted this transaction.
	pub fn block_index(&self) -> Option<BlockIndex> {
		match self {
			TransactionId::Block(index) => Some(*index),
			TransactionId::Local(_) => None,
		}
	}
}

impl From<BlockIndex> for TransactionId {
	fn from(index: BlockIndex) -> Self {
		TransactionId::Block(index)
	}
}

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransactionId::Block(index) => write!(f, "{}", index),
			TransactionId::Local(n) => write!(f, "{}{}", LOCAL_ID_PREFIX, n),
		}
	}
}

/// Error returned when a string is not a valid transaction id.
#[derive(Debug, Error)]
#[error("Invalid transaction id: {0}")]
pub struct ParseTransactionIdError(String);

impl FromStr for TransactionId {
	type Err = ParseTransactionIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parsed = match s.strip_prefix(LOCAL_ID_PREFIX) {
			Some(local) => local.parse().map(TransactionId::Local),
			None => s.parse().map(TransactionId::Block),
		};
		parsed.map_err(|_| ParseTransactionIdError(s.to_string()))
	}
}

impl Serialize for TransactionId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for TransactionId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Lifecycle status of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
	/// Accepted by the ledger, waiting for confirmation.
	Pending,
	/// Settled on the ledger.
	Confirmed,
	/// Rejected, undeliverable, or not confirmed in time.
	Failed,
}

impl TransactionStatus {
	/// Returns true for states that can never be left.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, TransactionStatus::Pending)
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TransactionStatus::Pending => "pending",
			TransactionStatus::Confirmed => "confirmed",
			TransactionStatus::Failed => "failed",
		};
		f.write_str(s)
	}
}

/// Terminal outcome applied to a pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
	Confirmed,
	Failed { reason: String },
}

/// Persisted record of a single transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Block index for accepted transfers, local id otherwise.
	pub id: TransactionId,
	/// Destination account.
	pub to: String,
	/// Transferred amount in e8s.
	#[serde(with = "serde_u64")]
	pub amount: u64,
	/// Fee paid in e8s.
	#[serde(with = "serde_u64")]
	pub fee: u64,
	/// Caller-supplied correlation value.
	#[serde(with = "serde_u64")]
	pub memo: u64,
	pub status: TransactionStatus,
	/// Human-readable failure reason, only set when `status` is `Failed`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Unix milliseconds of acceptance or of the failed attempt.
	#[serde(with = "serde_u64")]
	pub created_at: u64,
	/// Unix milliseconds of the terminal transition.
	#[serde(
		default,
		with = "serde_u64::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub settled_at: Option<u64>,
}

impl TransactionRecord {
	/// Creates a pending record for a transfer the ledger accepted.
	pub fn pending(index: BlockIndex, args: &TransferArgs, created_at: u64) -> Self {
		Self {
			id: TransactionId::Block(index),
			to: args.to.clone(),
			amount: args.amount,
			fee: args.fee,
			memo: args.memo,
			status: TransactionStatus::Pending,
			error: None,
			created_at,
			settled_at: None,
		}
	}

	/// Creates a record that failed before the ledger accepted it.
	pub fn failed(
		id: TransactionId,
		args: &TransferArgs,
		error: impl Into<String>,
		created_at: u64,
	) -> Self {
		let mut record = Self {
			id,
			to: args.to.clone(),
			amount: args.amount,
			fee: args.fee,
			memo: args.memo,
			status: TransactionStatus::Pending,
			error: None,
			created_at,
			settled_at: None,
		};
		record.settle(
			&SettlementOutcome::Failed {
				reason: error.into(),
			},
			created_at,
		);
		record
	}

	pub fn is_pending(&self) -> bool {
		self.status == TransactionStatus::Pending
	}

	/// Applies a terminal outcome.
	///
	/// Returns `false` and leaves the record untouched if it is already
	/// terminal. An empty failure reason is replaced so a failed record always
	/// carries a message.
	pub fn settle(&mut self, outcome: &SettlementOutcome, settled_at: u64) -> bool {
		if self.status.is_terminal() {
			return false;
		}
		match outcome {
			SettlementOutcome::Confirmed => {
				self.status = TransactionStatus::Confirmed;
				self.error = None;
			},
			SettlementOutcome::Failed { reason } => {
				self.status = TransactionStatus::Failed;
				self.error = Some(if reason.trim().is_empty() {
					"Unknown error".to_string()
				} else {
					reason.clone()
				});
			},
		}
		self.settled_at = Some(settled_at);
		true
	}

	/// Checks the record-level invariants.
	///
	/// Used when loading persisted history, which may have been written by a
	/// different version or edited by hand.
	pub fn check_invariants(&self) -> Result<(), String> {
		match self.status {
			TransactionStatus::Pending => {
				if self.settled_at.is_some() {
					return Err("pending record has settled_at".into());
				}
				if self.error.is_some() {
					return Err("pending record has an error".into());
				}
				if matches!(self.id, TransactionId::Local(_)) {
					return Err("pending record has no block index".into());
				}
			},
			TransactionStatus::Confirmed => {
				if self.settled_at.is_none() {
					return Err("confirmed record has no settled_at".into());
				}
				if self.error.is_some() {
					return Err("confirmed record has an error".into());
				}
			},
			TransactionStatus::Failed => {
				if self.settled_at.is_none() {
					return Err("failed record has no settled_at".into());
				}
				if self.error.as_deref().is_none_or(|e| e.trim().is_empty()) {
					return Err("failed record has no error".into());
				}
			},
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn args() -> TransferArgs {
		TransferArgs::new("account-id", 1_000_000, 10_000).with_memo(1)
	}

	#[test]
	fn test_transaction_id_display_and_parse() {
		assert_eq!(TransactionId::Block(123).to_string(), "123");
		assert_eq!(TransactionId::Local(7).to_string(), "local-7");
		assert_eq!(
			"123".parse::<TransactionId>().unwrap(),
			TransactionId::Block(123)
		);
		assert_eq!(
			"local-7".parse::<TransactionId>().unwrap(),
			TransactionId::Local(7)
		);
		assert!("local-".parse::<TransactionId>().is_err());
		assert!("abc".parse::<TransactionId>().is_err());
	}

	#[test]
	fn test_pending_record() {
		let record = TransactionRecord::pending(123, &args(), 1_000);
		assert_eq!(record.id, TransactionId::Block(123));
		assert_eq!(record.status, TransactionStatus::Pending);
		assert_eq!(record.amount, 1_000_000);
		assert_eq!(record.memo, 1);
		assert!(record.settled_at.is_none());
		assert!(record.check_invariants().is_ok());
	}

	#[test]
	fn test_failed_record_carries_error_and_settled_at() {
		let record =
			TransactionRecord::failed(TransactionId::Local(1), &args(), "Insufficient funds", 5);
		assert_eq!(record.status, TransactionStatus::Failed);
		assert_eq!(record.error.as_deref(), Some("Insufficient funds"));
		assert_eq!(record.settled_at, Some(5));
		assert!(record.check_invariants().is_ok());
	}

	#[test]
	fn test_terminal_state_is_final() {
		let mut record = TransactionRecord::pending(1, &args(), 0);
		assert!(record.settle(&SettlementOutcome::Confirmed, 10));
		assert!(!record.settle(
			&SettlementOutcome::Failed {
				reason: "Transaction timeout".into()
			},
			20
		));
		assert_eq!(record.status, TransactionStatus::Confirmed);
		assert_eq!(record.settled_at, Some(10));
		assert!(record.error.is_none());

		let mut record = TransactionRecord::pending(2, &args(), 0);
		assert!(record.settle(
			&SettlementOutcome::Failed {
				reason: "Transaction timeout".into()
			},
			30
		));
		assert!(!record.settle(&SettlementOutcome::Confirmed, 40));
		assert_eq!(record.status, TransactionStatus::Failed);
		assert_eq!(record.error.as_deref(), Some("Transaction timeout"));
	}

	#[test]
	fn test_empty_failure_reason_is_replaced() {
		let mut record = TransactionRecord::pending(3, &args(), 0);
		record.settle(
			&SettlementOutcome::Failed {
				reason: "  ".into(),
			},
			1,
		);
		assert_eq!(record.error.as_deref(), Some("Unknown error"));
	}

	#[test]
	fn test_invariant_violations_detected() {
		let mut record = TransactionRecord::pending(4, &args(), 0);
		record.status = TransactionStatus::Confirmed;
		assert!(record.check_invariants().is_err());

		let mut record = TransactionRecord::pending(5, &args(), 0);
		record.status = TransactionStatus::Failed;
		record.settled_at = Some(1);
		assert!(record.check_invariants().is_err());

		let mut record = TransactionRecord::pending(6, &args(), 0);
		record.id = TransactionId::Local(6);
		assert!(record.check_invariants().is_err());
	}

	#[test]
	fn test_record_serializes_integers_as_strings() {
		let mut record = TransactionRecord::pending(u64::MAX, &args(), 1_700_000_000_000);
		record.memo = u64::MAX;
		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(json["id"], "18446744073709551615");
		assert_eq!(json["amount"], "1000000");
		assert_eq!(json["memo"], "18446744073709551615");
		assert_eq!(json["status"], "pending");
		assert!(json.get("settled_at").is_none());

		let parsed: TransactionRecord = serde_json::from_value(json).unwrap();
		assert_eq!(parsed, record);
	}
}
