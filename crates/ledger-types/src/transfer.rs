//! Transfer types exchanged between callers, the engine and the ledger.
//!
//! `TransferArgs` is what a caller hands the client. `TransferRequest` is the
//! ledger-facing shape derived from it, and `TransferError` is the structured
//! rejection a ledger may answer with.

use crate::BlockIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Token quantity in e8s, the smallest ledger unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tokens {
	pub e8s: u64,
}

impl Tokens {
	pub const fn from_e8s(e8s: u64) -> Self {
		Self { e8s }
	}
}

impl fmt::Display for Tokens {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} e8s", self.e8s)
	}
}

/// 32-byte subaccount selector of the sending account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subaccount(pub [u8; 32]);

/// Identity on whose behalf the client talks to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
	/// Textual principal of the sending account.
	pub principal: String,
}

impl Identity {
	pub fn new(principal: impl Into<String>) -> Self {
		Self {
			principal: principal.into(),
		}
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.principal)
	}
}

/// Caller-facing arguments of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
	/// Destination account.
	pub to: String,
	/// Amount to move, in e8s.
	pub amount: u64,
	/// Fee the caller agrees to pay, in e8s.
	pub fee: u64,
	/// Opaque correlation value.
	#[serde(default)]
	pub memo: u64,
	/// Optional subaccount to send from.
	#[serde(default)]
	pub from_subaccount: Option<Subaccount>,
}

impl TransferArgs {
	pub fn new(to: impl Into<String>, amount: u64, fee: u64) -> Self {
		Self {
			to: to.into(),
			amount,
			fee,
			memo: 0,
			from_subaccount: None,
		}
	}

	pub fn with_memo(mut self, memo: u64) -> Self {
		self.memo = memo;
		self
	}

	pub fn with_subaccount(mut self, subaccount: Subaccount) -> Self {
		self.from_subaccount = Some(subaccount);
		self
	}

	/// Checks the arguments before anything is sent to the ledger.
	pub fn validate(&self) -> Result<(), String> {
		if self.to.trim().is_empty() {
			return Err("destination account cannot be empty".into());
		}
		if self.amount == 0 {
			return Err("amount must be greater than zero".into());
		}
		Ok(())
	}
}

/// Ledger-facing transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
	pub to: String,
	pub amount: Tokens,
	pub fee: Tokens,
	pub memo: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from_subaccount: Option<Subaccount>,
	/// Nanoseconds since the UNIX epoch; lets the ledger deduplicate resubmissions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at_time: Option<u64>,
}

impl TransferRequest {
	pub fn from_args(args: &TransferArgs, created_at_time: Option<u64>) -> Self {
		Self {
			to: args.to.clone(),
			amount: Tokens::from_e8s(args.amount),
			fee: Tokens::from_e8s(args.fee),
			memo: args.memo,
			from_subaccount: args.from_subaccount,
			created_at_time,
		}
	}
}

/// Structured rejection returned by the ledger.
///
/// The `Display` output is the human-readable message stored on the failed
/// transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferError {
	#[error("Insufficient funds (balance: {balance})")]
	InsufficientFunds { balance: Tokens },
	#[error("Incorrect fee (expected: {expected_fee})")]
	BadFee { expected_fee: Tokens },
	#[error("Duplicate transaction (block {duplicate_of})")]
	Duplicate { duplicate_of: BlockIndex },
	#[error("Ledger temporarily unavailable")]
	TemporarilyUnavailable,
	#[error("{message}")]
	GenericError { message: String, error_code: u64 },
}

/// Settlement information reported by the ledger for an accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationData {
	pub block_index: BlockIndex,
	/// Unix milliseconds at which the ledger finalized the block, if known.
	#[serde(default)]
	pub settled_at: Option<u64>,
}
