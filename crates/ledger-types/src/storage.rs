//! Storage-related types for the ledger engine.

/// Durable keys owned by the engine.
///
/// Typed keys replace string literals at call sites so a backend never sees
/// a misspelled key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// The serialized collection of transaction records.
	Transactions,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Transactions => "ledger_transactions",
		}
	}
}
