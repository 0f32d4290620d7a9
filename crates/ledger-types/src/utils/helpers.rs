//! Helper utilities for common operations.

/// Returns the current UNIX timestamp in milliseconds.
///
/// Returns 0 if the system clock reports a time before the UNIX epoch.
pub fn current_timestamp_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// Returns the current UNIX timestamp in nanoseconds.
///
/// Used as the ledger-side deduplication timestamp of a transfer request.
pub fn current_timestamp_nanos() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_nanos() as u64)
		.unwrap_or(0)
}
