//! Token amount formatting.

/// Number of e8s in one whole token.
pub const E8S_PER_TOKEN: u64 = 100_000_000;

/// Formats an e8s amount as a decimal token string with eight fractional digits.
pub fn format_tokens(e8s: u64) -> String {
	format!("{}.{:08}", e8s / E8S_PER_TOKEN, e8s % E8S_PER_TOKEN)
}
