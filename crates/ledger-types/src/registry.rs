//! Registry trait for self-registering implementations.
//!
//! Every pluggable backend (storage medium, ledger gateway) exposes a
//! `Registry` type implementing this trait so the builder can map
//! configuration names to factory functions.

/// Base trait for implementation registries.
///
/// The `NAME` must match the key used under `implementations` in the TOML
/// configuration, for example `storage.implementations.file` or
/// `gateway.implementations.simulated`.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
