//! Builder for constructing a ledger client from configuration.
//!
//! Each configured storage and gateway implementation is created through the
//! factory registered under its name; the one marked `primary` is wired
//! into the client.

use crate::client::LedgerClient;
use ledger_config::Config;
use ledger_gateway::{GatewayError, LedgerGateway};
use ledger_storage::{StorageError, StorageInterface, TransactionStore};
use ledger_types::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during client construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every component type, keyed by implementation name.
pub struct LedgerFactories<SF, GF> {
	pub storage_factories: HashMap<String, SF>,
	pub gateway_factories: HashMap<String, GF>,
}

/// Builder for a `LedgerClient` with pluggable storage and gateway.
pub struct LedgerBuilder {
	config: Config,
}

impl LedgerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Identity the built client should be initialized with.
	pub fn identity(&self) -> Identity {
		Identity::new(self.config.client.identity.clone())
	}

	/// Builds the client. The client still has to be initialized.
	pub fn build<SF, GF>(self, factories: LedgerFactories<SF, GF>) -> Result<LedgerClient, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		GF: Fn(&toml::Value) -> Result<Box<dyn LedgerGateway>, GatewayError>,
	{
		let storage_backend = create_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let gateway = create_primary(
			"gateway",
			&self.config.gateway.primary,
			&self.config.gateway.implementations,
			&factories.gateway_factories,
		)?;

		let store = Arc::new(TransactionStore::new(storage_backend));
		Ok(LedgerClient::new(
			Arc::from(gateway),
			store,
			self.config.monitor.clone(),
		))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn create_primary<T: ?Sized, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	E: std::fmt::Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut created = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				created.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if created.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	created.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}
