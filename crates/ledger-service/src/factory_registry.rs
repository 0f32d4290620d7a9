//! Factory registry for storage and gateway implementations.
//!
//! Collects the factories every implementation crate exposes so the builder
//! can instantiate whatever the configuration names.

use ledger_config::Config;
use ledger_core::{LedgerBuilder, LedgerClient, LedgerFactories};
use ledger_gateway::GatewayFactory;
use ledger_storage::StorageFactory;
use ledger_types::Identity;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Registry of all implementation factories, keyed by implementation name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub gateway: HashMap<String, GatewayFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			gateway: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_gateway(&mut self, name: impl Into<String>, factory: GatewayFactory) {
		self.gateway.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, registering every known implementation on
/// first use.
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in ledger_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in ledger_gateway::get_all_implementations() {
			tracing::debug!("Registering gateway implementation: {}", name);
			registry.register_gateway(name, factory);
		}

		registry
	})
}

/// Builds a client for the given configuration using all registered
/// implementations. Returns the client together with the identity it should
/// be initialized with.
pub fn build_client_from_config(
	config: Config,
) -> Result<(LedgerClient, Identity), Box<dyn std::error::Error>> {
	let registry = initialize_registry();
	let builder = LedgerBuilder::new(config);
	let identity = builder.identity();

	let factories = LedgerFactories {
		storage_factories: registry.storage.clone(),
		gateway_factories: registry.gateway.clone(),
	};

	Ok((builder.build(factories)?, identity))
}
