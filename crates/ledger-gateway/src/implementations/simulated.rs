//! In-process ledger for development and testing.
//!
//! Keeps balances and an append-only block list in memory and applies the
//! same acceptance rules a real ledger does: the fee must match, the sender
//! must cover amount plus fee, and a request carrying an already seen
//! `created_at_time` is reported as a duplicate. Accepted blocks report as
//! confirmed once the configured delay has elapsed on the tokio clock.

use crate::{GatewayError, GatewayFactory, GatewayRegistry, LedgerGateway};
use async_trait::async_trait;
use ledger_types::{
	current_timestamp_millis, BlockIndex, ConfirmationData, Identity, ImplementationRegistry,
	Tokens, TransferError, TransferRequest,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Configuration for the simulated ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatedLedgerConfig {
	/// Fee every transfer must carry, in e8s.
	#[serde(default = "default_expected_fee")]
	pub expected_fee: u64,
	/// Index assigned to the first accepted transfer. When unset, numbering
	/// starts at the current unix time in milliseconds so separate runs
	/// sharing one history do not hand out the same indices.
	#[serde(default)]
	pub first_block_index: Option<BlockIndex>,
	/// Seconds between acceptance and confirmation.
	#[serde(default = "default_confirmation_delay_seconds")]
	pub confirmation_delay_seconds: u64,
	/// When false, accepted transfers never confirm.
	#[serde(default = "default_true")]
	pub confirm_transfers: bool,
	/// Starts the ledger in the unavailable state.
	#[serde(default)]
	pub unavailable: bool,
	/// Opening balances in e8s, keyed by account.
	#[serde(default)]
	pub balances: HashMap<String, u64>,
}

fn default_expected_fee() -> u64 {
	10_000
}

fn default_confirmation_delay_seconds() -> u64 {
	2
}

fn default_true() -> bool {
	true
}

impl Default for SimulatedLedgerConfig {
	fn default() -> Self {
		Self {
			expected_fee: default_expected_fee(),
			first_block_index: None,
			confirmation_delay_seconds: default_confirmation_delay_seconds(),
			confirm_transfers: true,
			unavailable: false,
			balances: HashMap::new(),
		}
	}
}

/// Deduplication key: the same sender, destination, amount, memo and
/// creation time is the same transfer.
type DedupKey = (String, String, u64, u64, u64);

struct Block {
	accepted_at: Instant,
}

struct LedgerState {
	sender: Option<String>,
	unavailable: bool,
	balances: HashMap<String, u64>,
	blocks: Vec<Block>,
	seen: HashMap<DedupKey, BlockIndex>,
}

/// Simulated ledger gateway.
pub struct SimulatedLedger {
	config: SimulatedLedgerConfig,
	first_block: BlockIndex,
	state: Mutex<LedgerState>,
}

impl SimulatedLedger {
	pub fn new(config: SimulatedLedgerConfig) -> Self {
		let state = LedgerState {
			sender: None,
			unavailable: config.unavailable,
			balances: config.balances.clone(),
			blocks: Vec::new(),
			seen: HashMap::new(),
		};
		let first_block = config
			.first_block_index
			.unwrap_or_else(current_timestamp_millis);
		Self {
			config,
			first_block,
			state: Mutex::new(state),
		}
	}

	/// Toggles whether the ledger answers transfers with `TemporarilyUnavailable`.
	pub async fn set_unavailable(&self, unavailable: bool) {
		self.state.lock().await.unavailable = unavailable;
	}

	fn confirmation_delay(&self) -> Duration {
		Duration::from_secs(self.config.confirmation_delay_seconds)
	}
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
	async fn connect(&self, identity: &Identity) -> Result<(), GatewayError> {
		if identity.principal.trim().is_empty() {
			return Err(GatewayError::Configuration(
				"identity principal cannot be empty".into(),
			));
		}
		let mut state = self.state.lock().await;
		state.sender = Some(identity.principal.clone());
		tracing::debug!(identity = %identity, "Connected to simulated ledger");
		Ok(())
	}

	async fn submit_transfer(&self, request: &TransferRequest) -> Result<BlockIndex, GatewayError> {
		let mut state = self.state.lock().await;
		let sender = state.sender.clone().ok_or(GatewayError::NotConnected)?;

		if state.unavailable {
			return Err(GatewayError::Rejected(
				TransferError::TemporarilyUnavailable,
			));
		}

		if request.fee.e8s != self.config.expected_fee {
			return Err(GatewayError::Rejected(TransferError::BadFee {
				expected_fee: Tokens::from_e8s(self.config.expected_fee),
			}));
		}

		let dedup_key = request.created_at_time.map(|created_at_time| {
			(
				sender.clone(),
				request.to.clone(),
				request.amount.e8s,
				request.memo,
				created_at_time,
			)
		});
		if let Some(duplicate_of) = dedup_key.as_ref().and_then(|key| state.seen.get(key)) {
			return Err(GatewayError::Rejected(TransferError::Duplicate {
				duplicate_of: *duplicate_of,
			}));
		}

		let Some(total) = request.amount.e8s.checked_add(request.fee.e8s) else {
			return Err(GatewayError::Rejected(TransferError::GenericError {
				message: "amount plus fee overflows".into(),
				error_code: 1,
			}));
		};

		let balance = state.balances.get(&sender).copied().unwrap_or(0);
		if balance < total {
			return Err(GatewayError::Rejected(TransferError::InsufficientFunds {
				balance: Tokens::from_e8s(balance),
			}));
		}

		state.balances.insert(sender.clone(), balance - total);
		let credited = state.balances.entry(request.to.clone()).or_insert(0);
		*credited = credited.saturating_add(request.amount.e8s);

		let index = self.first_block + state.blocks.len() as u64;
		state.blocks.push(Block {
			accepted_at: Instant::now(),
		});
		if let Some(key) = dedup_key {
			state.seen.insert(key, index);
		}

		tracing::debug!(block_index = index, to = %request.to, amount = request.amount.e8s, "Accepted transfer");
		Ok(index)
	}

	async fn check_confirmation(
		&self,
		index: BlockIndex,
	) -> Result<Option<ConfirmationData>, GatewayError> {
		let state = self.state.lock().await;
		let block = index
			.checked_sub(self.first_block)
			.and_then(|offset| state.blocks.get(offset as usize));

		let Some(block) = block else {
			return Ok(None);
		};
		if !self.config.confirm_transfers || block.accepted_at.elapsed() < self.confirmation_delay() {
			return Ok(None);
		}

		Ok(Some(ConfirmationData {
			block_index: index,
			settled_at: Some(current_timestamp_millis()),
		}))
	}

	async fn get_balance(&self, account: &str) -> Result<Tokens, GatewayError> {
		let state = self.state.lock().await;
		Ok(Tokens::from_e8s(
			state.balances.get(account).copied().unwrap_or(0),
		))
	}
}

/// Factory function to create a simulated ledger from configuration.
///
/// Configuration parameters:
/// - `expected_fee`: Required fee in e8s (default: 10000)
/// - `first_block_index`: Index of the first accepted block (default: current unix millis)
/// - `confirmation_delay_seconds`: Delay before blocks confirm (default: 2)
/// - `confirm_transfers`: Whether blocks ever confirm (default: true)
/// - `unavailable`: Start in the unavailable state (default: false)
/// - `balances`: Table of opening balances in e8s
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn LedgerGateway>, GatewayError> {
	let ledger_config: SimulatedLedgerConfig = config.clone().try_into().map_err(|e| {
		GatewayError::Configuration(format!("Invalid simulated ledger config: {}", e))
	})?;
	Ok(Box::new(SimulatedLedger::new(ledger_config)))
}

/// Registry for the simulated ledger implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}
