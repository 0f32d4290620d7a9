//! Scripted in-process gateway for driving the engine in tests.

use async_trait::async_trait;
use ledger_gateway::{GatewayError, LedgerGateway};
use ledger_types::{
	current_timestamp_millis, BlockIndex, ConfirmationData, Identity, Tokens, TransferRequest,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Gateway whose answers are set by the test.
///
/// Submissions are answered from a queue of scripted results; once the queue
/// is empty every transfer is accepted with the next block index. Blocks
/// confirm only when the test calls `confirm`.
pub struct ScriptedGateway {
	submissions: Mutex<VecDeque<Result<BlockIndex, GatewayError>>>,
	next_index: AtomicU64,
	confirmed: Mutex<HashSet<BlockIndex>>,
	checks_failing: AtomicBool,
	checks: AtomicUsize,
	requests: Mutex<Vec<TransferRequest>>,
	identity: Mutex<Option<Identity>>,
	balance: Mutex<Option<u64>>,
	/// Submissions wait on this lock; a test holds it to keep them in flight.
	pub gate: tokio::sync::Mutex<()>,
}

impl ScriptedGateway {
	pub fn new() -> Self {
		Self {
			submissions: Mutex::new(VecDeque::new()),
			next_index: AtomicU64::new(0),
			confirmed: Mutex::new(HashSet::new()),
			checks_failing: AtomicBool::new(false),
			checks: AtomicUsize::new(0),
			requests: Mutex::new(Vec::new()),
			identity: Mutex::new(None),
			balance: Mutex::new(Some(0)),
			gate: tokio::sync::Mutex::new(()),
		}
	}

	/// Block index given to the next accepted transfer without a scripted answer.
	pub fn starting_at(self, index: BlockIndex) -> Self {
		self.next_index.store(index, Ordering::SeqCst);
		self
	}

	pub fn push_submission(&self, result: Result<BlockIndex, GatewayError>) {
		self.submissions.lock().unwrap().push_back(result);
	}

	pub fn confirm(&self, index: BlockIndex) {
		self.confirmed.lock().unwrap().insert(index);
	}

	pub fn set_checks_failing(&self, failing: bool) {
		self.checks_failing.store(failing, Ordering::SeqCst);
	}

	/// `None` makes balance queries fail with a network error.
	pub fn set_balance(&self, balance: Option<u64>) {
		*self.balance.lock().unwrap() = balance;
	}

	pub fn check_count(&self) -> usize {
		self.checks.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<TransferRequest> {
		self.requests.lock().unwrap().clone()
	}

	pub fn identity(&self) -> Option<Identity> {
		self.identity.lock().unwrap().clone()
	}
}

#[async_trait]
impl LedgerGateway for ScriptedGateway {
	async fn connect(&self, identity: &Identity) -> Result<(), GatewayError> {
		*self.identity.lock().unwrap() = Some(identity.clone());
		Ok(())
	}

	async fn submit_transfer(&self, request: &TransferRequest) -> Result<BlockIndex, GatewayError> {
		let _gate = self.gate.lock().await;
		self.requests.lock().unwrap().push(request.clone());

		if let Some(result) = self.submissions.lock().unwrap().pop_front() {
			return result;
		}
		Ok(self.next_index.fetch_add(1, Ordering::SeqCst))
	}

	async fn check_confirmation(
		&self,
		index: BlockIndex,
	) -> Result<Option<ConfirmationData>, GatewayError> {
		self.checks.fetch_add(1, Ordering::SeqCst);
		if self.checks_failing.load(Ordering::SeqCst) {
			return Err(GatewayError::Network("connection reset".into()));
		}
		if self.confirmed.lock().unwrap().contains(&index) {
			return Ok(Some(ConfirmationData {
				block_index: index,
				settled_at: Some(current_timestamp_millis()),
			}));
		}
		Ok(None)
	}

	async fn get_balance(&self, _account: &str) -> Result<Tokens, GatewayError> {
		match *self.balance.lock().unwrap() {
			Some(e8s) => Ok(Tokens::from_e8s(e8s)),
			None => Err(GatewayError::Network("ledger unreachable".into())),
		}
	}
}

/// Advances the paused clock in small steps so spawned watches get to run
/// between timer firings.
pub async fn advance(duration: Duration) {
	let step = Duration::from_millis(500);
	let mut elapsed = Duration::ZERO;
	while elapsed < duration {
		tokio::time::advance(step).await;
		tokio::task::yield_now().await;
		elapsed += step;
	}
}
