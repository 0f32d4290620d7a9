//! Durable collection of transaction records.
//!
//! The whole collection lives under a single storage key as a versioned JSON
//! envelope. Reads are served from an in-memory map; every mutation builds the
//! next map, writes it through to the backend, and only then becomes visible.

use crate::{StorageError, StorageInterface};
use ledger_types::{
	SettlementOutcome, StorageKey, TransactionId, TransactionRecord, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tokio::sync::{Mutex, RwLock};

/// Version of the persisted envelope written by this build.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct PersistedTransactions<'a> {
	version: u32,
	transactions: Vec<&'a TransactionRecord>,
}

/// Loosely typed view used on load so one bad record does not discard the rest.
#[derive(Deserialize)]
struct RawTransactions {
	version: u32,
	transactions: Vec<serde_json::Value>,
}

#[derive(Default)]
struct StoreState {
	loaded: bool,
	records: BTreeMap<TransactionId, TransactionRecord>,
	next_local_id: u64,
}

/// Durable key to record collection backed by a `StorageInterface`.
pub struct TransactionStore {
	backend: Box<dyn StorageInterface>,
	state: RwLock<StoreState>,
	/// Serializes writers so each persisted blob is built from the latest map.
	write_lock: Mutex<()>,
}

impl TransactionStore {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			state: RwLock::new(StoreState::default()),
			write_lock: Mutex::new(()),
		}
	}

	/// Loads persisted history, replacing the in-memory view.
	///
	/// Never fails: a missing, empty, unreadable or unknown-version blob
	/// leaves the store empty, and records that violate their invariants are
	/// skipped. Returns the number of records loaded.
	pub async fn load(&self) -> usize {
		let _guard = self.write_lock.lock().await;

		let records = self.read_persisted().await;
		let next_local_id = records
			.keys()
			.filter_map(|id| match id {
				TransactionId::Local(n) => Some(n + 1),
				TransactionId::Block(_) => None,
			})
			.max()
			.unwrap_or(0);

		let count = records.len();
		let mut state = self.state.write().await;
		*state = StoreState {
			loaded: true,
			records,
			next_local_id,
		};
		tracing::debug!(records = count, "Loaded transaction history");
		count
	}

	async fn read_persisted(&self) -> BTreeMap<TransactionId, TransactionRecord> {
		let key = StorageKey::Transactions.as_str();
		let bytes = match self.backend.get_bytes(key).await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return BTreeMap::new(),
			Err(e) => {
				tracing::error!(error = %e, "Failed to read transaction history, starting empty");
				return BTreeMap::new();
			},
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return BTreeMap::new();
		}

		let raw: RawTransactions = match serde_json::from_slice(&bytes) {
			Ok(raw) => raw,
			Err(e) => {
				tracing::warn!(error = %e, "Transaction history is corrupt, starting empty");
				return BTreeMap::new();
			},
		};

		if raw.version > SCHEMA_VERSION {
			tracing::warn!(
				version = raw.version,
				supported = SCHEMA_VERSION,
				"Transaction history was written by a newer schema, starting empty"
			);
			return BTreeMap::new();
		}

		let mut records = BTreeMap::new();
		for value in raw.transactions {
			let record: TransactionRecord = match serde_json::from_value(value) {
				Ok(record) => record,
				Err(e) => {
					tracing::warn!(error = %e, "Skipping unreadable transaction record");
					continue;
				},
			};
			if let Err(reason) = record.check_invariants() {
				tracing::warn!(tx_id = %record.id, reason = %reason, "Skipping invalid transaction record");
				continue;
			}
			if records.insert(record.id, record).is_some() {
				tracing::warn!("Duplicate transaction id in history, keeping the last entry");
			}
		}
		records
	}

	async fn persist(
		&self,
		records: &BTreeMap<TransactionId, TransactionRecord>,
	) -> Result<(), StorageError> {
		let envelope = PersistedTransactions {
			version: SCHEMA_VERSION,
			transactions: records.values().collect(),
		};
		let bytes =
			serde_json::to_vec(&envelope).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(StorageKey::Transactions.as_str(), bytes)
			.await
	}

	/// Applies `mutate` to a copy of the records, persists it, then publishes it.
	///
	/// The closure returns `None` to signal that nothing changed, in which case
	/// no write happens.
	async fn write_through<T, F>(&self, mutate: F) -> Result<Option<T>, StorageError>
	where
		F: FnOnce(&mut BTreeMap<TransactionId, TransactionRecord>) -> Option<T>,
	{
		let _guard = self.write_lock.lock().await;

		let mut next = {
			let state = self.state.read().await;
			if !state.loaded {
				return Err(StorageError::NotLoaded);
			}
			state.records.clone()
		};

		let Some(result) = mutate(&mut next) else {
			return Ok(None);
		};

		self.persist(&next).await?;
		self.state.write().await.records = next;
		Ok(Some(result))
	}

	/// Returns the record with the given id.
	pub async fn get(&self, id: &TransactionId) -> Option<TransactionRecord> {
		self.state.read().await.records.get(id).cloned()
	}

	/// Inserts or replaces a record and writes it through.
	///
	/// A terminal record is never replaced; in that case nothing is written
	/// and `Ok(false)` is returned.
	pub async fn put(&self, record: TransactionRecord) -> Result<bool, StorageError> {
		let id = record.id;
		let written = self
			.write_through(|records| {
				if let Some(existing) = records.get(&id) {
					if existing.status.is_terminal() {
						return None;
					}
				}
				records.insert(id, record);
				Some(())
			})
			.await?;

		if written.is_none() {
			tracing::warn!(tx_id = %id, "Refusing to overwrite a settled transaction");
		}
		Ok(written.is_some())
	}

	/// Inserts a record whose id is not yet in the history and writes it through.
	///
	/// Fails with `AlreadyExists` when the id is taken, whatever the status of
	/// the existing record.
	pub async fn create(&self, record: TransactionRecord) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut next = {
			let state = self.state.read().await;
			if !state.loaded {
				return Err(StorageError::NotLoaded);
			}
			state.records.clone()
		};
		insert_new(&mut next, record)?;
		self.persist(&next).await?;
		self.state.write().await.records = next;
		Ok(())
	}

	/// Like `create`, but also works after `unload`.
	///
	/// When the in-memory view is unloaded the record is merged into the
	/// persisted history directly, so the next `load` picks it up.
	pub async fn create_durable(&self, record: TransactionRecord) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let loaded = self.state.read().await.loaded;
		let mut next = if loaded {
			self.state.read().await.records.clone()
		} else {
			self.read_persisted().await
		};
		insert_new(&mut next, record)?;
		self.persist(&next).await?;
		if loaded {
			self.state.write().await.records = next;
		}
		Ok(())
	}

	/// Moves a pending record to a terminal state and writes it through.
	///
	/// Returns the settled record, or `None` if the record does not exist or
	/// is already terminal.
	pub async fn settle(
		&self,
		id: &TransactionId,
		outcome: &SettlementOutcome,
		settled_at: u64,
	) -> Result<Option<TransactionRecord>, StorageError> {
		self.write_through(|records| {
			let record = records.get_mut(id)?;
			if !record.settle(outcome, settled_at) {
				return None;
			}
			Some(record.clone())
		})
		.await
	}

	/// Returns every record ordered by id.
	pub async fn list(&self) -> Vec<TransactionRecord> {
		self.state.read().await.records.values().cloned().collect()
	}

	/// Returns the records with the given status, ordered by id.
	pub async fn list_by_status(&self, status: TransactionStatus) -> Vec<TransactionRecord> {
		self.state
			.read()
			.await
			.records
			.values()
			.filter(|record| record.status == status)
			.cloned()
			.collect()
	}

	/// Reserves the next id for a transfer the ledger never accepted.
	pub async fn allocate_local_id(&self) -> TransactionId {
		let mut state = self.state.write().await;
		let id = state.next_local_id;
		state.next_local_id += 1;
		TransactionId::Local(id)
	}

	/// Removes every record from memory and from the durable medium.
	pub async fn clear(&self) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.backend
			.delete(StorageKey::Transactions.as_str())
			.await?;

		let mut state = self.state.write().await;
		state.records.clear();
		state.next_local_id = 0;
		Ok(())
	}

	/// Drops the in-memory view and refuses further writes until `load`.
	///
	/// The durable medium is left untouched. Waits for an in-flight write to
	/// finish first.
	pub async fn unload(&self) {
		let _guard = self.write_lock.lock().await;
		*self.state.write().await = StoreState::default();
	}

	#[cfg(test)]
	async fn is_loaded(&self) -> bool {
		self.state.read().await.loaded
	}

	#[cfg(test)]
	async fn len(&self) -> usize {
		self.state.read().await.records.len()
	}

	#[cfg(test)]
	async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}

fn insert_new(
	records: &mut BTreeMap<TransactionId, TransactionRecord>,
	record: TransactionRecord,
) -> Result<(), StorageError> {
	match records.entry(record.id) {
		Entry::Occupied(_) => Err(StorageError::AlreadyExists(format!(
			"transaction {}",
			record.id
		))),
		Entry::Vacant(slot) => {
			slot.insert(record);
			Ok(())
		},
	}
}
