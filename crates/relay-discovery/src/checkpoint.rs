//! Persistence of watcher checkpoints.

use relay_storage::{StorageError, StorageService};
use relay_types::{Address, Checkpoint, StorageKey};
use std::sync::Arc;

/// Loads and saves checkpoints keyed by chain id and contract address, so
/// redeploying the bridge on the same chain starts a fresh watermark.
#[derive(Clone)]
pub struct CheckpointStore {
	storage: Arc<StorageService>,
}

impl CheckpointStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn id(chain_id: u64, contract: Address) -> String {
		format!("{}:{}", chain_id, contract)
	}

	pub async fn load(
		&self,
		chain_id: u64,
		contract: Address,
	) -> Result<Option<Checkpoint>, StorageError> {
		self.storage
			.retrieve_optional(StorageKey::Checkpoints, &Self::id(chain_id, contract))
			.await
	}

	pub async fn save(
		&self,
		chain_id: u64,
		contract: Address,
		checkpoint: &Checkpoint,
	) -> Result<(), StorageError> {
		self.storage
			.store(
				StorageKey::Checkpoints,
				&Self::id(chain_id, contract),
				checkpoint,
			)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_storage::implementations::memory::MemoryStorage;

	#[tokio::test]
	async fn test_keyed_by_chain_and_contract() {
		let store = CheckpointStore::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))));
		let contract = Address::repeat_byte(0xb7);

		assert_eq!(store.load(1, contract).await.unwrap(), None);
		store.save(1, contract, &Checkpoint::new(90)).await.unwrap();

		assert_eq!(store.load(1, contract).await.unwrap(), Some(Checkpoint::new(90)));
		assert_eq!(store.load(2, contract).await.unwrap(), None);
		assert_eq!(store.load(1, Address::ZERO).await.unwrap(), None);
	}
}
