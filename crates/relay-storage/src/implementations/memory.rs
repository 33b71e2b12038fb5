//! In-memory storage backend. Nothing survives a restart; used for tests and
//! for running the watcher without a data directory.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// HashMap-backed storage.
#[derive(Default, Clone)]
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.store.write().await.insert(key.to_string(), value);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage.set_bytes("k", b"v1".to_vec()).await.unwrap();
		storage.set_bytes("k", b"v2".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v2".to_vec());
		assert!(matches!(
			storage.get_bytes("other").await,
			Err(StorageError::NotFound)
		));
	}

	#[test]
	fn test_factory_accepts_empty_table() {
		let config = toml::Value::Table(toml::map::Map::new());
		assert!(create_storage(&config).is_ok());
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
	}
}
