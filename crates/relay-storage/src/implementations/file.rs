//! File storage backend.
//!
//! Each key becomes one JSON file under `storage_path`. Writes go to a
//! sibling temporary file first and are renamed into place, so a crash
//! mid-write leaves either the old value or the new one.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/storage";

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: impl Into<PathBuf>) -> Self {
		Self {
			base_path: base_path.into(),
		}
	}

	/// Maps a key to a filesystem-safe path. ASCII letters, digits, `-` and
	/// `.` are kept; every other byte becomes `_` followed by two hex digits,
	/// so distinct keys never share a file.
	fn file_path(&self, key: &str) -> PathBuf {
		let mut safe_key = String::with_capacity(key.len());
		for byte in key.bytes() {
			match byte {
				b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => {
					safe_key.push(byte as char)
				},
				_ => {
					safe_key.push('_');
					safe_key.push_str(&hex::encode([byte]));
				},
			}
		}
		self.base_path.join(format!("{}.json", safe_key))
	}
}

fn backend_err(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(backend_err)?;

		let path = self.file_path(key);
		let temp_path = path.with_extension("json.tmp");
		fs::write(&temp_path, value).await.map_err(backend_err)?;
		fs::rename(&temp_path, &path).await.map_err(backend_err)?;

		tracing::trace!(key = %key, path = ?path, "Stored value");
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("") => Err("storage_path cannot be empty".to_string()),
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Builds a file backend.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(storage_path)))
}

pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
