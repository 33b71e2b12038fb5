//! Local keystore backed by private keys from the configuration file.
//!
//! Each key may carry a passphrase; signing requests must present the same
//! passphrase. Transactions are signed as EIP-155 legacy transactions with
//! the gas price fixed per network.

use crate::{AccountError, AccountInterface};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Bytes, TxKind};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_types::{
	private_key_validator, Address, ConfigSchema, Destination, Field, FieldType, Schema,
	SecretString, SignedTransaction, TransactionHash, UnsignedTransaction, ValidationError,
};
use std::collections::HashMap;

struct KeyEntry {
	signer: PrivateKeySigner,
	passphrase: SecretString,
}

/// Keystore with keys held in memory.
pub struct LocalKeystore {
	keys: HashMap<Address, KeyEntry>,
}

impl LocalKeystore {
	/// Builds a keystore from (private key, passphrase) pairs.
	pub fn new(keys: Vec<(SecretString, SecretString)>) -> Result<Self, AccountError> {
		let mut entries = HashMap::new();
		for (private_key, passphrase) in keys {
			let signer: PrivateKeySigner = private_key.with_exposed(|key| {
				key.parse()
					.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
			})?;
			let address = signer.address();
			if entries
				.insert(address, KeyEntry { signer, passphrase })
				.is_some()
			{
				return Err(AccountError::InvalidKey(format!(
					"Duplicate key for account {}",
					address
				)));
			}
		}
		Ok(Self { keys: entries })
	}

	fn unlock(
		&self,
		account: Address,
		passphrase: &SecretString,
	) -> Result<&PrivateKeySigner, AccountError> {
		let entry = self
			.keys
			.get(&account)
			.ok_or(AccountError::UnknownAccount(account))?;
		if entry.passphrase != *passphrase {
			return Err(AccountError::WrongPassphrase(account));
		}
		Ok(&entry.signer)
	}
}

pub struct LocalKeystoreSchema;

impl ConfigSchema for LocalKeystoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let key = Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(private_key_validator)],
			vec![Field::new("passphrase", FieldType::String)],
		);
		let schema = Schema::new(
			vec![
				Field::new("keys", FieldType::Array(Box::new(FieldType::Table(key))))
					.with_validator(|value| match value.as_array() {
						Some(arr) if arr.is_empty() => Err("keys cannot be empty".to_string()),
						_ => Ok(()),
					}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalKeystore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalKeystoreSchema)
	}

	fn accounts(&self) -> Vec<Address> {
		let mut accounts: Vec<Address> = self.keys.keys().copied().collect();
		accounts.sort();
		accounts
	}

	async fn sign_transaction(
		&self,
		account: Address,
		passphrase: &SecretString,
		tx: UnsignedTransaction,
	) -> Result<SignedTransaction, AccountError> {
		let signer = self.unlock(account, passphrase)?;

		let mut legacy = TxLegacy {
			chain_id: Some(tx.chain_id),
			nonce: tx.nonce,
			gas_price: tx.gas_price,
			gas_limit: tx.gas_limit,
			to: match tx.destination {
				Destination::Create => TxKind::Create,
				Destination::Call(to) => TxKind::Call(to),
			},
			value: tx.value,
			input: tx.payload.clone(),
		};

		let signature = signer
			.sign_transaction_sync(&mut legacy)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		let envelope = TxEnvelope::Legacy(legacy.into_signed(signature));
		let hash = TransactionHash(*envelope.tx_hash());
		let raw = Bytes::from(envelope.encoded_2718());

		tracing::debug!(
			account = %account,
			nonce = tx.nonce,
			chain_id = tx.chain_id,
			tx_hash = %hash,
			"Signed transaction"
		);

		Ok(SignedTransaction::new(
			account,
			tx,
			Bytes::copy_from_slice(&signature.as_bytes()),
			raw,
			hash,
		))
	}
}

/// Builds a local keystore.
///
/// Configuration parameters:
/// - `keys`: array of tables with `private_key` (hex) and optional `passphrase`
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalKeystoreSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let keys = config
		.get("keys")
		.and_then(|v| v.as_array())
		.map(|arr| {
			arr.iter()
				.map(|entry| {
					let key = entry
						.get("private_key")
						.and_then(|v| v.as_str())
						.unwrap_or_default();
					let passphrase = entry
						.get("passphrase")
						.and_then(|v| v.as_str())
						.unwrap_or_default();
					(SecretString::from(key), SecretString::from(passphrase))
				})
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Ok(Box::new(LocalKeystore::new(keys)?))
}

pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}
