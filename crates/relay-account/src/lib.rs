//! Signing keystore for the bridge relay.
//!
//! The submitter never sees private keys. It hands the keystore an unsigned
//! transaction together with the sending address and that address's
//! passphrase, and gets back an immutable [`SignedTransaction`] carrying the
//! exact bytes to broadcast.

use async_trait::async_trait;
use relay_types::{
	Address, ConfigSchema, ImplementationRegistry, SecretString, SignedTransaction,
	UnsignedTransaction,
};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Unknown account: {0}")]
	UnknownAccount(Address),
	#[error("Wrong passphrase for account {0}")]
	WrongPassphrase(Address),
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Keystore holding one or more signing identities.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Addresses this keystore can sign for.
	fn accounts(&self) -> Vec<Address>;

	/// Signs `tx` as `account`, unlocking it with `passphrase`.
	async fn sign_transaction(
		&self,
		account: Address,
		passphrase: &SecretString,
		tx: UnsignedTransaction,
	) -> Result<SignedTransaction, AccountError>;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// All account implementations, as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service wrapping the configured keystore implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Whether the keystore can sign for `account`.
	pub fn has_account(&self, account: Address) -> bool {
		self.implementation.accounts().contains(&account)
	}

	pub async fn sign(
		&self,
		account: Address,
		passphrase: &SecretString,
		tx: UnsignedTransaction,
	) -> Result<SignedTransaction, AccountError> {
		self.implementation
			.sign_transaction(account, passphrase, tx)
			.await
	}
}
