//! Chain RPC client for the bridge relay.
//!
//! Both the transaction submitter and the event watcher talk to the chain
//! node only through [`ChainClientInterface`]. A client is stateless and is
//! shared behind an `Arc` by every component working on that chain.

use async_trait::async_trait;
use relay_types::{
	Address, ImplementationRegistry, LogEntry, NetworkConfig, PendingState, TransactionHash,
	TransactionReceipt,
};
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	#[cfg(any(test, feature = "testing"))]
	pub mod mock;
}

/// Errors returned by the chain node or the transport in front of it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
	/// The node could not be reached or the request did not complete.
	#[error("Network error: {0}")]
	Transport(String),
	/// The node answered with a JSON-RPC error.
	#[error("Rejected by node: {0}")]
	Rejected(String),
	/// The node answered with something that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Capability set the relay needs from a chain node.
#[async_trait]
pub trait ChainClientInterface: Send + Sync {
	/// Next nonce for `account`, counting transactions still in the mempool.
	async fn pending_nonce(&self, account: Address) -> Result<u64, RpcError>;

	/// Broadcasts an encoded signed transaction.
	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TransactionHash, RpcError>;

	/// Looks a transaction up by hash. `None` means the node does not know it.
	async fn transaction_by_hash(
		&self,
		hash: TransactionHash,
	) -> Result<Option<PendingState>, RpcError>;

	/// Receipt of a mined transaction. `None` until the node exposes one.
	async fn transaction_receipt(
		&self,
		hash: TransactionHash,
	) -> Result<Option<TransactionReceipt>, RpcError>;

	/// Current chain height.
	async fn block_number(&self) -> Result<u64, RpcError>;

	/// Logs emitted by `address` in the inclusive block range.
	async fn filter_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<LogEntry>, RpcError>;

	async fn gas_price(&self) -> Result<u128, RpcError>;
}

pub type ChainClientFactory = fn(&NetworkConfig) -> Result<Arc<dyn ChainClientInterface>, RpcError>;

pub trait ChainClientRegistry: ImplementationRegistry<Factory = ChainClientFactory> {}

/// All chain client implementations, as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, ChainClientFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}
