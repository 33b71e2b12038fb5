//! JSON-RPC over HTTP using alloy.

use crate::{ChainClientInterface, RpcError};
use alloy_network::TransactionResponse;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::Filter;
use alloy_transport::TransportError;
use alloy_transport_http::Http;
use async_trait::async_trait;
use relay_types::{
	Address, LogEntry, NetworkConfig, PendingState, TransactionHash, TransactionReceipt,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single JSON-RPC round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Chain client for one EVM node.
pub struct AlloyChainClient {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	request_timeout: Duration,
}

impl AlloyChainClient {
	pub fn new(rpc_url: &str) -> Result<Self, RpcError> {
		let url = rpc_url
			.parse()
			.map_err(|e| RpcError::Configuration(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;
		let provider = ProviderBuilder::new().on_http(url);

		Ok(Self {
			provider: Arc::new(provider),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		})
	}

	pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
		self.request_timeout = request_timeout;
		self
	}

	/// Runs one request, turning a node that never answers into a transport
	/// error so callers holding locks get them back.
	async fn call<T>(
		&self,
		context: &str,
		request: impl IntoFuture<Output = Result<T, TransportError>>,
	) -> Result<T, RpcError> {
		match tokio::time::timeout(self.request_timeout, request).await {
			Ok(result) => result.map_err(|e| map_err(context, e)),
			Err(_) => Err(RpcError::Transport(format!(
				"{}: no response within {:?}",
				context, self.request_timeout
			))),
		}
	}
}

/// JSON-RPC error responses mean the node saw and refused the request.
fn map_err(context: &str, e: TransportError) -> RpcError {
	match e {
		alloy_transport::RpcError::ErrorResp(payload) => {
			RpcError::Rejected(format!("{}: {}", context, payload.message))
		},
		alloy_transport::RpcError::DeserError { err, .. } => {
			RpcError::InvalidResponse(format!("{}: {}", context, err))
		},
		other => RpcError::Transport(format!("{}: {}", context, other)),
	}
}

#[async_trait]
impl ChainClientInterface for AlloyChainClient {
	async fn pending_nonce(&self, account: Address) -> Result<u64, RpcError> {
		self.call(
			"Failed to get nonce",
			self.provider.get_transaction_count(account).pending(),
		)
		.await
	}

	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TransactionHash, RpcError> {
		let pending = self
			.call(
				"Failed to send transaction",
				self.provider.send_raw_transaction(raw),
			)
			.await?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn transaction_by_hash(
		&self,
		hash: TransactionHash,
	) -> Result<Option<PendingState>, RpcError> {
		let tx = self
			.call(
				"Failed to get transaction",
				self.provider.get_transaction_by_hash(hash.0),
			)
			.await?;

		Ok(tx.map(|tx| match tx.block_number() {
			Some(_) => PendingState::Mined,
			None => PendingState::Pending,
		}))
	}

	async fn transaction_receipt(
		&self,
		hash: TransactionHash,
	) -> Result<Option<TransactionReceipt>, RpcError> {
		let receipt = self
			.call(
				"Failed to get receipt",
				self.provider.get_transaction_receipt(hash.0),
			)
			.await?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash),
			block_number: receipt.block_number,
			success: receipt.status(),
			gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
			contract_address: receipt.contract_address,
		}))
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		self.call("Failed to get block number", self.provider.get_block_number())
			.await
	}

	async fn filter_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<LogEntry>, RpcError> {
		let filter = Filter::new()
			.address(address)
			.from_block(from_block)
			.to_block(to_block);
		let logs = self
			.call("Failed to get logs", self.provider.get_logs(&filter))
			.await?;

		Ok(logs
			.into_iter()
			.map(|log| LogEntry {
				address: log.address(),
				topics: log.topics().to_vec(),
				data: log.data().data.clone(),
				block_number: log.block_number,
				transaction_hash: log.transaction_hash.map(TransactionHash),
				log_index: log.log_index,
			})
			.collect())
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.call("Failed to get gas price", self.provider.get_gas_price())
			.await
	}
}

/// Builds a client for the network's `rpc_url`.
pub fn create_client(network: &NetworkConfig) -> Result<Arc<dyn ChainClientInterface>, RpcError> {
	if !network.rpc_url.starts_with("http://") && !network.rpc_url.starts_with("https://") {
		return Err(RpcError::Configuration(format!(
			"RPC URL must use http or https: {}",
			network.rpc_url
		)));
	}
	Ok(Arc::new(AlloyChainClient::new(&network.rpc_url)?))
}

pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::ChainClientFactory;

	fn factory() -> Self::Factory {
		create_client
	}
}

impl crate::ChainClientRegistry for Registry {}
