//! Transaction submitter for the bridge relay.
//!
//! [`DeliveryService`] builds, signs and broadcasts transactions for a
//! [`ChainEndpoint`] and resolves their on-chain outcome. It routes every
//! request by chain id to the chain client registered for that chain, and
//! serializes submissions per signing identity so nonces never collide.
//!
//! A submission sends exactly one transaction. Nothing is re-broadcast
//! automatically: failures are returned to the caller, and the nonce is only
//! consumed once the node has accepted the broadcast.

use relay_account::AccountService;
use relay_rpc::{ChainClientInterface, RpcError};
use relay_types::{
	truncate_id, Address, Bytes, CancelToken, ChainEndpoint, ConfirmationPolicy, Deployment,
	Destination, EndpointError, TransactionHash, TransactionOutcome, UnsignedTransaction, U256,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

mod confirmation;
mod nonce;

use confirmation::ConfirmationWaiter;
use nonce::NonceManager;

/// Gas limit used for contract creation when the caller does not pick one.
pub const DEFAULT_DEPLOY_GAS_LIMIT: u64 = 4_600_000;

/// Longest a submission waits on one node call while holding the sender's
/// nonce slot.
pub const DEFAULT_SUBMIT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while submitting or confirming transactions.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The pending nonce of the sender could not be read.
	#[error("Nonce resolution failed: {0}")]
	NonceResolution(String),
	/// The keystore refused to sign.
	#[error("Signing failed: {0}")]
	Signing(String),
	/// The node rejected the transaction or could not be reached.
	#[error("Broadcast failed: {0}")]
	Broadcast(String),
	#[error("Network error: {0}")]
	Network(String),
	#[error("Timed out after {waited:?} waiting for transaction {hash}")]
	ConfirmationTimeout {
		hash: TransactionHash,
		waited: Duration,
	},
	#[error("Confirmation wait cancelled")]
	Cancelled,
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	#[error("Receipt of contract creation {0} has no contract address")]
	MissingContractAddress(TransactionHash),
	#[error("No contract deployed on network '{0}'")]
	NoContract(String),
	#[error("No provider available for chain {0}")]
	NoProviderAvailable(u64),
	#[error(transparent)]
	Endpoint(#[from] EndpointError),
}

/// Submits transactions and tracks them to an outcome.
pub struct DeliveryService {
	/// Chain clients keyed by chain id.
	providers: HashMap<u64, Arc<dyn ChainClientInterface>>,
	account: Arc<AccountService>,
	nonces: NonceManager,
	submit_rpc_timeout: Duration,
}

impl DeliveryService {
	pub fn new(
		providers: HashMap<u64, Arc<dyn ChainClientInterface>>,
		account: Arc<AccountService>,
	) -> Self {
		Self {
			providers,
			account,
			nonces: NonceManager::default(),
			submit_rpc_timeout: DEFAULT_SUBMIT_RPC_TIMEOUT,
		}
	}

	pub fn with_submit_rpc_timeout(mut self, timeout: Duration) -> Self {
		self.submit_rpc_timeout = timeout;
		self
	}

	/// A call that outlives the timeout counts as a transport failure.
	async fn bounded<T>(
		&self,
		call: impl Future<Output = Result<T, RpcError>>,
	) -> Result<T, RpcError> {
		tokio::time::timeout(self.submit_rpc_timeout, call)
			.await
			.unwrap_or_else(|_| {
				Err(RpcError::Transport(format!(
					"no response within {:?}",
					self.submit_rpc_timeout
				)))
			})
	}

	fn provider(&self, chain_id: u64) -> Result<&Arc<dyn ChainClientInterface>, DeliveryError> {
		self.providers
			.get(&chain_id)
			.ok_or(DeliveryError::NoProviderAvailable(chain_id))
	}

	/// Signs and broadcasts one transaction from the endpoint's account.
	///
	/// The nonce is the larger of the node's pending count and the local
	/// counter for the account; the local counter only moves when the node
	/// accepts the broadcast.
	pub async fn submit(
		&self,
		endpoint: &ChainEndpoint,
		destination: Destination,
		payload: Bytes,
		gas_limit: u64,
		value: U256,
	) -> Result<TransactionHash, DeliveryError> {
		let provider = self.provider(endpoint.chain_id)?;
		let mut slot = self.nonces.lock(endpoint.chain_id, endpoint.from).await;

		let pending = self
			.bounded(provider.pending_nonce(endpoint.from))
			.await
			.map_err(|e| DeliveryError::NonceResolution(e.to_string()))?;
		let nonce = slot.resolve(pending);

		let unsigned = UnsignedTransaction {
			chain_id: endpoint.chain_id,
			nonce,
			gas_limit,
			gas_price: endpoint.gas_price,
			destination,
			value,
			payload,
		};
		let signed = self
			.account
			.sign(endpoint.from, &endpoint.passphrase, unsigned)
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))?;

		// A timed out broadcast may still have reached the mempool; the next
		// submission then resolves past it from the pending nonce.
		let node_hash = self
			.bounded(provider.send_raw_transaction(signed.raw()))
			.await
			.map_err(|e| DeliveryError::Broadcast(e.to_string()))?;
		slot.commit(nonce);

		if node_hash != signed.hash() {
			tracing::warn!(
				expected = %signed.hash(),
				reported = %node_hash,
				"Node reported a different transaction hash"
			);
		}

		tracing::info!(
			network = %endpoint.name,
			chain_id = endpoint.chain_id,
			tx_hash = %truncate_id(&signed.hash().to_string()),
			nonce,
			"Submitted transaction"
		);

		Ok(signed.hash())
	}

	/// Waits until `hash` is confirmed or known to be dropped.
	///
	/// Returns [`DeliveryError::ConfirmationTimeout`] once `policy.max_wait`
	/// has elapsed and [`DeliveryError::Cancelled`] as soon as `cancel`
	/// fires. Calling it again on a confirmed hash yields the same outcome.
	#[instrument(skip_all, fields(network = %endpoint.name, tx_hash = %truncate_id(&hash.to_string())))]
	pub async fn await_confirmation(
		&self,
		endpoint: &ChainEndpoint,
		hash: TransactionHash,
		policy: &ConfirmationPolicy,
		cancel: &CancelToken,
	) -> Result<TransactionOutcome, DeliveryError> {
		let provider = self.provider(endpoint.chain_id)?;
		let waiter = ConfirmationWaiter::new(provider.as_ref(), hash, policy);

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
			result = tokio::time::timeout(policy.max_wait, waiter.run()) => match result {
				Ok(outcome) => outcome,
				Err(_) => {
					tracing::warn!(waited = ?policy.max_wait, "Confirmation timeout reached");
					return Err(DeliveryError::ConfirmationTimeout {
						hash,
						waited: policy.max_wait,
					});
				},
			},
		};

		match &outcome {
			TransactionOutcome::Confirmed {
				receipt,
				apparent_revert,
			} => {
				tracing::info!(
					block_number = ?receipt.block_number,
					gas_used = receipt.gas_used,
					apparent_revert,
					"Transaction confirmed"
				);
			},
			TransactionOutcome::Failed { reason } => {
				tracing::warn!(reason = %reason, "Transaction failed");
				self.nonces.invalidate(endpoint.chain_id, endpoint.from).await;
			},
			TransactionOutcome::Pending => {},
		}

		Ok(outcome)
	}

	/// One lookup of the current state of `hash`, without waiting.
	///
	/// A hash unknown to the node is reported as `Failed`.
	pub async fn check_status(
		&self,
		endpoint: &ChainEndpoint,
		hash: TransactionHash,
	) -> Result<TransactionOutcome, DeliveryError> {
		let provider = self.provider(endpoint.chain_id)?;

		if let Some(receipt) = provider
			.transaction_receipt(hash)
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?
		{
			return Ok(TransactionOutcome::from_receipt(receipt));
		}

		let known = provider
			.transaction_by_hash(hash)
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
		Ok(match known {
			Some(_) => TransactionOutcome::Pending,
			None => TransactionOutcome::Failed {
				reason: "transaction unknown to the node".to_string(),
			},
		})
	}

	/// Deploys `bytecode` and records the created address in `endpoint`.
	///
	/// A zero-status receipt that still names a contract address is accepted
	/// and flagged with `apparent_revert`.
	pub async fn deploy(
		&self,
		endpoint: &mut ChainEndpoint,
		bytecode: Bytes,
		gas_limit: Option<u64>,
		policy: &ConfirmationPolicy,
		cancel: &CancelToken,
	) -> Result<Deployment, DeliveryError> {
		let hash = self
			.submit(
				endpoint,
				Destination::Create,
				bytecode,
				gas_limit.unwrap_or(DEFAULT_DEPLOY_GAS_LIMIT),
				U256::ZERO,
			)
			.await?;

		let receipt = match self
			.await_confirmation(endpoint, hash, policy, cancel)
			.await?
		{
			TransactionOutcome::Confirmed { receipt, .. } => receipt,
			TransactionOutcome::Failed { reason } => {
				return Err(DeliveryError::TransactionFailed(reason))
			},
			TransactionOutcome::Pending => {
				return Err(DeliveryError::ConfirmationTimeout {
					hash,
					waited: policy.max_wait,
				})
			},
		};

		if !receipt.success {
			tracing::warn!(
				network = %endpoint.name,
				tx_hash = %truncate_id(&hash.to_string()),
				"Contract creation receipt has zero status"
			);
		}
		let address: Address = receipt
			.contract_address
			.ok_or(DeliveryError::MissingContractAddress(hash))?;
		endpoint.set_contract_address(address)?;

		tracing::info!(
			network = %endpoint.name,
			contract = %address,
			gas_used = receipt.gas_used,
			"Contract deployed"
		);

		Ok(Deployment {
			network: endpoint.name.clone(),
			address,
			transaction_hash: hash,
			block_number: receipt.block_number,
			gas_used: receipt.gas_used,
			apparent_revert: !receipt.success,
		})
	}

	/// Submits a call into the endpoint's deployed contract.
	pub async fn call(
		&self,
		endpoint: &ChainEndpoint,
		payload: Bytes,
		gas_limit: u64,
		value: U256,
	) -> Result<TransactionHash, DeliveryError> {
		let contract = endpoint
			.contract_address()
			.ok_or_else(|| DeliveryError::NoContract(endpoint.name.clone()))?;
		self.submit(endpoint, Destination::Call(contract), payload, gas_limit, value)
			.await
	}

	/// Current gas price reported by the endpoint's node.
	pub async fn gas_price(&self, endpoint: &ChainEndpoint) -> Result<u128, DeliveryError> {
		self.provider(endpoint.chain_id)?
			.gas_price()
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))
	}
}
