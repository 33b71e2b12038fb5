//! Wiring of the submitter, the watchers and storage behind the CLI
//! commands.

use crate::sink::{EventSink, SinkStats, DEFAULT_DEDUP_CAPACITY};
use relay_account::AccountService;
use relay_config::{Config, ConfigError};
use relay_delivery::{DeliveryError, DeliveryService};
use relay_discovery::{
	BridgeEventWatcher, CheckpointStore, DiscoveryError, DiscoveryInterface, DiscoveryService,
};
use relay_rpc::ChainClientInterface;
use relay_storage::{StorageError, StorageService};
use relay_types::{
	Address, Bytes, CancelToken, ChainEndpoint, Deployment, StorageKey, TransactionHash,
	TransactionOutcome,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum RelayError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	#[error("Network '{network}' already has a contract at {address}")]
	AlreadyDeployed { network: String, address: Address },
	#[error("No network to watch: none has a contract address")]
	NothingToWatch,
	#[error("Event sink failed: {0}")]
	Sink(String),
}

pub struct Relay {
	config: Config,
	storage: Arc<StorageService>,
	clients: HashMap<u64, Arc<dyn ChainClientInterface>>,
	delivery: DeliveryService,
}

impl Relay {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		account: Arc<AccountService>,
		clients: HashMap<u64, Arc<dyn ChainClientInterface>>,
	) -> Self {
		let delivery = DeliveryService::new(clients.clone(), account);
		Self {
			config,
			storage,
			clients,
			delivery,
		}
	}

	/// Endpoint for `network`, with the contract address from the
	/// configuration or, failing that, from a recorded deployment.
	pub async fn endpoint(&self, network: &str) -> Result<ChainEndpoint, RelayError> {
		let mut endpoint = self.config.endpoint(network)?;
		if endpoint.contract_address().is_none() {
			let recorded: Option<Deployment> = self
				.storage
				.retrieve_optional(StorageKey::Deployments, network)
				.await?;
			if let Some(deployment) = recorded {
				endpoint
					.set_contract_address(deployment.address)
					.map_err(DeliveryError::from)?;
			}
		}
		Ok(endpoint)
	}

	/// Deploys the bridge contract to `network` and records the deployment.
	pub async fn deploy(
		&self,
		network: &str,
		bytecode: Bytes,
		gas_limit: Option<u64>,
		cancel: &CancelToken,
	) -> Result<Deployment, RelayError> {
		let mut endpoint = self.endpoint(network).await?;
		if let Some(address) = endpoint.contract_address() {
			return Err(RelayError::AlreadyDeployed {
				network: network.to_string(),
				address,
			});
		}

		let policy = self.config.confirmation.policy();
		let deployment = self
			.delivery
			.deploy(&mut endpoint, bytecode, gas_limit, &policy, cancel)
			.await?;

		self.storage
			.store(StorageKey::Deployments, network, &deployment)
			.await?;
		Ok(deployment)
	}

	/// Current state of `hash` on `network`.
	pub async fn status(
		&self,
		network: &str,
		hash: TransactionHash,
	) -> Result<TransactionOutcome, RelayError> {
		let endpoint = self.config.endpoint(network)?;
		Ok(self.delivery.check_status(&endpoint, hash).await?)
	}

	/// One watcher per watched network. With no networks listed, every
	/// network with a known contract is watched.
	async fn watchers(&self) -> Result<DiscoveryService, RelayError> {
		let names: Vec<String> = if self.config.watcher.networks.is_empty() {
			self.config.networks.keys().cloned().collect()
		} else {
			self.config.watcher.networks.clone()
		};
		let explicit = !self.config.watcher.networks.is_empty();
		let checkpoints = CheckpointStore::new(self.storage.clone());

		let mut watchers: Vec<Box<dyn DiscoveryInterface>> = Vec::new();
		for name in names {
			let endpoint = self.endpoint(&name).await?;
			if !explicit && endpoint.contract_address().is_none() {
				tracing::debug!(network = %name, "No contract address, not watching");
				continue;
			}
			let client = self
				.clients
				.get(&endpoint.chain_id)
				.cloned()
				.ok_or(DeliveryError::NoProviderAvailable(endpoint.chain_id))?;
			watchers.push(Box::new(BridgeEventWatcher::new(
				&endpoint,
				client,
				Some(checkpoints.clone()),
				self.config.watcher.polling_interval(),
			)?));
		}

		if watchers.is_empty() {
			return Err(RelayError::NothingToWatch);
		}
		Ok(DiscoveryService::new(watchers))
	}

	/// Runs the watchers until `shutdown` completes, then drains the events
	/// already emitted.
	pub async fn watch(&self, shutdown: impl Future<Output = ()>) -> Result<SinkStats, RelayError> {
		let discovery = self.watchers().await?;
		let (sender, receiver) = mpsc::unbounded_channel();
		let sink = tokio::spawn(EventSink::new(DEFAULT_DEDUP_CAPACITY).run(receiver));

		discovery.start_all(sender.clone()).await?;
		tracing::info!(networks = ?discovery.networks(), "Watching");

		shutdown.await;

		let stopped = discovery.stop_all().await;
		drop(sender);
		let stats = sink.await.map_err(|e| RelayError::Sink(e.to_string()))?;
		stopped?;

		tracing::info!(
			delivered = stats.delivered,
			duplicates = stats.duplicates,
			"Stopped watching"
		);
		Ok(stats)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_account::implementations::local::LocalKeystore;
	use relay_discovery::decode::{encode_log, Deposit};
	use relay_rpc::implementations::mock::MockChainClient;
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_types::{PendingState, SecretString, TransactionReceipt, B256, U256};
	use std::time::Duration;

	const CONFIG: &str = r#"
[relay]
id = "relay-test"

[networks.home]
rpc_url = "http://127.0.0.1:8545"
chain_id = 1337
gas_price = 1
from = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
contract_address = "0xb7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7"
start_block = 11

[networks.foreign]
rpc_url = "http://127.0.0.1:9545"
chain_id = 77
gas_price = 1
from = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"

[account]
primary = "local"
[account.implementations.local]
keys = [{ private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80" }]

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	struct Fixture {
		relay: Relay,
		home: Arc<MockChainClient>,
		foreign: Arc<MockChainClient>,
		storage: Arc<StorageService>,
	}

	fn fixture(config: &str) -> Fixture {
		let config: Config = config.parse().unwrap();
		let keystore =
			LocalKeystore::new(vec![(SecretString::from(DEV_KEY), SecretString::default())])
				.unwrap();
		let account = Arc::new(AccountService::new(Box::new(keystore)));
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let home = Arc::new(MockChainClient::new());
		let foreign = Arc::new(MockChainClient::new());
		let mut clients: HashMap<u64, Arc<dyn ChainClientInterface>> = HashMap::new();
		clients.insert(1337, home.clone());
		clients.insert(77, foreign.clone());

		Fixture {
			relay: Relay::new(config, storage.clone(), account, clients),
			home,
			foreign,
			storage,
		}
	}

	fn bridge() -> Address {
		Address::repeat_byte(0xb7)
	}

	#[tokio::test]
	async fn test_deploy_records_and_resolves_contract() {
		let f = fixture(CONFIG);
		let created = Address::repeat_byte(0xcc);
		f.foreign
			.script_transaction_by_hash([Ok(Some(PendingState::Mined))]);
		f.foreign.script_receipt([Ok(Some(TransactionReceipt {
			hash: TransactionHash(B256::ZERO),
			block_number: Some(3),
			success: true,
			gas_used: 2_000_000,
			contract_address: Some(created),
		}))]);

		assert_eq!(f.relay.endpoint("foreign").await.unwrap().contract_address(), None);

		let deployment = f
			.relay
			.deploy("foreign", Bytes::from_static(&[0x60, 0x80]), None, &CancelToken::new())
			.await
			.unwrap();
		assert_eq!(deployment.address, created);
		assert_eq!(deployment.network, "foreign");
		assert_eq!(f.foreign.sent().len(), 1);

		let stored: Deployment = f
			.storage
			.retrieve(StorageKey::Deployments, "foreign")
			.await
			.unwrap();
		assert_eq!(stored, deployment);
		assert_eq!(
			f.relay.endpoint("foreign").await.unwrap().contract_address(),
			Some(created)
		);

		let again = f
			.relay
			.deploy("foreign", Bytes::from_static(&[0x60, 0x80]), None, &CancelToken::new())
			.await;
		assert!(matches!(again, Err(RelayError::AlreadyDeployed { .. })));
		assert_eq!(f.foreign.sent().len(), 1);
	}

	#[tokio::test]
	async fn test_status_unknown_hash_is_failed() {
		let f = fixture(CONFIG);
		let outcome = f
			.relay
			.status("home", TransactionHash(B256::repeat_byte(0x42)))
			.await
			.unwrap();
		assert!(outcome.is_failed());

		let unknown = f.relay.status("sidechain", TransactionHash::default()).await;
		assert!(matches!(unknown, Err(RelayError::Config(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn test_watch_deduplicates_and_drains() {
		let f = fixture(CONFIG);
		let deposit = encode_log(
			&Deposit {
				recipient: Address::repeat_byte(0x01),
				value: U256::from(5),
				toChain: U256::from(77),
			},
			bridge(),
			12,
			0,
		);
		f.home.script_block_number([Ok(11), Ok(13)]);
		f.home.add_logs([deposit.clone(), deposit]);

		let stats = f
			.relay
			.watch(tokio::time::sleep(Duration::from_secs(3)))
			.await
			.unwrap();

		assert_eq!(
			stats,
			SinkStats {
				delivered: 1,
				duplicates: 1,
			}
		);
		// foreign has no contract and is skipped
		assert!(f.foreign.log_queries().is_empty());
	}

	#[tokio::test]
	async fn test_watch_listed_network_needs_contract() {
		let f = fixture(&format!("{}\n[watcher]\nnetworks = [\"foreign\"]\n", CONFIG));
		let result = f.relay.watch(async {}).await;
		assert!(matches!(
			result,
			Err(RelayError::Discovery(DiscoveryError::MissingContract(name))) if name == "foreign"
		));
	}

	#[tokio::test]
	async fn test_nothing_to_watch() {
		let f = fixture(&CONFIG.replace(
			"contract_address = \"0xb7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7b7\"\n",
			"",
		));
		assert!(matches!(
			f.relay.watch(async {}).await,
			Err(RelayError::NothingToWatch)
		));
	}
}
