//! Registry of implementation factories, keyed by the names used in the
//! configuration file.

use relay_account::{AccountFactory, AccountService};
use relay_config::Config;
use relay_rpc::{ChainClientFactory, ChainClientInterface};
use relay_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Every known implementation factory.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub chain_client: HashMap<String, ChainClientFactory>,
}

impl FactoryRegistry {
	fn new() -> Self {
		let mut registry = Self {
			storage: HashMap::new(),
			account: HashMap::new(),
			chain_client: HashMap::new(),
		};

		for (name, factory) in relay_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.storage.insert(name.to_string(), factory);
		}
		for (name, factory) in relay_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.account.insert(name.to_string(), factory);
		}
		for (name, factory) in relay_rpc::get_all_implementations() {
			tracing::debug!("Registering chain client implementation: {}", name);
			registry.chain_client.insert(name.to_string(), factory);
		}

		registry
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(FactoryRegistry::new)
}

fn lookup<'a, F>(
	factories: &'a HashMap<String, F>,
	kind: &str,
	name: &str,
) -> Result<&'a F, String> {
	factories.get(name).ok_or_else(|| {
		let mut available: Vec<_> = factories.keys().cloned().collect();
		available.sort();
		format!(
			"Unknown {} implementation '{}'. Available: [{}]",
			kind,
			name,
			available.join(", ")
		)
	})
}

/// Builds the configured storage backend.
pub fn build_storage(config: &Config) -> Result<Arc<StorageService>, String> {
	let name = &config.storage.primary;
	let factory = lookup(&get_registry().storage, "storage", name)?;
	let table = config
		.storage
		.implementations
		.get(name)
		.ok_or_else(|| format!("Missing configuration for storage '{}'", name))?;
	let backend = factory(table).map_err(|e| format!("Storage '{}': {}", name, e))?;
	Ok(Arc::new(StorageService::new(backend)))
}

/// Builds the configured keystore and checks that it holds the signing
/// account of every network.
pub fn build_account(config: &Config) -> Result<Arc<AccountService>, String> {
	let name = &config.account.primary;
	let factory = lookup(&get_registry().account, "account", name)?;
	let table = config
		.account
		.implementations
		.get(name)
		.ok_or_else(|| format!("Missing configuration for account '{}'", name))?;
	let keystore = factory(table).map_err(|e| format!("Account '{}': {}", name, e))?;
	let service = AccountService::new(keystore);

	for (network, endpoint) in &config.networks {
		if !service.has_account(endpoint.from) {
			return Err(format!(
				"Account '{}' has no key for {}, the sender of network '{}'",
				name, endpoint.from, network
			));
		}
	}
	Ok(Arc::new(service))
}

/// Builds one chain client per chain id. Networks sharing a chain id share
/// the client of the first of them.
pub fn build_chain_clients(
	config: &Config,
) -> Result<HashMap<u64, Arc<dyn ChainClientInterface>>, String> {
	let factory = lookup(
		&get_registry().chain_client,
		"chain client",
		&config.relay.chain_client,
	)?;

	let mut clients = HashMap::new();
	for (name, network) in &config.networks {
		if clients.contains_key(&network.chain_id) {
			tracing::warn!(
				network = %name,
				chain_id = network.chain_id,
				"Chain id already has a client, reusing it"
			);
			continue;
		}
		let client = factory(network).map_err(|e| format!("Network '{}': {}", name, e))?;
		clients.insert(network.chain_id, client);
	}
	Ok(clients)
}
