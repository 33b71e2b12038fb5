//! Configuration module for the bridge relay.
//!
//! The relay is configured from a single TOML file. String values may
//! reference environment variables as `${VAR}` or `${VAR:-default}`, which
//! keeps private keys and passphrases out of the file. The file is validated
//! as a whole after parsing; implementation tables (`account`, `storage`)
//! are validated later by the implementation they select.

mod loader;

use relay_types::{
	ChainEndpoint, ConfirmationPolicy, ConfirmationStrategy, NetworkConfig, NetworksConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default rendering dumps the input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub relay: RelayConfig,
	/// Networks keyed by name, e.g. `home` and `foreign`.
	pub networks: NetworksConfig,
	pub account: AccountConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub watcher: WatcherConfig,
	#[serde(default)]
	pub confirmation: ConfirmationConfig,
}

/// Identity of this relay instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
	/// Unique identifier, used in logs.
	pub id: String,
	/// Chain client implementation used for every network.
	#[serde(default = "default_chain_client")]
	pub chain_client: String,
}

fn default_chain_client() -> String {
	"evm_alloy".to_string()
}

/// Configuration for the signing keystore.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the storage backend holding checkpoints and
/// deployment records.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the event watchers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherConfig {
	/// Networks to watch. Each needs a contract address, either configured
	/// or recorded by a previous deployment.
	#[serde(default)]
	pub networks: Vec<String>,
	#[serde(default = "default_polling_interval_ms")]
	pub polling_interval_ms: u64,
}

fn default_polling_interval_ms() -> u64 {
	500
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			networks: Vec::new(),
			polling_interval_ms: default_polling_interval_ms(),
		}
	}
}

impl WatcherConfig {
	pub fn polling_interval(&self) -> Duration {
		Duration::from_millis(self.polling_interval_ms)
	}
}

/// How transaction outcomes are awaited. Missing keys take the defaults of
/// [`ConfirmationPolicy`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
	pub strategy: ConfirmationStrategy,
	pub initial_interval_ms: u64,
	pub max_interval_ms: u64,
	pub multiplier: f64,
	pub max_wait_secs: u64,
	pub dropped_after: u32,
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		let policy = ConfirmationPolicy::default();
		Self {
			strategy: policy.strategy,
			initial_interval_ms: policy.initial_interval.as_millis() as u64,
			max_interval_ms: policy.max_interval.as_millis() as u64,
			multiplier: policy.multiplier,
			max_wait_secs: policy.max_wait.as_secs(),
			dropped_after: policy.dropped_after,
		}
	}
}

impl ConfirmationConfig {
	pub fn policy(&self) -> ConfirmationPolicy {
		ConfirmationPolicy {
			strategy: self.strategy,
			initial_interval: Duration::from_millis(self.initial_interval_ms),
			max_interval: Duration::from_millis(self.max_interval_ms),
			multiplier: self.multiplier,
			max_wait: Duration::from_secs(self.max_wait_secs),
			dropped_after: self.dropped_after,
		}
	}
}

impl Config {
	/// Loads configuration from a file, resolving environment variables and
	/// validating the result.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		loader::load_file(path.as_ref()).await
	}

	/// Returns the runtime endpoint for the network called `name`.
	pub fn endpoint(&self, name: &str) -> Result<ChainEndpoint, ConfigError> {
		self.networks
			.get(name)
			.map(|network| ChainEndpoint::from_config(name, network))
			.ok_or_else(|| ConfigError::Validation(format!("Unknown network '{}'", name)))
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.relay.id.is_empty() {
			return Err(ConfigError::Validation("Relay ID cannot be empty".into()));
		}
		if self.relay.chain_client.is_empty() {
			return Err(ConfigError::Validation(
				"Relay chain_client cannot be empty".into(),
			));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"At least one network must be configured".into(),
			));
		}
		for (name, network) in &self.networks {
			validate_network(name, network)?;
		}

		validate_primary("account", &self.account.primary, &self.account.implementations)?;
		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;

		for name in &self.watcher.networks {
			if !self.networks.contains_key(name) {
				return Err(ConfigError::Validation(format!(
					"Watched network '{}' not found in networks",
					name
				)));
			}
		}
		if !(50..=60_000).contains(&self.watcher.polling_interval_ms) {
			return Err(ConfigError::Validation(format!(
				"Watcher polling_interval_ms must be between 50 and 60000, got {}",
				self.watcher.polling_interval_ms
			)));
		}

		self.validate_confirmation()
	}

	fn validate_confirmation(&self) -> Result<(), ConfigError> {
		let c = &self.confirmation;
		if c.initial_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"Confirmation initial_interval_ms must be greater than 0".into(),
			));
		}
		if c.initial_interval_ms > c.max_interval_ms {
			return Err(ConfigError::Validation(format!(
				"Confirmation initial_interval_ms ({}) cannot exceed max_interval_ms ({})",
				c.initial_interval_ms, c.max_interval_ms
			)));
		}
		if c.multiplier.is_nan() || c.multiplier < 1.0 {
			return Err(ConfigError::Validation(format!(
				"Confirmation multiplier must be at least 1.0, got {}",
				c.multiplier
			)));
		}
		if c.max_wait_secs == 0 {
			return Err(ConfigError::Validation(
				"Confirmation max_wait_secs must be at least 1".into(),
			));
		}
		if c.dropped_after == 0 {
			return Err(ConfigError::Validation(
				"Confirmation dropped_after must be at least 1".into(),
			));
		}
		Ok(())
	}
}

fn validate_network(name: &str, network: &NetworkConfig) -> Result<(), ConfigError> {
	if !network.rpc_url.starts_with("http://") && !network.rpc_url.starts_with("https://") {
		return Err(ConfigError::Validation(format!(
			"Network '{}' rpc_url must start with http:// or https://",
			name
		)));
	}
	if network.chain_id == 0 {
		return Err(ConfigError::Validation(format!(
			"Network '{}' chain_id must be at least 1",
			name
		)));
	}
	if network.gas_price == 0 {
		return Err(ConfigError::Validation(format!(
			"Network '{}' gas_price must be greater than 0",
			name
		)));
	}
	Ok(())
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = loader::resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_types::Address;

	const BASE: &str = r#"
[relay]
id = "relay-dev"

[networks.home]
rpc_url = "http://127.0.0.1:8545"
chain_id = 1337
gas_price = 10000000
from = "0x8f9b540b19520f8259115a90e4b4ffaeac642a30"
passphrase = "password"
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
start_block = 3

[networks.foreign]
rpc_url = "https://foreign.example.org"
chain_id = 77
gas_price = 1000000000
from = "0x8f9b540b19520f8259115a90e4b4ffaeac642a30"

[account]
primary = "local"
[account.implementations.local]
keys = [{ private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80", passphrase = "password" }]

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	fn with(extra: &str) -> String {
		format!("{}\n{}", BASE, extra)
	}

	#[test]
	fn test_parse_with_defaults() {
		let config: Config = BASE.parse().unwrap();

		assert_eq!(config.relay.id, "relay-dev");
		assert_eq!(config.relay.chain_client, "evm_alloy");
		assert_eq!(config.networks.len(), 2);
		assert!(config.watcher.networks.is_empty());
		assert_eq!(config.watcher.polling_interval(), Duration::from_millis(500));
		assert_eq!(config.confirmation.policy(), ConfirmationPolicy::default());

		let foreign = &config.networks["foreign"];
		assert_eq!(foreign.contract_address, None);
		assert_eq!(foreign.start_block, None);
		assert!(foreign.passphrase.is_empty());
	}

	#[test]
	fn test_endpoint_lookup() {
		let config: Config = BASE.parse().unwrap();

		let home = config.endpoint("home").unwrap();
		assert_eq!(home.name, "home");
		assert_eq!(home.chain_id, 1337);
		assert_eq!(home.gas_price, 10_000_000);
		assert_eq!(home.start_block, Some(3));
		assert_eq!(
			home.contract_address(),
			Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>().unwrap())
		);

		assert!(config.endpoint("sidechain").is_err());
	}

	#[test]
	fn test_confirmation_section() {
		let config: Config = with(
			r#"
[confirmation]
strategy = "receipt_retry"
initial_interval_ms = 100
max_interval_ms = 400
max_wait_secs = 30
"#,
		)
		.parse()
		.unwrap();

		let policy = config.confirmation.policy();
		assert_eq!(policy.strategy, ConfirmationStrategy::ReceiptRetry);
		assert_eq!(policy.initial_interval, Duration::from_millis(100));
		assert_eq!(policy.max_interval, Duration::from_millis(400));
		assert_eq!(policy.multiplier, 2.0);
		assert_eq!(policy.max_wait, Duration::from_secs(30));
		assert_eq!(policy.dropped_after, 30);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("RELAY_TEST_CONFIG_ID", "relay-from-env");

		let config: Config = BASE
			.replace("\"relay-dev\"", "\"${RELAY_TEST_CONFIG_ID}\"")
			.parse()
			.unwrap();
		assert_eq!(config.relay.id, "relay-from-env");

		std::env::remove_var("RELAY_TEST_CONFIG_ID");
	}

	fn validation_error(config: &str) -> String {
		match config.parse::<Config>() {
			Err(ConfigError::Validation(message)) => message,
			other => panic!("expected validation error, got {:?}", other.map(|c| c.relay.id)),
		}
	}

	#[test]
	fn test_network_rules() {
		let message = validation_error(&BASE.replace("https://foreign", "ws://foreign"));
		assert!(message.contains("foreign") && message.contains("rpc_url"));

		let message = validation_error(&BASE.replace("chain_id = 77", "chain_id = 0"));
		assert!(message.contains("chain_id"));

		let message = validation_error(&BASE.replace("gas_price = 1000000000", "gas_price = 0"));
		assert!(message.contains("gas_price"));
	}

	#[test]
	fn test_primary_must_exist() {
		let message = validation_error(&BASE.replace("primary = \"memory\"", "primary = \"file\""));
		assert!(message.contains("Primary storage 'file'"));
	}

	#[test]
	fn test_watcher_rules() {
		let message = validation_error(&with("[watcher]\nnetworks = [\"sidechain\"]\n"));
		assert!(message.contains("sidechain"));

		let message = validation_error(&with("[watcher]\npolling_interval_ms = 10\n"));
		assert!(message.contains("polling_interval_ms"));

		let config: Config = with("[watcher]\nnetworks = [\"home\", \"foreign\"]\npolling_interval_ms = 50\n")
			.parse()
			.unwrap();
		assert_eq!(config.watcher.networks, vec!["home", "foreign"]);
	}

	#[test]
	fn test_confirmation_rules() {
		let message = validation_error(&with(
			"[confirmation]\ninitial_interval_ms = 5000\nmax_interval_ms = 1000\n",
		));
		assert!(message.contains("cannot exceed"));

		let message = validation_error(&with("[confirmation]\nmultiplier = 0.5\n"));
		assert!(message.contains("multiplier"));

		let message = validation_error(&with("[confirmation]\nmax_wait_secs = 0\n"));
		assert!(message.contains("max_wait_secs"));

		let message = validation_error(&with("[confirmation]\ndropped_after = 0\n"));
		assert!(message.contains("dropped_after"));
	}

	#[test]
	fn test_parse_error_is_short() {
		let err = "[relay\nid = 1".parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("relay.toml");
		std::fs::write(&path, BASE).unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.relay.id, "relay-dev");

		let missing = Config::from_file(dir.path().join("missing.toml")).await;
		assert!(matches!(missing, Err(ConfigError::Io(_))));
	}
}
