//! Network configuration and chain endpoint types.
//!
//! A `NetworkConfig` is what the operator writes in the TOML file. A
//! `ChainEndpoint` is the runtime view of one network that the submitter and
//! the watcher are handed: connection details, the signing identity, and the
//! bridge contract address once it is known.

use crate::SecretString;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Configuration for a single EVM network.
///
/// # Fields
///
/// * `rpc_url` - The HTTP(S) JSON-RPC endpoint of the chain node
/// * `chain_id` - EIP-155 chain identifier used when signing
/// * `gas_price` - Gas price in wei for every transaction sent to this network
/// * `from` - Address of the signing account held by the keystore
/// * `passphrase` - Passphrase unlocking `from` in the keystore
/// * `contract_address` - Deployed bridge contract, if already deployed
/// * `start_block` - First block the watcher scans when no checkpoint is stored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub rpc_url: String,
	pub chain_id: u64,
	pub gas_price: u64,
	pub from: Address,
	#[serde(default)]
	pub passphrase: SecretString,
	#[serde(default)]
	pub contract_address: Option<Address>,
	#[serde(default)]
	pub start_block: Option<u64>,
}

/// Networks configuration keyed by network name (e.g. "home", "foreign").
pub type NetworksConfig = BTreeMap<String, NetworkConfig>;

/// Errors raised when mutating a chain endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
	/// The contract address is write-once.
	#[error("Contract address for network '{name}' is already set to {existing}")]
	ContractAlreadySet { name: String, existing: Address },
}

/// Runtime view of one network.
///
/// Everything except the contract address is fixed for the lifetime of the
/// endpoint. The contract address is set at most once, after deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
	pub name: String,
	pub rpc_url: String,
	pub chain_id: u64,
	pub gas_price: u128,
	pub from: Address,
	pub passphrase: SecretString,
	pub start_block: Option<u64>,
	contract_address: Option<Address>,
}

impl ChainEndpoint {
	/// Builds an endpoint from its configuration entry.
	pub fn from_config(name: impl Into<String>, config: &NetworkConfig) -> Self {
		Self {
			name: name.into(),
			rpc_url: config.rpc_url.clone(),
			chain_id: config.chain_id,
			gas_price: u128::from(config.gas_price),
			from: config.from,
			passphrase: config.passphrase.clone(),
			start_block: config.start_block,
			contract_address: config.contract_address,
		}
	}

	/// Returns the deployed contract address, if known.
	pub fn contract_address(&self) -> Option<Address> {
		self.contract_address
	}

	/// Records the deployed contract address.
	///
	/// Setting the same address twice is a no-op; replacing a different
	/// address is rejected.
	pub fn set_contract_address(&mut self, address: Address) -> Result<(), EndpointError> {
		match self.contract_address {
			Some(existing) if existing != address => Err(EndpointError::ContractAlreadySet {
				name: self.name.clone(),
				existing,
			}),
			_ => {
				self.contract_address = Some(address);
				Ok(())
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	fn config() -> NetworkConfig {
		NetworkConfig {
			rpc_url: "http://127.0.0.1:8545".to_string(),
			chain_id: 1337,
			gas_price: 10_000_000,
			from: address!("8f9b540b19520f8259115a90e4b4ffaeac642a30"),
			passphrase: SecretString::from("password"),
			contract_address: None,
			start_block: Some(7),
		}
	}

	#[test]
	fn test_from_config() {
		let endpoint = ChainEndpoint::from_config("home", &config());
		assert_eq!(endpoint.name, "home");
		assert_eq!(endpoint.chain_id, 1337);
		assert_eq!(endpoint.start_block, Some(7));
		assert_eq!(endpoint.contract_address(), None);
	}

	#[test]
	fn test_contract_address_is_write_once() {
		let mut endpoint = ChainEndpoint::from_config("home", &config());
		let first = address!("e4732e8d48810e49eef741cc31e997513fa999c5");
		let second = address!("0000000000000000000000000000000000000001");

		endpoint.set_contract_address(first).unwrap();
		// Same address again is accepted
		endpoint.set_contract_address(first).unwrap();
		assert_eq!(
			endpoint.set_contract_address(second),
			Err(EndpointError::ContractAlreadySet {
				name: "home".to_string(),
				existing: first,
			})
		);
		assert_eq!(endpoint.contract_address(), Some(first));
	}

	#[test]
	fn test_network_config_from_toml() {
		let raw = r#"
			rpc_url = "https://rpc.example.org"
			chain_id = 5
			gas_price = 2000000000
			from = "0x8f9b540b19520f8259115a90e4b4ffaeac642a30"
			passphrase = "secret"
		"#;
		let parsed: NetworkConfig = toml::from_str(raw).unwrap();
		assert_eq!(parsed.chain_id, 5);
		assert_eq!(parsed.gas_price, 2_000_000_000);
		assert_eq!(parsed.passphrase.expose_secret(), "secret");
		assert!(parsed.contract_address.is_none());
		assert!(parsed.start_block.is_none());
	}
}
