//! Log entries returned by the chain node and the relay events decoded
//! from them.
//!
//! Relay events are delivered at least once: a tick that fails after
//! emitting some events is retried from the same checkpoint. Consumers must
//! deduplicate by [`EventId`], i.e. (contract address, transaction hash, log
//! index).

use crate::TransactionHash;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A raw log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: Option<u64>,
	pub transaction_hash: Option<TransactionHash>,
	pub log_index: Option<u64>,
}

/// Identity of a relay event for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
	pub contract: Address,
	pub transaction_hash: TransactionHash,
	pub log_index: u64,
}

/// Event-specific fields of a bridge contract log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEventKind {
	/// Funds locked on this chain for release on `to_chain`.
	Deposit {
		recipient: Address,
		value: U256,
		to_chain: U256,
	},
	/// Funds released on this chain for a deposit made on `from_chain`.
	Withdraw {
		recipient: Address,
		value: U256,
		from_chain: U256,
		source_tx: B256,
	},
	BridgeFunded {
		funder: Address,
		value: U256,
	},
	Paid {
		recipient: Address,
		value: U256,
	},
	AuthorityAdded {
		authority: Address,
	},
	AuthorityRemoved {
		authority: Address,
	},
	ThresholdUpdated {
		threshold: U256,
	},
	/// An authority signed off on a pending withdrawal.
	SignedForWithdraw {
		signer: Address,
		source_tx: B256,
	},
	ContractCreation {
		owner: Address,
	},
}

impl RelayEventKind {
	/// Solidity event name.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Deposit { .. } => "Deposit",
			Self::Withdraw { .. } => "Withdraw",
			Self::BridgeFunded { .. } => "BridgeFunded",
			Self::Paid { .. } => "Paid",
			Self::AuthorityAdded { .. } => "AuthorityAdded",
			Self::AuthorityRemoved { .. } => "AuthorityRemoved",
			Self::ThresholdUpdated { .. } => "ThresholdUpdated",
			Self::SignedForWithdraw { .. } => "SignedForWithdraw",
			Self::ContractCreation { .. } => "ContractCreation",
		}
	}
}

/// A decoded bridge contract log ready for relay decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
	/// Contract that emitted the log.
	pub contract: Address,
	/// Chain the log was observed on.
	pub chain_id: u64,
	pub block_number: u64,
	pub transaction_hash: TransactionHash,
	pub log_index: u64,
	pub kind: RelayEventKind,
}

impl RelayEvent {
	/// Deduplication key.
	pub fn id(&self) -> EventId {
		EventId {
			contract: self.contract,
			transaction_hash: self.transaction_hash,
			log_index: self.log_index,
		}
	}
}
