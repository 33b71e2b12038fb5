//! Transaction types for the submitter.
//!
//! This module defines the unsigned and signed transaction envelopes, the
//! receipt returned by the chain node, and the outcome reported to callers
//! once a broadcast transaction is no longer pending.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker carried by confirmed transactions whose receipt has a zero status.
pub const EXECUTION_REVERTED: &str = "execution reverted";

/// Transaction hash, used for every status and receipt lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TransactionHash {
	type Err = alloy_primitives::hex::FromHexError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		B256::from_str(s).map(Self)
	}
}

impl From<B256> for TransactionHash {
	fn from(hash: B256) -> Self {
		Self(hash)
	}
}

/// Where a transaction goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
	/// Contract creation; the payload is the init code.
	Create,
	/// Call into an existing contract or account.
	Call(Address),
}

/// A transaction that has a nonce but no signature yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
	pub chain_id: u64,
	pub nonce: u64,
	pub gas_limit: u64,
	pub gas_price: u128,
	pub destination: Destination,
	pub value: U256,
	pub payload: Bytes,
}

/// An immutable signed transaction.
///
/// Produced once by the keystore and never mutated. `raw` is the exact byte
/// string broadcast to the node and `hash` identifies it on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
	sender: Address,
	tx: UnsignedTransaction,
	signature: Bytes,
	raw: Bytes,
	hash: TransactionHash,
}

impl SignedTransaction {
	pub fn new(
		sender: Address,
		tx: UnsignedTransaction,
		signature: Bytes,
		raw: Bytes,
		hash: TransactionHash,
	) -> Self {
		Self {
			sender,
			tx,
			signature,
			raw,
			hash,
		}
	}

	pub fn sender(&self) -> Address {
		self.sender
	}

	pub fn chain_id(&self) -> u64 {
		self.tx.chain_id
	}

	pub fn nonce(&self) -> u64 {
		self.tx.nonce
	}

	pub fn gas_limit(&self) -> u64 {
		self.tx.gas_limit
	}

	pub fn gas_price(&self) -> u128 {
		self.tx.gas_price
	}

	pub fn destination(&self) -> Destination {
		self.tx.destination
	}

	pub fn value(&self) -> U256 {
		self.tx.value
	}

	pub fn payload(&self) -> &Bytes {
		&self.tx.payload
	}

	/// 65-byte `r || s || v` signature.
	pub fn signature(&self) -> &Bytes {
		&self.signature
	}

	/// Encoded transaction as sent with `eth_sendRawTransaction`.
	pub fn raw(&self) -> &Bytes {
		&self.raw
	}

	pub fn hash(&self) -> TransactionHash {
		self.hash
	}
}

/// Whether the node still reports a known transaction as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingState {
	/// Still in the mempool.
	Pending,
	/// Included in a block.
	Mined,
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included, if reported.
	pub block_number: Option<u64>,
	/// Receipt status flag; false means execution reverted.
	pub success: bool,
	/// Gas consumed by the transaction.
	pub gas_used: u64,
	/// Address of the created contract for contract-creation transactions.
	pub contract_address: Option<Address>,
}

/// Final or current state of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
	/// Known to the node but not yet mined.
	Pending,
	/// Mined with a receipt.
	///
	/// `apparent_revert` is set when the receipt status is zero. For contract
	/// creation this does not prove the deployment failed: code has been
	/// observed at the created address despite a zero status, so the decision
	/// is left to the caller.
	Confirmed {
		receipt: TransactionReceipt,
		apparent_revert: bool,
	},
	/// The transaction definitively did not make it on chain.
	Failed { reason: String },
}

impl TransactionOutcome {
	/// Builds a `Confirmed` outcome, flagging zero-status receipts.
	pub fn from_receipt(receipt: TransactionReceipt) -> Self {
		let apparent_revert = !receipt.success;
		Self::Confirmed {
			receipt,
			apparent_revert,
		}
	}

	pub fn is_pending(&self) -> bool {
		matches!(self, Self::Pending)
	}

	pub fn is_confirmed(&self) -> bool {
		matches!(self, Self::Confirmed { .. })
	}

	pub fn is_failed(&self) -> bool {
		matches!(self, Self::Failed { .. })
	}

	pub fn receipt(&self) -> Option<&TransactionReceipt> {
		match self {
			Self::Confirmed { receipt, .. } => Some(receipt),
			_ => None,
		}
	}

	/// Returns the created contract address, if any.
	pub fn contract_address(&self) -> Option<Address> {
		self.receipt().and_then(|r| r.contract_address)
	}

	/// Returns [`EXECUTION_REVERTED`] for confirmed zero-status receipts.
	pub fn revert_marker(&self) -> Option<&'static str> {
		match self {
			Self::Confirmed {
				apparent_revert: true,
				..
			} => Some(EXECUTION_REVERTED),
			_ => None,
		}
	}
}

/// Record of a contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
	/// Network the contract was deployed to.
	pub network: String,
	/// Address of the created contract.
	pub address: Address,
	/// Creation transaction hash.
	pub transaction_hash: TransactionHash,
	/// Block the creation was mined in.
	pub block_number: Option<u64>,
	/// Gas used by the creation transaction.
	pub gas_used: u64,
	/// Receipt status was zero although an address was reported.
	pub apparent_revert: bool,
}
