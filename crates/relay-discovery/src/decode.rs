//! Decoding of bridge contract logs into [`RelayEvent`]s.

use alloy_primitives::{Log as PrimLog, LogData, B256};
use alloy_sol_types::{sol, SolEvent};
use relay_types::{LogEntry, RelayEvent, RelayEventKind};
use thiserror::Error;

sol! {
	/// Funds locked for release on `toChain`.
	event Deposit(address indexed recipient, uint256 value, uint256 toChain);
	/// Emitted once by the constructor.
	event ContractCreation(address indexed owner);
	/// Funds released for a deposit observed on `fromChain`.
	event Withdraw(address indexed recipient, uint256 value, uint256 fromChain, bytes32 txHash);
	event BridgeFunded(address indexed funder, uint256 value);
	event Paid(address indexed recipient, uint256 value);
	event AuthorityAdded(address indexed authority);
	event AuthorityRemoved(address indexed authority);
	event ThresholdUpdated(uint256 threshold);
	/// An authority approved the withdrawal for `txHash`.
	event SignedForWithdraw(address indexed signer, bytes32 txHash);
}

/// Why a single log could not be turned into a relay event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
	#[error("Log has no topics")]
	MissingTopic,
	#[error("Unknown event signature {0}")]
	UnknownEvent(B256),
	#[error("Malformed {event} log: {reason}")]
	Malformed { event: &'static str, reason: String },
	/// Pending logs carry no block number, transaction hash or log index.
	#[error("Log is missing its {0}")]
	MissingMetadata(&'static str),
}

fn decode<E: SolEvent>(log: &PrimLog) -> Result<E, DecodeError> {
	E::decode_log(log, true)
		.map(|decoded| decoded.data)
		.map_err(|e| DecodeError::Malformed {
			event: E::SIGNATURE.split('(').next().unwrap_or(E::SIGNATURE),
			reason: e.to_string(),
		})
}

fn decode_kind(log: &PrimLog) -> Result<RelayEventKind, DecodeError> {
	let topic0 = *log.topics().first().ok_or(DecodeError::MissingTopic)?;

	let kind = match topic0 {
		t if t == Deposit::SIGNATURE_HASH => {
			let ev = decode::<Deposit>(log)?;
			RelayEventKind::Deposit {
				recipient: ev.recipient,
				value: ev.value,
				to_chain: ev.toChain,
			}
		},
		t if t == Withdraw::SIGNATURE_HASH => {
			let ev = decode::<Withdraw>(log)?;
			RelayEventKind::Withdraw {
				recipient: ev.recipient,
				value: ev.value,
				from_chain: ev.fromChain,
				source_tx: ev.txHash,
			}
		},
		t if t == BridgeFunded::SIGNATURE_HASH => {
			let ev = decode::<BridgeFunded>(log)?;
			RelayEventKind::BridgeFunded {
				funder: ev.funder,
				value: ev.value,
			}
		},
		t if t == Paid::SIGNATURE_HASH => {
			let ev = decode::<Paid>(log)?;
			RelayEventKind::Paid {
				recipient: ev.recipient,
				value: ev.value,
			}
		},
		t if t == AuthorityAdded::SIGNATURE_HASH => RelayEventKind::AuthorityAdded {
			authority: decode::<AuthorityAdded>(log)?.authority,
		},
		t if t == AuthorityRemoved::SIGNATURE_HASH => RelayEventKind::AuthorityRemoved {
			authority: decode::<AuthorityRemoved>(log)?.authority,
		},
		t if t == ThresholdUpdated::SIGNATURE_HASH => RelayEventKind::ThresholdUpdated {
			threshold: decode::<ThresholdUpdated>(log)?.threshold,
		},
		t if t == SignedForWithdraw::SIGNATURE_HASH => {
			let ev = decode::<SignedForWithdraw>(log)?;
			RelayEventKind::SignedForWithdraw {
				signer: ev.signer,
				source_tx: ev.txHash,
			}
		},
		t if t == ContractCreation::SIGNATURE_HASH => RelayEventKind::ContractCreation {
			owner: decode::<ContractCreation>(log)?.owner,
		},
		other => return Err(DecodeError::UnknownEvent(other)),
	};

	Ok(kind)
}

/// Decodes one log observed on `chain_id`.
pub fn decode_log(log: &LogEntry, chain_id: u64) -> Result<RelayEvent, DecodeError> {
	let prim_log = PrimLog {
		address: log.address,
		data: LogData::new_unchecked(log.topics.clone(), log.data.clone()),
	};
	let kind = decode_kind(&prim_log)?;

	Ok(RelayEvent {
		contract: log.address,
		chain_id,
		block_number: log
			.block_number
			.ok_or(DecodeError::MissingMetadata("block number"))?,
		transaction_hash: log
			.transaction_hash
			.ok_or(DecodeError::MissingMetadata("transaction hash"))?,
		log_index: log
			.log_index
			.ok_or(DecodeError::MissingMetadata("log index"))?,
		kind,
	})
}

/// Builds the log entry a node would return for `event`. Test helper for
/// crates driving a watcher against a scripted chain.
#[cfg(any(test, feature = "testing"))]
pub fn encode_log<E: SolEvent>(
	event: &E,
	address: relay_types::Address,
	block_number: u64,
	log_index: u64,
) -> LogEntry {
	let data = event.encode_log_data();
	LogEntry {
		address,
		topics: data.topics().to_vec(),
		data: data.data,
		block_number: Some(block_number),
		transaction_hash: Some(relay_types::TransactionHash(B256::with_last_byte(
			block_number as u8,
		))),
		log_index: Some(log_index),
	}
}
