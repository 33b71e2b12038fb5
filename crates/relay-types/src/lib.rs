//! Common types module for the bridge relay.
//!
//! This module defines the data types shared by the transaction submitter,
//! the event watcher and the collaborators they drive (chain RPC client,
//! signing keystore, storage). Keeping them in one crate lets every
//! component agree on hashes, receipts and event shapes.

/// Cooperative cancellation for long-running waits.
pub mod cancel;
/// Chain endpoint and network configuration types.
pub mod chain;
/// Watermark checkpoint tracked by the event watcher.
pub mod checkpoint;
/// Confirmation policy types for awaiting transaction outcomes.
pub mod confirmation;
/// Raw log entries and decoded relay events.
pub mod events;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for passphrases and private keys.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Transaction envelopes, receipts and outcomes.
pub mod transaction;
/// Utility functions for formatting identifiers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use cancel::CancelToken;
pub use chain::{ChainEndpoint, EndpointError, NetworkConfig, NetworksConfig};
pub use checkpoint::Checkpoint;
pub use confirmation::{ConfirmationPolicy, ConfirmationStrategy};
pub use events::{EventId, LogEntry, RelayEvent, RelayEventKind};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::StorageKey;
pub use transaction::{
	Deployment, Destination, PendingState, SignedTransaction, TransactionHash, TransactionOutcome,
	TransactionReceipt, UnsignedTransaction, EXECUTION_REVERTED,
};
pub use utils::{truncate_id, without_0x_prefix};
pub use validation::*;

pub use alloy_primitives::{Address, Bytes, B256, U256};
