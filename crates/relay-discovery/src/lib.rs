//! Event watcher for the bridge relay.
//!
//! A watcher polls one chain for logs of the bridge contract on a fixed
//! interval, decodes them into [`RelayEvent`]s and sends them downstream
//! over an unbounded channel. [`DiscoveryService`] runs one watcher per
//! watched network.
//!
//! Delivery downstream is at least once: a checkpoint that fails to persist
//! is re-scanned after a restart. Consumers deduplicate with
//! [`RelayEvent::id`].

use async_trait::async_trait;
use relay_types::RelayEvent;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod checkpoint;
pub mod decode;

pub mod implementations {
	pub mod onchain {
		pub mod bridge;
	}
}

pub use checkpoint::CheckpointStore;
pub use decode::{decode_log, DecodeError};
pub use implementations::onchain::bridge::{BridgeEventWatcher, TickOutcome};

/// Errors that can occur while starting or stopping watchers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Already monitoring")]
	AlreadyMonitoring,
	#[error("No contract address configured for network '{0}'")]
	MissingContract(String),
	#[error("Watcher task failed: {0}")]
	Task(String),
}

/// A source of relay events with a start/stop lifecycle.
#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
	/// Network this source watches.
	fn network(&self) -> &str;

	/// Spawns the polling task. Events are sent through `sender` until
	/// [`stop_monitoring`](Self::stop_monitoring) is called or the receiver is
	/// dropped.
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<RelayEvent>,
	) -> Result<(), DiscoveryError>;

	/// Stops the polling task and waits for it to finish. A no-op if the
	/// source is not monitoring.
	async fn stop_monitoring(&self) -> Result<(), DiscoveryError>;
}

/// Runs several watchers together.
pub struct DiscoveryService {
	implementations: Vec<Box<dyn DiscoveryInterface>>,
}

impl DiscoveryService {
	pub fn new(implementations: Vec<Box<dyn DiscoveryInterface>>) -> Self {
		Self { implementations }
	}

	pub fn networks(&self) -> Vec<&str> {
		self.implementations.iter().map(|i| i.network()).collect()
	}

	/// Starts every watcher. If one fails to start, those already started
	/// are stopped again.
	pub async fn start_all(
		&self,
		sender: mpsc::UnboundedSender<RelayEvent>,
	) -> Result<(), DiscoveryError> {
		for (started, implementation) in self.implementations.iter().enumerate() {
			if let Err(e) = implementation.start_monitoring(sender.clone()).await {
				for running in &self.implementations[..started] {
					let _ = running.stop_monitoring().await;
				}
				return Err(e);
			}
		}
		Ok(())
	}

	/// Stops every watcher, returning the first error after trying all.
	pub async fn stop_all(&self) -> Result<(), DiscoveryError> {
		let mut first_error = None;
		for implementation in &self.implementations {
			if let Err(e) = implementation.stop_monitoring().await {
				tracing::warn!(network = implementation.network(), error = %e, "Failed to stop watcher");
				first_error.get_or_insert(e);
			}
		}
		first_error.map_or(Ok(()), Err)
	}
}
