//! Polling watcher for the bridge contract on one EVM chain.
//!
//! Every tick reads the chain height, fetches the contract's logs from the
//! block after the checkpoint up to that height, decodes them, advances the
//! checkpoint and finally emits the decoded events. A tick that cannot read
//! the stored checkpoint, the height or the logs changes nothing, so the
//! next tick asks for the same range again. Logs that fail to decode are
//! reported and skipped.

use crate::checkpoint::CheckpointStore;
use crate::decode::decode_log;
use crate::{DiscoveryError, DiscoveryInterface};
use async_trait::async_trait;
use relay_rpc::ChainClientInterface;
use relay_types::{Address, ChainEndpoint, Checkpoint, RelayEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Default time between ticks.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
	/// Scanned `from..=to` and moved the checkpoint to `to`.
	Advanced {
		from: u64,
		to: u64,
		events: usize,
		decode_errors: usize,
	},
	/// The chain has not grown past the checkpoint.
	NoNewBlocks { height: u64 },
	/// The node reported a height below the checkpoint. Nothing is fetched
	/// and the checkpoint stays where it is.
	HeightRegression { height: u64, checkpoint: u64 },
	/// A request failed; the checkpoint is unchanged.
	Abandoned { reason: String },
}

/// State shared between the watcher handle and its polling task.
struct WatcherCore {
	network: String,
	chain_id: u64,
	contract: Address,
	start_block: Option<u64>,
	client: Arc<dyn ChainClientInterface>,
	checkpoints: Option<CheckpointStore>,
	/// `None` until the first tick resolves a starting point. Held for the
	/// whole tick, so ticks never overlap.
	checkpoint: Mutex<Option<Checkpoint>>,
}

impl WatcherCore {
	/// Stored checkpoint, else the block before `start_block`, else the
	/// current height (only new logs are watched).
	///
	/// A failed read is an error, not an absent checkpoint: falling back
	/// would skip every block between the stored position and the fallback.
	async fn initial_checkpoint(&self) -> Result<Checkpoint, String> {
		if let Some(store) = &self.checkpoints {
			match store.load(self.chain_id, self.contract).await {
				Ok(Some(checkpoint)) => return Ok(checkpoint),
				Ok(None) => {},
				Err(e) => return Err(format!("Failed to load checkpoint: {}", e)),
			}
		}

		if let Some(start_block) = self.start_block {
			return Ok(Checkpoint::before_block(start_block));
		}

		self.client
			.block_number()
			.await
			.map(Checkpoint::new)
			.map_err(|e| format!("Failed to get initial block number: {}", e))
	}

	async fn tick(&self, sender: &mpsc::UnboundedSender<RelayEvent>) -> TickOutcome {
		let mut guard = self.checkpoint.lock().await;
		let mut checkpoint = match *guard {
			Some(checkpoint) => checkpoint,
			None => match self.initial_checkpoint().await {
				Ok(checkpoint) => {
					tracing::info!(
						network = %self.network,
						contract = %self.contract,
						from_block = checkpoint.next_block(),
						"Watcher starting"
					);
					*guard = Some(checkpoint);
					checkpoint
				},
				Err(reason) => {
					tracing::warn!(network = %self.network, %reason, "Tick abandoned");
					return TickOutcome::Abandoned { reason };
				},
			},
		};

		let height = match self.client.block_number().await {
			Ok(height) => height,
			Err(e) => {
				tracing::warn!(network = %self.network, error = %e, "Failed to get block number");
				return TickOutcome::Abandoned {
					reason: e.to_string(),
				};
			},
		};

		if height < checkpoint.height() {
			tracing::warn!(
				network = %self.network,
				height,
				checkpoint = checkpoint.height(),
				"Node reported a height below the checkpoint"
			);
			return TickOutcome::HeightRegression {
				height,
				checkpoint: checkpoint.height(),
			};
		}
		if height == checkpoint.height() {
			return TickOutcome::NoNewBlocks { height };
		}

		let (from, to) = (checkpoint.next_block(), height);
		let logs = match self.client.filter_logs(self.contract, from, to).await {
			Ok(logs) => logs,
			Err(e) => {
				tracing::warn!(
					network = %self.network,
					from_block = from,
					to_block = to,
					error = %e,
					"Failed to get logs"
				);
				return TickOutcome::Abandoned {
					reason: e.to_string(),
				};
			},
		};

		let mut events = Vec::with_capacity(logs.len());
		let mut decode_errors = 0;
		for log in &logs {
			match decode_log(log, self.chain_id) {
				Ok(event) => events.push(event),
				Err(e) => {
					decode_errors += 1;
					tracing::warn!(
						network = %self.network,
						block_number = ?log.block_number,
						log_index = ?log.log_index,
						error = %e,
						"Skipping undecodable log"
					);
				},
			}
		}

		checkpoint.advance(to);
		*guard = Some(checkpoint);

		// Emit before the save await: a tick cancelled mid-save must not lose
		// events it already committed to in memory.
		let emitted = events.len();
		for event in events {
			if sender.send(event).is_err() {
				tracing::debug!(network = %self.network, "Event receiver dropped");
				break;
			}
		}

		if let Some(store) = &self.checkpoints {
			if let Err(e) = store.save(self.chain_id, self.contract, &checkpoint).await {
				tracing::warn!(network = %self.network, error = %e, "Failed to persist checkpoint");
			}
		}

		tracing::debug!(
			network = %self.network,
			from_block = from,
			to_block = to,
			events = emitted,
			decode_errors,
			"Scanned blocks"
		);

		TickOutcome::Advanced {
			from,
			to,
			events: emitted,
			decode_errors,
		}
	}
}

/// Watches the bridge contract of one [`ChainEndpoint`].
pub struct BridgeEventWatcher {
	core: Arc<WatcherCore>,
	polling_interval: Duration,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Mutex<Option<mpsc::Sender<()>>>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeEventWatcher {
	/// Creates a watcher for `endpoint`, which must have a contract address.
	///
	/// Without a checkpoint store the watermark lives in memory only.
	pub fn new(
		endpoint: &ChainEndpoint,
		client: Arc<dyn ChainClientInterface>,
		checkpoints: Option<CheckpointStore>,
		polling_interval: Duration,
	) -> Result<Self, DiscoveryError> {
		let contract = endpoint
			.contract_address()
			.ok_or_else(|| DiscoveryError::MissingContract(endpoint.name.clone()))?;

		Ok(Self {
			core: Arc::new(WatcherCore {
				network: endpoint.name.clone(),
				chain_id: endpoint.chain_id,
				contract,
				start_block: endpoint.start_block,
				client,
				checkpoints,
				checkpoint: Mutex::new(None),
			}),
			polling_interval,
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Mutex::new(None),
			task: Mutex::new(None),
		})
	}

	/// Runs one tick immediately. Serialized with the polling task's ticks.
	pub async fn tick(&self, sender: &mpsc::UnboundedSender<RelayEvent>) -> TickOutcome {
		self.core.tick(sender).await
	}

	/// Current watermark, once the first tick has resolved one.
	pub async fn checkpoint(&self) -> Option<Checkpoint> {
		*self.core.checkpoint.lock().await
	}

	pub fn is_monitoring(&self) -> bool {
		self.is_monitoring.load(Ordering::SeqCst)
	}

	async fn monitoring_loop(
		core: Arc<WatcherCore>,
		sender: mpsc::UnboundedSender<RelayEvent>,
		mut stop_rx: mpsc::Receiver<()>,
		polling_interval: Duration,
	) {
		let mut interval = tokio::time::interval(polling_interval);
		// Skip missed ticks instead of bursting after a slow node
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		// The stop signal is raced against the whole tick, so a hung RPC call
		// cannot keep the watcher alive after stop_monitoring.
		loop {
			let keep_going = tokio::select! {
				biased;
				_ = stop_rx.recv() => false,
				keep_going = async {
					interval.tick().await;
					if sender.is_closed() {
						tracing::info!(network = %core.network, "Event receiver closed, watcher exiting");
						return false;
					}
					core.tick(&sender).await;
					true
				} => keep_going,
			};
			if !keep_going {
				break;
			}
		}
	}
}

#[async_trait]
impl DiscoveryInterface for BridgeEventWatcher {
	fn network(&self) -> &str {
		&self.core.network
	}

	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<RelayEvent>,
	) -> Result<(), DiscoveryError> {
		if self.is_monitoring.swap(true, Ordering::SeqCst) {
			return Err(DiscoveryError::AlreadyMonitoring);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let handle = tokio::spawn(Self::monitoring_loop(
			self.core.clone(),
			sender,
			stop_rx,
			self.polling_interval,
		));
		*self.task.lock().await = Some(handle);

		tracing::info!(
			network = %self.core.network,
			chain_id = self.core.chain_id,
			interval_ms = self.polling_interval.as_millis() as u64,
			"Started watching"
		);
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		if !self.is_monitoring.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}
		let task = self.task.lock().await.take();
		self.is_monitoring.store(false, Ordering::SeqCst);

		if let Some(handle) = task {
			handle
				.await
				.map_err(|e| DiscoveryError::Task(e.to_string()))?;
		}
		tracing::info!(network = %self.core.network, "Stopped watching");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decode::{encode_log, Deposit, Paid};
	use relay_rpc::implementations::mock::{MockChainClient, MockMethod};
	use relay_rpc::RpcError;
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_storage::{StorageError, StorageInterface, StorageService};
	use relay_types::{ConfigSchema, NetworkConfig, SecretString, B256, U256};
	use std::sync::atomic::AtomicUsize;

	/// Memory backend whose first `failing_reads` reads fail.
	struct FlakyStorage {
		inner: MemoryStorage,
		failing_reads: AtomicUsize,
	}

	#[async_trait]
	impl StorageInterface for FlakyStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			if self
				.failing_reads
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
			{
				return Err(StorageError::Backend("EIO".to_string()));
			}
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	fn contract() -> Address {
		Address::repeat_byte(0xb7)
	}

	fn endpoint(start_block: Option<u64>) -> ChainEndpoint {
		ChainEndpoint::from_config(
			"home",
			&NetworkConfig {
				rpc_url: "http://127.0.0.1:8545".to_string(),
				chain_id: 1337,
				gas_price: 1,
				from: Address::ZERO,
				passphrase: SecretString::default(),
				contract_address: Some(contract()),
				start_block,
			},
		)
	}

	fn deposit(block: u64, index: u64) -> relay_types::LogEntry {
		encode_log(
			&Deposit {
				recipient: Address::repeat_byte(0x01),
				value: U256::from(block),
				toChain: U256::from(2),
			},
			contract(),
			block,
			index,
		)
	}

	fn memory_store() -> CheckpointStore {
		CheckpointStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn watcher(mock: &Arc<MockChainClient>, start_block: Option<u64>) -> BridgeEventWatcher {
		BridgeEventWatcher::new(
			&endpoint(start_block),
			mock.clone(),
			Some(memory_store()),
			DEFAULT_POLLING_INTERVAL,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_mixed_logs_scenario() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(15)]);
		let mut malformed = encode_log(
			&Paid {
				recipient: Address::repeat_byte(0x02),
				value: U256::from(1),
			},
			contract(),
			13,
			0,
		);
		malformed.topics[0] = B256::repeat_byte(0xee);
		mock.add_logs([deposit(11, 0), malformed, deposit(15, 3)]);
		let watcher = watcher(&mock, Some(11));
		let (tx, mut rx) = mpsc::unbounded_channel();

		let outcome = watcher.tick(&tx).await;

		assert_eq!(
			outcome,
			TickOutcome::Advanced {
				from: 11,
				to: 15,
				events: 2,
				decode_errors: 1,
			}
		);
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::new(15)));
		assert_eq!(rx.recv().await.unwrap().block_number, 11);
		assert_eq!(rx.recv().await.unwrap().block_number, 15);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_height_not_above_checkpoint() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(100), Ok(99)]);
		let watcher = watcher(&mock, Some(101));
		let (tx, _rx) = mpsc::unbounded_channel();

		assert_eq!(
			watcher.tick(&tx).await,
			TickOutcome::NoNewBlocks { height: 100 }
		);
		assert_eq!(
			watcher.tick(&tx).await,
			TickOutcome::HeightRegression {
				height: 99,
				checkpoint: 100,
			}
		);
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::new(100)));
		assert_eq!(mock.calls(MockMethod::FilterLogs), 0);
	}

	#[tokio::test]
	async fn test_unreachable_logs_retry_same_range() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(20)]);
		mock.add_logs([deposit(12, 0)]);
		mock.fail_next_filter_logs(RpcError::Transport("connection refused".into()));
		let watcher = watcher(&mock, Some(11));
		let (tx, mut rx) = mpsc::unbounded_channel();

		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Abandoned { .. }
		));
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::new(10)));
		assert!(rx.try_recv().is_err());

		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Advanced { events: 1, .. }
		));
		assert_eq!(
			mock.log_queries(),
			vec![(contract(), 11, 20), (contract(), 11, 20)]
		);
	}

	#[tokio::test]
	async fn test_height_failure_keeps_checkpoint() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Err(RpcError::Transport("timeout".into())), Ok(12)]);
		let watcher = watcher(&mock, Some(5));
		let (tx, _rx) = mpsc::unbounded_channel();

		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Abandoned { .. }
		));
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::new(4)));
		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Advanced { from: 5, to: 12, .. }
		));
	}

	#[tokio::test]
	async fn test_checkpoint_persists_across_watchers() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(30)]);
		let store = memory_store();
		let (tx, _rx) = mpsc::unbounded_channel();

		let first = BridgeEventWatcher::new(
			&endpoint(Some(1)),
			mock.clone(),
			Some(store.clone()),
			DEFAULT_POLLING_INTERVAL,
		)
		.unwrap();
		first.tick(&tx).await;

		let second = BridgeEventWatcher::new(
			&endpoint(Some(1)),
			mock.clone(),
			Some(store),
			DEFAULT_POLLING_INTERVAL,
		)
		.unwrap();
		assert_eq!(
			second.tick(&tx).await,
			TickOutcome::NoNewBlocks { height: 30 }
		);
	}

	#[tokio::test]
	async fn test_checkpoint_read_failure_retries_load() {
		let storage = Arc::new(StorageService::new(Box::new(FlakyStorage {
			inner: MemoryStorage::new(),
			failing_reads: AtomicUsize::new(1),
		})));
		let store = CheckpointStore::new(storage);
		store
			.save(1337, contract(), &Checkpoint::new(100))
			.await
			.unwrap();

		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(500)]);
		let watcher = BridgeEventWatcher::new(
			&endpoint(None),
			mock.clone(),
			Some(store),
			DEFAULT_POLLING_INTERVAL,
		)
		.unwrap();
		let (tx, _rx) = mpsc::unbounded_channel();

		// An unreadable store must not be mistaken for an empty one
		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Abandoned { .. }
		));
		assert_eq!(watcher.checkpoint().await, None);
		assert_eq!(mock.calls(MockMethod::FilterLogs), 0);

		assert_eq!(
			watcher.tick(&tx).await,
			TickOutcome::Advanced {
				from: 101,
				to: 500,
				events: 0,
				decode_errors: 0,
			}
		);
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::new(500)));
	}

	#[tokio::test]
	async fn test_without_start_block_watches_new_logs_only() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(50), Ok(50), Ok(52)]);
		let watcher = BridgeEventWatcher::new(
			&endpoint(None),
			mock.clone(),
			None,
			DEFAULT_POLLING_INTERVAL,
		)
		.unwrap();
		let (tx, _rx) = mpsc::unbounded_channel();

		assert_eq!(
			watcher.tick(&tx).await,
			TickOutcome::NoNewBlocks { height: 50 }
		);
		assert!(matches!(
			watcher.tick(&tx).await,
			TickOutcome::Advanced { from: 51, to: 52, .. }
		));
	}

	#[test]
	fn test_requires_contract_address() {
		let config = ChainEndpoint::from_config(
			"foreign",
			&NetworkConfig {
				rpc_url: "http://127.0.0.1:8546".to_string(),
				chain_id: 2,
				gas_price: 1,
				from: Address::ZERO,
				passphrase: SecretString::default(),
				contract_address: None,
				start_block: None,
			},
		);
		let result = BridgeEventWatcher::new(
			&config,
			Arc::new(MockChainClient::new()),
			None,
			DEFAULT_POLLING_INTERVAL,
		);
		assert!(matches!(result, Err(DiscoveryError::MissingContract(name)) if name == "foreign"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_monitoring_lifecycle() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(10), Ok(11), Ok(12)]);
		mock.add_logs([deposit(11, 0), deposit(12, 0)]);
		let watcher = watcher(&mock, Some(10));
		let (tx, mut rx) = mpsc::unbounded_channel();

		watcher.start_monitoring(tx.clone()).await.unwrap();
		assert!(matches!(
			watcher.start_monitoring(tx).await,
			Err(DiscoveryError::AlreadyMonitoring)
		));

		assert_eq!(rx.recv().await.unwrap().block_number, 11);
		assert_eq!(rx.recv().await.unwrap().block_number, 12);

		watcher.stop_monitoring().await.unwrap();
		assert!(!watcher.is_monitoring());
		let calls = mock.calls(MockMethod::BlockNumber);
		tokio::time::sleep(Duration::from_secs(5)).await;
		assert_eq!(mock.calls(MockMethod::BlockNumber), calls);
	}

	#[tokio::test(start_paused = true)]
	async fn test_stop_interrupts_hung_tick() {
		let mock = Arc::new(MockChainClient::new());
		mock.script_block_number([Ok(20)]);
		mock.stall(MockMethod::FilterLogs);
		let watcher = watcher(&mock, Some(11));
		let (tx, _rx) = mpsc::unbounded_channel();

		watcher.start_monitoring(tx).await.unwrap();
		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(mock.calls(MockMethod::FilterLogs), 1);

		tokio::time::timeout(Duration::from_secs(60), watcher.stop_monitoring())
			.await
			.expect("stop_monitoring blocked on a hung tick")
			.unwrap();
		assert!(!watcher.is_monitoring());
		// The cancelled tick released the checkpoint without moving it
		assert_eq!(watcher.checkpoint().await, Some(Checkpoint::before_block(11)));
	}
}
