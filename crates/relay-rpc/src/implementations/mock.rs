//! Scripted in-process chain client for tests.
//!
//! Each method answers from its own script. Scripted responses are consumed
//! in order and the last one repeats, so a script of `[Pending, Pending,
//! Mined]` answers "mined" forever once the first two are used up. Methods
//! with no script fall back to a neutral answer (nonce 0, unknown
//! transaction, no receipt, height 0).
//!
//! Logs are served from a log set filtered by address and block range,
//! which makes range bookkeeping in the watcher observable. Log query
//! failures are one-shot and take precedence over the log set.
//!
//! A stalled method never answers, like a node that accepted the connection
//! and went silent.

use crate::{ChainClientInterface, RpcError};
use alloy_primitives::{keccak256, Bytes};
use async_trait::async_trait;
use relay_types::{Address, LogEntry, PendingState, TransactionHash, TransactionReceipt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Methods of [`ChainClientInterface`], for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockMethod {
	PendingNonce,
	SendRawTransaction,
	TransactionByHash,
	TransactionReceipt,
	BlockNumber,
	FilterLogs,
	GasPrice,
}

struct Script<T: Clone> {
	queue: VecDeque<T>,
	default: T,
}

impl<T: Clone> Script<T> {
	fn new(default: T) -> Self {
		Self {
			queue: VecDeque::new(),
			default,
		}
	}

	fn next(&mut self) -> T {
		if self.queue.len() > 1 {
			if let Some(value) = self.queue.pop_front() {
				return value;
			}
		}
		self.queue.front().cloned().unwrap_or_else(|| self.default.clone())
	}
}

/// A log query as received: (address, from, to).
pub type LogQuery = (Address, u64, u64);

struct State {
	pending_nonce: Script<Result<u64, RpcError>>,
	send: Script<Result<(), RpcError>>,
	transaction_by_hash: Script<Result<Option<PendingState>, RpcError>>,
	receipt: Script<Result<Option<TransactionReceipt>, RpcError>>,
	block_number: Script<Result<u64, RpcError>>,
	gas_price: Script<Result<u128, RpcError>>,
	logs: Vec<LogEntry>,
	log_failures: VecDeque<RpcError>,
	calls: HashMap<MockMethod, usize>,
	sent: Vec<Bytes>,
	log_queries: Vec<LogQuery>,
	stalled: HashSet<MockMethod>,
}

/// Chain client answering from scripts.
pub struct MockChainClient {
	state: Mutex<State>,
}

impl Default for MockChainClient {
	fn default() -> Self {
		Self::new()
	}
}

impl MockChainClient {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State {
				pending_nonce: Script::new(Ok(0)),
				send: Script::new(Ok(())),
				transaction_by_hash: Script::new(Ok(None)),
				receipt: Script::new(Ok(None)),
				block_number: Script::new(Ok(0)),
				gas_price: Script::new(Ok(1)),
				logs: Vec::new(),
				log_failures: VecDeque::new(),
				calls: HashMap::new(),
				sent: Vec::new(),
				log_queries: Vec::new(),
				stalled: HashSet::new(),
			}),
		}
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn record(&self, method: MockMethod) -> MutexGuard<'_, State> {
		let mut state = self.state();
		*state.calls.entry(method).or_default() += 1;
		state
	}

	/// Counts a call to a stalled method and never returns.
	async fn hang_if_stalled(&self, method: MockMethod) {
		let stalled = {
			let mut state = self.state();
			let stalled = state.stalled.contains(&method);
			if stalled {
				*state.calls.entry(method).or_default() += 1;
			}
			stalled
		};
		if stalled {
			std::future::pending::<()>().await;
		}
	}

	/// Makes every later call to `method` hang.
	pub fn stall(&self, method: MockMethod) {
		self.state().stalled.insert(method);
	}

	pub fn script_pending_nonce(&self, responses: impl IntoIterator<Item = Result<u64, RpcError>>) {
		self.state().pending_nonce.queue.extend(responses);
	}

	/// Broadcast results. A successful broadcast returns the keccak hash of
	/// the raw bytes.
	pub fn script_send(&self, responses: impl IntoIterator<Item = Result<(), RpcError>>) {
		self.state().send.queue.extend(responses);
	}

	pub fn script_transaction_by_hash(
		&self,
		responses: impl IntoIterator<Item = Result<Option<PendingState>, RpcError>>,
	) {
		self.state().transaction_by_hash.queue.extend(responses);
	}

	pub fn script_receipt(
		&self,
		responses: impl IntoIterator<Item = Result<Option<TransactionReceipt>, RpcError>>,
	) {
		self.state().receipt.queue.extend(responses);
	}

	pub fn script_block_number(&self, responses: impl IntoIterator<Item = Result<u64, RpcError>>) {
		self.state().block_number.queue.extend(responses);
	}

	pub fn script_gas_price(&self, responses: impl IntoIterator<Item = Result<u128, RpcError>>) {
		self.state().gas_price.queue.extend(responses);
	}

	pub fn add_logs(&self, logs: impl IntoIterator<Item = LogEntry>) {
		self.state().logs.extend(logs);
	}

	/// Makes the next log query fail with `error`.
	pub fn fail_next_filter_logs(&self, error: RpcError) {
		self.state().log_failures.push_back(error);
	}

	pub fn calls(&self, method: MockMethod) -> usize {
		self.state().calls.get(&method).copied().unwrap_or(0)
	}

	/// Raw bytes of every accepted broadcast, in order.
	pub fn sent(&self) -> Vec<Bytes> {
		self.state().sent.clone()
	}

	pub fn log_queries(&self) -> Vec<LogQuery> {
		self.state().log_queries.clone()
	}
}

#[async_trait]
impl ChainClientInterface for MockChainClient {
	async fn pending_nonce(&self, _account: Address) -> Result<u64, RpcError> {
		self.hang_if_stalled(MockMethod::PendingNonce).await;
		self.record(MockMethod::PendingNonce).pending_nonce.next()
	}

	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TransactionHash, RpcError> {
		self.hang_if_stalled(MockMethod::SendRawTransaction).await;
		let mut state = self.record(MockMethod::SendRawTransaction);
		state.send.next()?;
		state.sent.push(Bytes::copy_from_slice(raw));
		Ok(TransactionHash(keccak256(raw)))
	}

	async fn transaction_by_hash(
		&self,
		_hash: TransactionHash,
	) -> Result<Option<PendingState>, RpcError> {
		self.hang_if_stalled(MockMethod::TransactionByHash).await;
		self.record(MockMethod::TransactionByHash)
			.transaction_by_hash
			.next()
	}

	async fn transaction_receipt(
		&self,
		_hash: TransactionHash,
	) -> Result<Option<TransactionReceipt>, RpcError> {
		self.hang_if_stalled(MockMethod::TransactionReceipt).await;
		self.record(MockMethod::TransactionReceipt).receipt.next()
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		self.hang_if_stalled(MockMethod::BlockNumber).await;
		self.record(MockMethod::BlockNumber).block_number.next()
	}

	async fn filter_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<LogEntry>, RpcError> {
		self.hang_if_stalled(MockMethod::FilterLogs).await;
		let mut state = self.record(MockMethod::FilterLogs);
		state.log_queries.push((address, from_block, to_block));
		if let Some(error) = state.log_failures.pop_front() {
			return Err(error);
		}
		Ok(state
			.logs
			.iter()
			.filter(|log| log.address == address)
			.filter(|log| {
				log.block_number
					.is_some_and(|n| n >= from_block && n <= to_block)
			})
			.cloned()
			.collect())
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.hang_if_stalled(MockMethod::GasPrice).await;
		self.record(MockMethod::GasPrice).gas_price.next()
	}
}
