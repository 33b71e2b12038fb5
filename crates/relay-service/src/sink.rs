//! Downstream consumer of relay events.
//!
//! Watchers deliver at least once, so the sink drops events it has already
//! seen. The set of seen ids is bounded; the oldest ids are forgotten first.

use relay_types::{truncate_id, EventId, RelayEvent};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;

pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Insertion-ordered set of event ids with a fixed capacity.
pub struct BoundedEventCache {
	ids: HashSet<EventId>,
	order: VecDeque<EventId>,
	max_size: usize,
}

impl BoundedEventCache {
	pub fn new(max_size: usize) -> Self {
		Self {
			ids: HashSet::new(),
			order: VecDeque::new(),
			max_size: max_size.max(1),
		}
	}

	/// Records `id`, evicting the oldest entry when full. Returns false if
	/// `id` was already present.
	pub fn insert(&mut self, id: EventId) -> bool {
		if self.ids.contains(&id) {
			return false;
		}
		while self.order.len() >= self.max_size {
			match self.order.pop_front() {
				Some(oldest) => {
					self.ids.remove(&oldest);
				},
				None => break,
			}
		}
		self.ids.insert(id);
		self.order.push_back(id);
		true
	}
}

/// Counters reported when the sink shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
	pub delivered: usize,
	pub duplicates: usize,
}

pub struct EventSink {
	seen: BoundedEventCache,
	stats: SinkStats,
}

impl EventSink {
	pub fn new(capacity: usize) -> Self {
		Self {
			seen: BoundedEventCache::new(capacity),
			stats: SinkStats::default(),
		}
	}

	/// Handles one event. Returns false for a repeat.
	pub fn accept(&mut self, event: &RelayEvent) -> bool {
		if !self.seen.insert(event.id()) {
			self.stats.duplicates += 1;
			tracing::debug!(
				chain_id = event.chain_id,
				tx_hash = %truncate_id(&event.transaction_hash.to_string()),
				log_index = event.log_index,
				"Dropping duplicate event"
			);
			return false;
		}

		self.stats.delivered += 1;
		let fields = serde_json::to_string(&event.kind).unwrap_or_default();
		tracing::info!(
			chain_id = event.chain_id,
			contract = %event.contract,
			block_number = event.block_number,
			tx_hash = %truncate_id(&event.transaction_hash.to_string()),
			log_index = event.log_index,
			event = event.kind.name(),
			%fields,
			"Relay event"
		);
		true
	}

	/// Consumes events until every sender is dropped.
	pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<RelayEvent>) -> SinkStats {
		while let Some(event) = receiver.recv().await {
			self.accept(&event);
		}
		self.stats
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_types::{Address, RelayEventKind, TransactionHash, B256, U256};

	fn event(tx: u8, log_index: u64) -> RelayEvent {
		RelayEvent {
			contract: Address::repeat_byte(0xb7),
			chain_id: 1337,
			block_number: 5,
			transaction_hash: TransactionHash(B256::repeat_byte(tx)),
			log_index,
			kind: RelayEventKind::Paid {
				recipient: Address::repeat_byte(0x01),
				value: U256::from(10),
			},
		}
	}

	#[test]
	fn test_cache_evicts_oldest() {
		let mut cache = BoundedEventCache::new(2);
		let (a, b, c) = (event(1, 0).id(), event(2, 0).id(), event(3, 0).id());

		assert!(cache.insert(a));
		assert!(cache.insert(b));
		assert!(!cache.insert(a));
		assert!(cache.insert(c));
		assert_eq!(cache.order.len(), 2);

		assert!(!cache.insert(c));
		// a was evicted to make room for c
		assert!(cache.insert(a));
	}

	#[test]
	fn test_sink_drops_repeats() {
		let mut sink = EventSink::new(DEFAULT_DEDUP_CAPACITY);

		assert!(sink.accept(&event(1, 0)));
		assert!(sink.accept(&event(1, 1)));
		assert!(!sink.accept(&event(1, 0)));

		assert_eq!(
			sink.stats,
			SinkStats {
				delivered: 2,
				duplicates: 1,
			}
		);
	}

	#[tokio::test]
	async fn test_run_until_senders_dropped() {
		let (tx, rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(EventSink::new(8).run(rx));

		tx.send(event(1, 0)).unwrap();
		tx.send(event(1, 0)).unwrap();
		tx.send(event(2, 0)).unwrap();
		drop(tx);

		let stats = task.await.unwrap();
		assert_eq!(stats.delivered, 2);
		assert_eq!(stats.duplicates, 1);
	}
}
