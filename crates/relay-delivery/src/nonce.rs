//! Per-identity nonce coordination.
//!
//! Every (chain id, account) pair has its own async lock. A submission holds
//! the lock from nonce resolution until the broadcast has been answered, so
//! concurrent submissions from one account are serialized and each gets a
//! distinct, strictly increasing nonce. Different accounts never contend.

use relay_types::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct NonceSlot {
	/// Nonce after the last successful broadcast, if any since the last
	/// invalidation.
	next: Option<u64>,
}

impl NonceSlot {
	/// Picks the nonce for the next transaction: the node's pending count,
	/// or the local counter when the node lags behind our own broadcasts.
	pub(crate) fn resolve(&self, pending: u64) -> u64 {
		self.next.map_or(pending, |next| next.max(pending))
	}

	/// Records that `nonce` was consumed by an accepted broadcast.
	pub(crate) fn commit(&mut self, nonce: u64) {
		self.next = Some(nonce.saturating_add(1));
	}

	fn invalidate(&mut self) {
		self.next = None;
	}
}

type SlotKey = (u64, Address);

#[derive(Default)]
pub(crate) struct NonceManager {
	slots: Mutex<HashMap<SlotKey, Arc<AsyncMutex<NonceSlot>>>>,
}

impl NonceManager {
	fn slot(&self, chain_id: u64, account: Address) -> Arc<AsyncMutex<NonceSlot>> {
		let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
		slots.entry((chain_id, account)).or_default().clone()
	}

	/// Acquires the lock for `account` on `chain_id`.
	pub(crate) async fn lock(&self, chain_id: u64, account: Address) -> OwnedMutexGuard<NonceSlot> {
		self.slot(chain_id, account).lock_owned().await
	}

	/// Forgets the local counter so the next submission trusts the node's
	/// pending count again. Used once a transaction is known to be dropped.
	pub(crate) async fn invalidate(&self, chain_id: u64, account: Address) {
		self.lock(chain_id, account).await.invalidate();
	}
}
