//! Polling a broadcast transaction until it has an outcome.
//!
//! The waiter runs one of two phases. `DrainingPending` asks the node
//! whether the transaction is still pending and fetches the receipt once it
//! is mined. `RetryingReceipt` asks for the receipt directly. A pending-drain
//! wait drops into `RetryingReceipt` when the node reports the transaction
//! mined but has no receipt yet, or stops knowing the hash.
//!
//! Delays between polls grow exponentially up to the policy's maximum
//! interval. The waiter itself never gives up on a slow transaction; the
//! caller bounds it with the policy's maximum wait and a cancel token.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use relay_rpc::ChainClientInterface;
use relay_types::{
	truncate_id, ConfirmationPolicy, ConfirmationStrategy, PendingState, TransactionHash,
	TransactionOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	DrainingPending,
	RetryingReceipt,
}

pub(crate) struct ConfirmationWaiter<'a> {
	client: &'a dyn ChainClientInterface,
	hash: TransactionHash,
	policy: &'a ConfirmationPolicy,
	backoff: ExponentialBackoff,
	phase: Phase,
	/// Consecutive receipt polls where the node did not know the hash.
	unknown_polls: u32,
}

impl<'a> ConfirmationWaiter<'a> {
	pub(crate) fn new(
		client: &'a dyn ChainClientInterface,
		hash: TransactionHash,
		policy: &'a ConfirmationPolicy,
	) -> Self {
		let backoff = ExponentialBackoffBuilder::new()
			.with_initial_interval(policy.initial_interval)
			.with_max_interval(policy.max_interval)
			.with_multiplier(policy.multiplier)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build();
		let phase = match policy.strategy {
			ConfirmationStrategy::PendingDrain => Phase::DrainingPending,
			ConfirmationStrategy::ReceiptRetry => Phase::RetryingReceipt,
		};

		Self {
			client,
			hash,
			policy,
			backoff,
			phase,
			unknown_polls: 0,
		}
	}

	/// Polls until the transaction is confirmed or known to be dropped.
	/// Never returns [`TransactionOutcome::Pending`].
	pub(crate) async fn run(mut self) -> TransactionOutcome {
		loop {
			let polled = match self.phase {
				Phase::DrainingPending => self.drain_pending().await,
				Phase::RetryingReceipt => self.retry_receipt().await,
			};
			if let Some(outcome) = polled {
				return outcome;
			}

			let delay = self
				.backoff
				.next_backoff()
				.unwrap_or(self.policy.max_interval);
			tokio::time::sleep(delay).await;
		}
	}

	fn fall_back_to_receipts(&mut self, reason: &str) {
		tracing::debug!(
			tx_hash = %truncate_id(&self.hash.to_string()),
			reason,
			"Falling back to receipt polling"
		);
		self.phase = Phase::RetryingReceipt;
	}

	async fn drain_pending(&mut self) -> Option<TransactionOutcome> {
		match self.client.transaction_by_hash(self.hash).await {
			Ok(Some(PendingState::Pending)) => {
				tracing::debug!(
					tx_hash = %truncate_id(&self.hash.to_string()),
					"Transaction still pending"
				);
				None
			},
			Ok(Some(PendingState::Mined)) => match self.client.transaction_receipt(self.hash).await {
				Ok(Some(receipt)) => Some(TransactionOutcome::from_receipt(receipt)),
				Ok(None) => {
					self.fall_back_to_receipts("mined but receipt unavailable");
					None
				},
				Err(e) => {
					tracing::warn!(error = %e, "Failed to fetch receipt");
					self.fall_back_to_receipts("receipt lookup failed");
					None
				},
			},
			Ok(None) => {
				self.unknown_polls = 1;
				self.fall_back_to_receipts("transaction unknown to node");
				self.dropped()
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to query pending state");
				None
			},
		}
	}

	async fn retry_receipt(&mut self) -> Option<TransactionOutcome> {
		match self.client.transaction_receipt(self.hash).await {
			Ok(Some(receipt)) => return Some(TransactionOutcome::from_receipt(receipt)),
			Ok(None) => {
				tracing::debug!(
					tx_hash = %truncate_id(&self.hash.to_string()),
					"Receipt unavailable, retrying"
				);
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to fetch receipt, retrying");
				return None;
			},
		}

		match self.client.transaction_by_hash(self.hash).await {
			Ok(Some(_)) => self.unknown_polls = 0,
			Ok(None) => {
				self.unknown_polls = self.unknown_polls.saturating_add(1);
				return self.dropped();
			},
			Err(e) => tracing::debug!(error = %e, "Failed to query transaction"),
		}
		None
	}

	fn dropped(&self) -> Option<TransactionOutcome> {
		(self.unknown_polls >= self.policy.dropped_after).then(|| TransactionOutcome::Failed {
			reason: format!(
				"transaction dropped: unknown to the node for {} consecutive polls",
				self.unknown_polls
			),
		})
	}
}
