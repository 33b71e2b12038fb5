//! Confirmation policy types.
//!
//! Chain nodes differ in how long a transaction stays visible as pending
//! before its receipt is exposed, so the submitter supports two polling
//! strategies and bounds both with exponential backoff and a maximum wait.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the submitter decides a broadcast transaction is no longer pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStrategy {
	/// Poll the pending flag until it clears, then fetch the receipt once.
	/// Falls back to `ReceiptRetry` when the receipt is not yet available.
	#[default]
	PendingDrain,
	/// Poll for the receipt directly, ignoring the pending flag.
	ReceiptRetry,
}

/// Bounds and strategy for awaiting a transaction outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationPolicy {
	pub strategy: ConfirmationStrategy,
	/// Delay before the second poll.
	pub initial_interval: Duration,
	/// Upper bound for the delay between polls.
	pub max_interval: Duration,
	/// Growth factor applied to the delay after each poll.
	pub multiplier: f64,
	/// Total time allowed before reporting a confirmation timeout.
	pub max_wait: Duration,
	/// Consecutive "unknown transaction" answers while receipt-polling after
	/// which the transaction is reported as dropped.
	pub dropped_after: u32,
}

impl Default for ConfirmationPolicy {
	fn default() -> Self {
		Self {
			strategy: ConfirmationStrategy::PendingDrain,
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(10),
			multiplier: 2.0,
			max_wait: Duration::from_secs(600),
			dropped_after: 30,
		}
	}
}

impl ConfirmationPolicy {
	/// Returns the same policy with a different strategy.
	pub fn with_strategy(mut self, strategy: ConfirmationStrategy) -> Self {
		self.strategy = strategy;
		self
	}

	/// Returns the same policy with a different maximum wait.
	pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
		self.max_wait = max_wait;
		self
	}
}
