//! Cooperative cancellation token.
//!
//! Confirmation waits and watcher loops take a `CancelToken` so that callers
//! can abandon them without terminating the process.

use std::sync::Arc;
use tokio::sync::watch;

/// Clonable cancellation flag backed by a watch channel.
///
/// All clones observe the same flag. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
	state: Arc<watch::Sender<bool>>,
}

impl CancelToken {
	/// Creates a token that has not been cancelled.
	pub fn new() -> Self {
		let (state, _) = watch::channel(false);
		Self {
			state: Arc::new(state),
		}
	}

	/// Cancels the token, waking every task waiting in [`CancelToken::cancelled`].
	pub fn cancel(&self) {
		self.state.send_replace(true);
	}

	/// Returns true if the token has been cancelled.
	pub fn is_cancelled(&self) -> bool {
		*self.state.borrow()
	}

	/// Completes once the token is cancelled.
	pub async fn cancelled(&self) {
		let mut rx = self.state.subscribe();
		// The sender lives as long as `self`, so the wait cannot fail.
		let _ = rx.wait_for(|cancelled| *cancelled).await;
	}
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_clones_share_state() {
		let token = CancelToken::new();
		let clone = token.clone();
		assert!(!clone.is_cancelled());

		token.cancel();
		assert!(clone.is_cancelled());
	}

	#[tokio::test]
	async fn test_cancelled_wakes_waiter() {
		let token = CancelToken::new();
		let waiter = token.clone();
		let handle = tokio::spawn(async move { waiter.cancelled().await });

		tokio::time::sleep(Duration::from_millis(5)).await;
		token.cancel();

		tokio::time::timeout(Duration::from_secs(1), handle)
			.await
			.expect("waiter should wake")
			.unwrap();
	}

	#[tokio::test]
	async fn test_cancelled_returns_immediately_when_already_cancelled() {
		let token = CancelToken::new();
		token.cancel();
		tokio::time::timeout(Duration::from_millis(50), token.cancelled())
			.await
			.unwrap();
	}
}
