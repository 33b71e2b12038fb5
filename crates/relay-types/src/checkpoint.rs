//! Watermark checkpoint for the event watcher.

use serde::{Deserialize, Serialize};

/// Last block height fully scanned by a watcher.
///
/// The height never decreases: [`Checkpoint::advance`] ignores lower values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
	height: u64,
}

impl Checkpoint {
	pub fn new(height: u64) -> Self {
		Self { height }
	}

	/// Checkpoint such that the next scan starts at `start_block`.
	///
	/// Block 0 cannot be expressed as "scanned up to -1"; a start block of 0
	/// yields a first scan from block 1. Genesis carries no contract logs.
	pub fn before_block(start_block: u64) -> Self {
		Self::new(start_block.saturating_sub(1))
	}

	pub fn height(&self) -> u64 {
		self.height
	}

	/// First block not yet scanned.
	pub fn next_block(&self) -> u64 {
		self.height.saturating_add(1)
	}

	/// Moves the watermark forward. Returns true if it moved.
	pub fn advance(&mut self, height: u64) -> bool {
		if height > self.height {
			self.height = height;
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_advance_is_monotonic() {
		let mut checkpoint = Checkpoint::new(100);
		assert!(!checkpoint.advance(99));
		assert_eq!(checkpoint.height(), 100);
		assert!(!checkpoint.advance(100));
		assert!(checkpoint.advance(120));
		assert_eq!(checkpoint.height(), 120);
		assert_eq!(checkpoint.next_block(), 121);
	}

	#[test]
	fn test_before_block() {
		assert_eq!(Checkpoint::before_block(11).height(), 10);
		assert_eq!(Checkpoint::before_block(0).height(), 0);
	}
}
