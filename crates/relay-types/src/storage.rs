//! Storage namespaces used by the relay.

/// Namespaces under which data is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Watcher watermarks, keyed by chain id and contract address.
	Checkpoints,
	/// Contract deployment records, keyed by network name.
	Deployments,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Checkpoints => "checkpoints",
			StorageKey::Deployments => "deployments",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_names() {
		assert_eq!(StorageKey::Checkpoints.as_str(), "checkpoints");
		assert_eq!(StorageKey::Deployments.as_str(), "deployments");
	}
}
