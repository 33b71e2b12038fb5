//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable crate (account, storage, rpc) exposes a `Registry` type per
/// implementation that names it and hands out its factory function. The
/// name is the key used under `implementations` in the TOML configuration,
/// for example `storage.implementations.file` or `account.primary = "local"`.
pub trait ImplementationRegistry {
	/// Configuration name of the implementation.
	const NAME: &'static str;

	/// Factory function type, defined per crate.
	type Factory;

	/// Returns the factory function.
	fn factory() -> Self::Factory;
}
