//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable backend module provides a `Registry` struct implementing
/// this trait, tying the name used under `[storage.implementations.<name>]`
/// to the factory that builds it.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"memory"` or `"file"`.
	const NAME: &'static str;

	/// Factory function type this implementation provides.
	type Factory;

	/// Returns the factory function.
	fn factory() -> Self::Factory;
}
