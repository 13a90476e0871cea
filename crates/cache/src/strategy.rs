//! Pluggable producer of fresh cache values

use crate::error::Result;

/// Produces a new value for a [`CredentialCache`](crate::CredentialCache).
///
/// The cache owns exactly one strategy and calls it only while holding its
/// guard, so an implementation never sees two concurrent `generate` calls from
/// the same cache. Implementations carry whatever configuration they need
/// (target host, credential provider, string builder) themselves.
///
/// Closures of the form `Fn() -> Result<String, GenerationError>` implement
/// this trait directly.
///
/// # Contract
///
/// - Return the new value, or a [`GenerationError`](crate::GenerationError)
///   naming the stage that failed.
/// - An empty string is treated by the cache as
///   [`GenerationError::Empty`](crate::GenerationError::Empty); strategies may
///   return that error themselves for clarity.
#[cfg_attr(test, mockall::automock)]
pub trait GenerationStrategy: Send + Sync {
    /// Produce a fresh value.
    fn generate(&self) -> Result<String>;
}

impl<F> GenerationStrategy for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn generate(&self) -> Result<String> {
        self()
    }
}
