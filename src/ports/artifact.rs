//! Artifact port: Trait for retrieving model artifact bytes.
//!
//! Abstracts where a model comes from (local file, HTTP download) from the
//! code that parses and caches it.

use crate::adapters::ArtifactError;

/// Trait for model artifact sources.
pub trait ArtifactSource: Send + Sync {
    /// Stable identity of the artifact (path or URL), used as cache key.
    fn key(&self) -> String;

    /// Fetch the raw artifact bytes.
    ///
    /// Implementations apply their own timeout and retry policy; an error
    /// here means retries are exhausted.
    ///
    /// # Errors
    /// Returns `ArtifactError` if the artifact cannot be retrieved.
    fn fetch(&self) -> Result<Vec<u8>, ArtifactError>;

    /// Remove any copy of the artifact kept outside the in-memory cache.
    fn discard(&self) {}
}
