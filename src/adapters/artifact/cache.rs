//! Explicit cache of loaded model artifacts.
//!
//! Backed by `moka::sync::Cache`, keyed by artifact identity
//! (`ArtifactSource::key`). Concurrent loads of one key are coalesced into a
//! single fetch; different keys load independently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::{sha256_hex, ArtifactError};
use crate::ports::ArtifactSource;

/// When a cached entry is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Keep entries until explicitly invalidated.
    Never,
    /// Reload entries older than the given age.
    MaxAge(Duration),
}

struct CachedEntry<M> {
    value: Arc<M>,
    content_sha256: Arc<str>,
}

impl<M> Clone for CachedEntry<M> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            content_sha256: Arc::clone(&self.content_sha256),
        }
    }
}

/// Cache of parsed artifacts of type `M`.
pub struct ArtifactCache<M> {
    entries: Cache<String, CachedEntry<M>>,
    fetches: AtomicUsize,
}

impl<M: Send + Sync + 'static> ArtifactCache<M> {
    #[must_use]
    pub fn new(refresh: RefreshPolicy) -> Self {
        let builder = Cache::<String, CachedEntry<M>>::builder();
        let entries = match refresh {
            RefreshPolicy::Never => builder.build(),
            RefreshPolicy::MaxAge(max_age) => builder.time_to_live(max_age).build(),
        };

        Self {
            entries,
            fetches: AtomicUsize::new(0),
        }
    }

    fn load<F>(&self, key: &str, source: &dyn ArtifactSource, parse: F) -> Result<CachedEntry<M>, ArtifactError>
    where
        F: FnOnce(&[u8]) -> Result<M, ArtifactError>,
    {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = source.fetch()?;
        let content_sha256 = sha256_hex(&bytes);
        let value = Arc::new(parse(&bytes)?);

        tracing::info!(
            "Loaded model artifact {} (sha256={})",
            key,
            &content_sha256[..12]
        );

        Ok(CachedEntry {
            value,
            content_sha256: content_sha256.into(),
        })
    }

    /// Return the cached artifact for `source`, fetching and parsing it if
    /// absent or stale.
    ///
    /// A failed fetch or parse leaves no entry behind; the next call retries.
    ///
    /// # Errors
    /// Returns the fetch or parse error.
    pub fn get_or_load<F>(&self, source: &dyn ArtifactSource, parse: F) -> Result<Arc<M>, ArtifactError>
    where
        F: FnOnce(&[u8]) -> Result<M, ArtifactError>,
    {
        let key = source.key();
        let entry = self
            .entries
            .try_get_with(key.clone(), || self.load(&key, source, parse))
            // Callers that joined an in-flight load share its error.
            .map_err(|shared| Arc::try_unwrap(shared).unwrap_or_else(|e| (*e).clone()))?;
        Ok(entry.value)
    }

    /// Content hash of the cached entry for `key`, if loaded.
    #[must_use]
    pub fn content_sha256(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.content_sha256.to_string())
    }

    /// Drop the cached entry for `source`, including any copy the source
    /// keeps outside this cache.
    ///
    /// A load of the same key that is already running is not restarted.
    pub fn invalidate(&self, source: &dyn ArtifactSource) {
        source.discard();
        self.entries.invalidate(&source.key());
        tracing::info!("Invalidated cached model {}", source.key());
    }

    /// Number of fetches performed so far (cache misses).
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<M: Send + Sync + 'static> Default for ArtifactCache<M> {
    fn default() -> Self {
        Self::new(RefreshPolicy::Never)
    }
}
