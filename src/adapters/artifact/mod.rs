//! Artifact adapters: Model artifact retrieval from disk or HTTP.
//!
//! # Retrieval
//!
//! - `LocalArtifact` reads a file with a hard timeout, retrying transient
//!   I/O errors.
//! - `HttpArtifact` downloads into a cache file and reads that file on later
//!   fetches while it is younger than the max age and matches the pinned
//!   checksum. Each request has a hard timeout; connection errors, timeouts,
//!   `429` and `5xx` responses are retried with backoff.
//!
//! Loaded models are memoized by `ArtifactCache` (see `cache`).

mod cache;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::retry::{is_transient_io, retry_with_backoff, RetryPolicy};
use crate::ports::ArtifactSource;

pub use cache::{ArtifactCache, RefreshPolicy};

/// Default timeout for a single file read or HTTP request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for artifact retrieval and parsing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Failed to read artifact {path}: {message}")]
    Io { path: String, message: String },

    #[error("Download failed for {url}: {message}")]
    Http { url: String, message: String },

    #[error("Gave up on {key} after {attempts} attempts: {last}")]
    Exhausted {
        key: String,
        attempts: u32,
        last: String,
    },

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid model artifact: {0}")]
    InvalidFormat(String),

    #[error("Artifact cache error: {0}")]
    Cache(String),
}

/// Hex-encoded SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare `bytes` against an expected SHA-256 (case-insensitive hex).
///
/// # Errors
/// Returns `ArtifactError::ChecksumMismatch` on mismatch.
pub fn verify_sha256(key: &str, bytes: &[u8], expected: &str) -> Result<(), ArtifactError> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ArtifactError::ChecksumMismatch {
            key: key.to_string(),
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

/// Read a whole file on a helper thread, giving up after `timeout`.
///
/// A read stuck on a stalled mount is abandoned, not cancelled; its thread
/// finishes or blocks on its own.
///
/// # Errors
/// Returns the read error, or `ErrorKind::TimedOut` when the deadline passes.
pub fn read_bounded(path: &Path, timeout: Duration) -> io::Result<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    std::thread::Builder::new()
        .name("chronicare-read".into())
        .spawn(move || {
            let _ = tx.send(std::fs::read(owned));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("read of {} timed out after {:?}", path.display(), timeout),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("reader thread for {} exited without a result", path.display()),
        )),
    }
}

/// Read a file with a per-attempt timeout and the given retry policy.
///
/// `NotFound` is reported immediately; timeouts and other transient I/O
/// errors are retried.
///
/// # Errors
/// Returns `ArtifactError::NotFound`, `Io` or `Exhausted`.
pub fn read_with_retry(
    path: &Path,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<Vec<u8>, ArtifactError> {
    let desc = format!("read {}", path.display());
    retry_with_backoff(retry, &desc, |_| read_bounded(path, timeout), is_transient_io).map_err(
        |(e, attempts)| {
            if e.kind() == io::ErrorKind::NotFound {
                ArtifactError::NotFound(path.display().to_string())
            } else if attempts > 1 {
                ArtifactError::Exhausted {
                    key: path.display().to_string(),
                    attempts,
                    last: e.to_string(),
                }
            } else {
                ArtifactError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        },
    )
}

/// Model artifact stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    path: PathBuf,
    retry: RetryPolicy,
    timeout: Duration,
}

impl LocalArtifact {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ArtifactSource for LocalArtifact {
    fn key(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactError> {
        read_with_retry(&self.path, &self.retry, self.timeout)
    }
}

/// Failure of a single HTTP attempt, tagged with whether it may be retried.
#[derive(Debug)]
struct HttpAttemptError {
    message: String,
    retryable: bool,
}

impl std::fmt::Display for HttpAttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Model artifact downloaded over HTTP(S).
///
/// When a cache path is set, each successful download is written there and
/// later fetches read the file instead of the network. The file is skipped
/// and replaced once it is older than the max age or no longer matches the
/// pinned checksum.
pub struct HttpArtifact {
    url: String,
    client: reqwest::blocking::Client,
    timeout: Duration,
    cache_path: Option<PathBuf>,
    max_age: Option<Duration>,
    expected_sha256: Option<String>,
    retry: RetryPolicy,
}

impl HttpArtifact {
    /// Create an HTTP artifact source with a hard per-request timeout.
    ///
    /// # Errors
    /// Returns `ArtifactError::Http` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ArtifactError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArtifactError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            url,
            client,
            timeout,
            cache_path: None,
            max_age: None,
            expected_sha256: None,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Re-download when the cached file is older than `max_age`.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Only accept bytes whose SHA-256 matches `sha256` (hex).
    #[must_use]
    pub fn with_expected_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn download_once(&self) -> Result<Vec<u8>, HttpAttemptError> {
        let response = self.client.get(&self.url).send().map_err(|e| HttpAttemptError {
            retryable: e.is_timeout() || e.is_connect() || e.is_request(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpAttemptError {
                retryable: status.is_server_error() || status.as_u16() == 429,
                message: format!("HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| HttpAttemptError {
                retryable: e.is_timeout(),
                message: e.to_string(),
            })
    }

    /// The cached download, if present, fresh and matching the pinned checksum.
    fn cached_download(&self) -> Option<Vec<u8>> {
        let path = self.cache_path.as_ref()?;
        let metadata = std::fs::metadata(path).ok()?;

        if let Some(max_age) = self.max_age {
            let fresh = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age <= max_age);
            if !fresh {
                tracing::info!("Cached model download at {:?} is stale", path);
                return None;
            }
        }

        let bytes = match read_with_retry(path, &self.retry, self.timeout) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached download: {}", e);
                return None;
            }
        };

        if let Some(expected) = &self.expected_sha256 {
            if verify_sha256(&self.url, &bytes, expected).is_err() {
                tracing::warn!("Cached model download does not match the pinned checksum, discarding");
                self.discard();
                return None;
            }
        }

        tracing::debug!("Using cached model download at {:?}", path);
        Some(bytes)
    }

    fn store_in_cache(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            // Best-effort: a missing cache only costs a re-download.
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("partial");
        let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
        if let Err(e) = written {
            tracing::warn!("Failed to cache downloaded model at {:?}: {}", path, e);
            let _ = std::fs::remove_file(&tmp);
        }
    }
}

impl ArtifactSource for HttpArtifact {
    fn key(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactError> {
        if let Some(bytes) = self.cached_download() {
            return Ok(bytes);
        }

        tracing::info!("Downloading model artifact...");
        let bytes = retry_with_backoff(
            &self.retry,
            "download model artifact",
            |_| self.download_once(),
            |e| e.retryable,
        )
        .map_err(|(e, attempts)| {
            if attempts > 1 {
                ArtifactError::Exhausted {
                    key: self.url.clone(),
                    attempts,
                    last: e.message,
                }
            } else {
                ArtifactError::Http {
                    url: self.url.clone(),
                    message: e.message,
                }
            }
        })?;

        tracing::info!("Downloaded model artifact ({} bytes)", bytes.len());

        if let Some(expected) = &self.expected_sha256 {
            verify_sha256(&self.url, &bytes, expected)?;
        }
        if let Some(path) = &self.cache_path {
            Self::store_in_cache(path, &bytes);
        }

        Ok(bytes)
    }

    fn discard(&self) {
        if let Some(path) = &self.cache_path {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!("Removed cached model download at {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove cached download {:?}: {}", path, e),
            }
        }
    }
}
