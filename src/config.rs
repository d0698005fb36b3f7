//! Runtime configuration.
//!
//! Built in three layers: defaults, an optional JSON file named by
//! `CHRONICARE_CONFIG`, then individual `CHRONICARE_*` environment overrides:
//!
//! | Variable | Field |
//! |---|---|
//! | `CHRONICARE_DATA_PATH` | `data_path` |
//! | `CHRONICARE_MODEL_PATH` | `model` (local file) |
//! | `CHRONICARE_MODEL_URL` | `model` (download, wins over the path) |
//! | `CHRONICARE_MODEL_SHA256` | `model_sha256` |
//! | `CHRONICARE_MODEL_CACHE_DIR` | `model_cache_dir` |
//! | `CHRONICARE_MODEL_MAX_AGE_SECS` | `model_max_age_secs` |
//! | `CHRONICARE_RISK_THRESHOLD` | `risk_threshold` |
//! | `CHRONICARE_EXPLAINER` | `explainer` |
//! | `CHRONICARE_FETCH_TIMEOUT_SECS` | `fetch_timeout_secs` |
//! | `CHRONICARE_FETCH_MAX_ATTEMPTS` | `retry.max_attempts` |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::artifact::{
    sha256_hex, ArtifactCache, HttpArtifact, LocalArtifact, RefreshPolicy, DEFAULT_FETCH_TIMEOUT,
};
use crate::adapters::explain::ExplainerKind;
use crate::adapters::logistic::LogisticRiskModel;
use crate::adapters::retry::RetryPolicy;
use crate::application::{Loader, RiskThreshold};
use crate::ports::{ArtifactSource, RiskClassifier};
use crate::{ChronicareError, Result};

/// Environment variable naming a JSON config file.
pub const CONFIG_FILE_ENV: &str = "CHRONICARE_CONFIG";

/// Where the model artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Path(PathBuf),
    Url(String),
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Path(PathBuf::from("models/risk_model.json"))
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Vital-sign CSV
    pub data_path: PathBuf,

    pub model: ModelSource,

    /// Expected SHA-256 (hex) of the model artifact
    pub model_sha256: Option<String>,

    /// Directory for downloaded model artifacts
    pub model_cache_dir: PathBuf,

    /// Reload cached models older than this; `None` keeps them for the process lifetime
    pub model_max_age_secs: Option<u64>,

    /// Hard timeout for each source read and HTTP request
    pub fetch_timeout_secs: u64,

    /// Retry schedule for source reads and model fetches
    pub retry: RetryPolicy,

    /// Minimum score in the filtered cohort
    pub risk_threshold: RiskThreshold,

    pub explainer: ExplainerKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/patient_vitals.csv"),
            model: ModelSource::default(),
            model_sha256: None,
            model_cache_dir: std::env::temp_dir().join("chronicare"),
            model_max_age_secs: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            retry: RetryPolicy::default(),
            risk_threshold: RiskThreshold::default(),
            explainer: ExplainerKind::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ChronicareError::Validation(format!("{name}={raw:?}: {e}")))
}

impl PipelineConfig {
    /// Defaults, then `CHRONICARE_CONFIG`, then environment overrides.
    ///
    /// # Errors
    /// Returns an error if the config file is unreadable or any value is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; absent fields keep their defaults.
    ///
    /// # Errors
    /// Returns `Io` or `Serialization` errors.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `CHRONICARE_*` overrides obtained through `lookup`.
    ///
    /// # Errors
    /// Returns `Validation` for unparseable values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CHRONICARE_DATA_PATH") {
            self.data_path = PathBuf::from(v.trim());
        }
        if let Some(v) = get("CHRONICARE_MODEL_PATH") {
            self.model = ModelSource::Path(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("CHRONICARE_MODEL_URL") {
            self.model = ModelSource::Url(v.trim().to_string());
        }
        if let Some(v) = get("CHRONICARE_MODEL_SHA256") {
            self.model_sha256 = Some(v.trim().to_lowercase());
        }
        if let Some(v) = get("CHRONICARE_MODEL_CACHE_DIR") {
            self.model_cache_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = get("CHRONICARE_MODEL_MAX_AGE_SECS") {
            self.model_max_age_secs = Some(parse_env("CHRONICARE_MODEL_MAX_AGE_SECS", &v)?);
        }
        if let Some(v) = get("CHRONICARE_RISK_THRESHOLD") {
            let value: f64 = parse_env("CHRONICARE_RISK_THRESHOLD", &v)?;
            self.risk_threshold = RiskThreshold::new(value)?;
        }
        if let Some(v) = get("CHRONICARE_EXPLAINER") {
            self.explainer = parse_env("CHRONICARE_EXPLAINER", &v)?;
        }
        if let Some(v) = get("CHRONICARE_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_env("CHRONICARE_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CHRONICARE_FETCH_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("CHRONICARE_FETCH_MAX_ATTEMPTS", &v)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `Validation` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ChronicareError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ChronicareError::Validation(
                "fetch_timeout_secs must be positive".into(),
            ));
        }
        if let Some(sha) = &self.model_sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ChronicareError::Validation(
                    "model_sha256 must be 64 hex characters".into(),
                ));
            }
        }
        if let ModelSource::Url(url) = &self.model {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ChronicareError::Validation(format!(
                    "model URL must be http(s): {url}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        match self.model_max_age_secs {
            Some(secs) => RefreshPolicy::MaxAge(Duration::from_secs(secs)),
            None => RefreshPolicy::Never,
        }
    }

    /// Loader using the configured retry schedule and read timeout.
    #[must_use]
    pub fn loader(&self) -> Loader {
        Loader::new(self.retry.clone()).with_timeout(self.fetch_timeout())
    }

    /// Download location for a URL-sourced model.
    #[must_use]
    pub fn cache_path_for(&self, url: &str) -> PathBuf {
        let digest = sha256_hex(url.as_bytes());
        self.model_cache_dir.join(format!("model-{}.json", &digest[..16]))
    }

    /// The configured model artifact source.
    ///
    /// # Errors
    /// Returns `ArtifactUnavailable` if the HTTP client cannot be built.
    pub fn model_artifact(&self) -> Result<Box<dyn ArtifactSource>> {
        match &self.model {
            ModelSource::Path(path) => Ok(Box::new(
                LocalArtifact::new(path)
                    .with_retry(self.retry.clone())
                    .with_timeout(self.fetch_timeout()),
            )),
            ModelSource::Url(url) => {
                let mut source = HttpArtifact::new(url.clone(), self.fetch_timeout())?
                    .with_cache_path(self.cache_path_for(url))
                    .with_retry(self.retry.clone());
                if let Some(secs) = self.model_max_age_secs {
                    source = source.with_max_age(Duration::from_secs(secs));
                }
                if let Some(sha) = &self.model_sha256 {
                    source = source.with_expected_sha256(sha.clone());
                }
                Ok(Box::new(source))
            }
        }
    }

    /// Fetch, verify and parse the model through `cache`.
    ///
    /// # Errors
    /// Returns `ArtifactUnavailable` on fetch, checksum or format failure.
    pub fn load_model(
        &self,
        cache: &ArtifactCache<LogisticRiskModel>,
    ) -> Result<Arc<LogisticRiskModel>> {
        let source = self.model_artifact()?;
        let key = source.key();
        let expected = self.model_sha256.as_deref();

        let model = cache.get_or_load(source.as_ref(), |bytes| {
            LogisticRiskModel::from_verified_bytes(&key, bytes, expected)
        })?;
        tracing::info!(
            "Model ready ({} features, sha256={})",
            model.feature_names().len(),
            model.content_sha256()
        );
        Ok(model)
    }

    /// Drop the configured model from `cache` and from the download cache,
    /// so the next `load_model` fetches it again.
    ///
    /// # Errors
    /// Returns `ArtifactUnavailable` if the artifact source cannot be built.
    pub fn invalidate_model(&self, cache: &ArtifactCache<LogisticRiskModel>) -> Result<()> {
        let source = self.model_artifact()?;
        cache.invalidate(source.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn bundled_model() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/risk_model.json")
    }

    #[test]
    fn test_defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.risk_threshold.value(), 50.0);
        assert_eq!(c.explainer, ExplainerKind::Placeholder);
        assert_eq!(c.refresh_policy(), RefreshPolicy::Never);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = PipelineConfig::default();
        c.apply_overrides(lookup(&[
            ("CHRONICARE_DATA_PATH", "/srv/vitals.csv"),
            ("CHRONICARE_RISK_THRESHOLD", "72.5"),
            ("CHRONICARE_EXPLAINER", "shap"),
            ("CHRONICARE_FETCH_MAX_ATTEMPTS", "5"),
            ("CHRONICARE_MODEL_MAX_AGE_SECS", "600"),
            ("CHRONICARE_MODEL_URL", "https://models.example.org/risk.json"),
        ]))
        .expect("overrides");

        assert_eq!(c.data_path, PathBuf::from("/srv/vitals.csv"));
        assert_eq!(c.risk_threshold.value(), 72.5);
        assert_eq!(c.explainer, ExplainerKind::Shap);
        assert_eq!(c.retry.max_attempts, 5);
        assert_eq!(c.refresh_policy(), RefreshPolicy::MaxAge(Duration::from_secs(600)));
        assert!(matches!(c.model, ModelSource::Url(_)));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut c = PipelineConfig::default();
        let err = c
            .apply_overrides(lookup(&[("CHRONICARE_RISK_THRESHOLD", "150")]))
            .expect_err("out of range");
        assert!(matches!(err, ChronicareError::Validation(_)));

        let err = c
            .apply_overrides(lookup(&[("CHRONICARE_RISK_THRESHOLD", "high")]))
            .expect_err("not a number");
        assert!(matches!(err, ChronicareError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = PipelineConfig::default();
        c.model_sha256 = Some("abc".into());
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.retry.max_attempts = 0;
        assert!(c.validate().is_err());

        let mut c = PipelineConfig::default();
        c.model = ModelSource::Url("ftp://x/model.json".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "risk_threshold": 30, "explainer": "rule_based", "model": { "url": "https://h/m.json" } }"#,
        )
        .expect("write");

        let c = PipelineConfig::from_file(&path).expect("config");
        assert_eq!(c.risk_threshold.value(), 30.0);
        assert_eq!(c.explainer, ExplainerKind::RuleBased);
        assert_eq!(c.model, ModelSource::Url("https://h/m.json".into()));
        assert_eq!(c.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_from_file_rejects_bad_threshold() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "risk_threshold": -5 }"#).expect("write");
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(ChronicareError::Serialization(_))
        ));
    }

    #[test]
    fn test_cache_path_is_stable_per_url() {
        let c = PipelineConfig::default();
        let a = c.cache_path_for("https://h/a.json");
        assert_eq!(a, c.cache_path_for("https://h/a.json"));
        assert_ne!(a, c.cache_path_for("https://h/b.json"));
        assert!(a.starts_with(&c.model_cache_dir));
    }

    #[test]
    fn test_load_bundled_model_through_cache() {
        let config = PipelineConfig {
            model: ModelSource::Path(bundled_model()),
            retry: RetryPolicy::no_retry(),
            ..PipelineConfig::default()
        };
        let cache = ArtifactCache::default();

        let first = config.load_model(&cache).expect("model");
        let second = config.load_model(&cache).expect("model");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn test_checksum_mismatch_is_artifact_unavailable() {
        let config = PipelineConfig {
            model: ModelSource::Path(bundled_model()),
            model_sha256: Some("0".repeat(64)),
            retry: RetryPolicy::no_retry(),
            ..PipelineConfig::default()
        };
        let err = config
            .load_model(&ArtifactCache::default())
            .expect_err("checksum");
        assert!(matches!(err, ChronicareError::ArtifactUnavailable(_)));
    }

    #[test]
    fn test_missing_model_is_artifact_unavailable() {
        let dir = tempdir().expect("tempdir");
        let config = PipelineConfig {
            model: ModelSource::Path(dir.path().join("absent.json")),
            retry: RetryPolicy::no_retry(),
            ..PipelineConfig::default()
        };
        let err = config
            .load_model(&ArtifactCache::default())
            .expect_err("missing");
        assert!(matches!(err, ChronicareError::ArtifactUnavailable(_)));
    }

    fn url_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            model: ModelSource::Url("http://127.0.0.1:9/risk_model.json".into()),
            model_cache_dir: dir.to_path_buf(),
            retry: RetryPolicy::no_retry(),
            fetch_timeout_secs: 1,
            ..PipelineConfig::default()
        }
    }

    fn seed_download(config: &PipelineConfig, bytes: &[u8]) -> PathBuf {
        let ModelSource::Url(url) = &config.model else {
            panic!("url config expected");
        };
        let path = config.cache_path_for(url);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, bytes).expect("write");
        path
    }

    #[test]
    fn test_url_model_served_from_matching_download() {
        let dir = tempdir().expect("tempdir");
        let bytes = std::fs::read(bundled_model()).expect("read");
        let config = PipelineConfig {
            model_sha256: Some(sha256_hex(&bytes)),
            ..url_config(dir.path())
        };
        seed_download(&config, &bytes);

        let model = config.load_model(&ArtifactCache::default()).expect("model");
        assert_eq!(model.content_sha256(), sha256_hex(&bytes));
    }

    #[test]
    fn test_new_pinned_checksum_refetches_model() {
        let dir = tempdir().expect("tempdir");
        let bytes = std::fs::read(bundled_model()).expect("read");
        let config = PipelineConfig {
            model_sha256: Some(sha256_hex(b"a newer model")),
            ..url_config(dir.path())
        };
        let path = seed_download(&config, &bytes);

        // The old download is discarded and the unreachable URL is tried.
        let err = config
            .load_model(&ArtifactCache::default())
            .expect_err("old download rejected");
        assert!(matches!(err, ChronicareError::ArtifactUnavailable(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_expired_download_refetches_model() {
        let dir = tempdir().expect("tempdir");
        let config = PipelineConfig {
            model_max_age_secs: Some(0),
            ..url_config(dir.path())
        };
        let bytes = std::fs::read(bundled_model()).expect("read");
        seed_download(&config, &bytes);
        std::thread::sleep(Duration::from_millis(20));

        let err = config
            .load_model(&ArtifactCache::default())
            .expect_err("stale download not served");
        assert!(matches!(err, ChronicareError::ArtifactUnavailable(_)));
    }

    #[test]
    fn test_invalidate_model_removes_download() {
        let dir = tempdir().expect("tempdir");
        let config = url_config(dir.path());
        let bytes = std::fs::read(bundled_model()).expect("read");
        let path = seed_download(&config, &bytes);
        let cache = ArtifactCache::default();

        config.load_model(&cache).expect("served from download");
        config.invalidate_model(&cache).expect("invalidate");
        assert!(!path.exists());
        assert!(config.load_model(&cache).is_err());
    }
}
