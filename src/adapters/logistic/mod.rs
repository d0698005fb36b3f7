//! Logistic adapter: `RiskClassifier` backed by an exported logistic model.
//!
//! The artifact is a JSON document written by the training pipeline:
//!
//! ```json
//! {
//!   "version": 1,
//!   "feature_names": ["avg_hr", "max_hr", "avg_sbp", "max_sbp", "std_hr", "std_sbp", "sbp_trend"],
//!   "coefficients": [0.2, 0.3, 0.4, 0.3, 0.2, 1.5, 0.5],
//!   "intercept": -0.2,
//!   "scaler_mean": [80.0, 100.0, 130.0, 145.0, 8.0, 10.0, 0.0],
//!   "scaler_std": [10.0, 15.0, 15.0, 18.0, 4.0, 5.0, 3.0]
//! }
//! ```
//!
//! Features are standardized with the scaler before the linear combination;
//! the scaler fields are optional (identity when absent).

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::artifact::{sha256_hex, verify_sha256, ArtifactError};
use crate::domain::FeatureMatrix;
use crate::ports::{ClassifierError, RiskClassifier};

/// Highest artifact format version this adapter understands.
const SUPPORTED_VERSION: u32 = 1;

/// Model parameters as exported by the training pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedLogisticModel {
    #[serde(default = "default_version")]
    pub version: u32,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler_mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scaler_std: Option<Vec<f64>>,
}

fn default_version() -> u32 {
    1
}

/// Standardized logistic regression classifier.
#[derive(Debug, Clone)]
pub struct LogisticRiskModel {
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    mean: Vec<f64>,
    std: Vec<f64>,
    content_sha256: String,
}

impl LogisticRiskModel {
    /// Parse and validate a model from artifact bytes.
    ///
    /// # Errors
    /// Returns `ArtifactError::InvalidFormat` if the JSON is malformed or the
    /// parameters are inconsistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let exported: ExportedLogisticModel = serde_json::from_slice(bytes)
            .map_err(|e| ArtifactError::InvalidFormat(e.to_string()))?;
        let mut model = Self::from_exported(exported)?;
        model.content_sha256 = sha256_hex(bytes);
        Ok(model)
    }

    /// Parse after checking the bytes against an expected SHA-256.
    ///
    /// # Errors
    /// Returns `ArtifactError::ChecksumMismatch` or `InvalidFormat`.
    pub fn from_verified_bytes(
        key: &str,
        bytes: &[u8],
        expected_sha256: Option<&str>,
    ) -> Result<Self, ArtifactError> {
        if let Some(expected) = expected_sha256 {
            verify_sha256(key, bytes, expected)?;
        }
        Self::from_bytes(bytes)
    }

    /// Load a model from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(path.display().to_string())
            } else {
                ArtifactError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        Self::from_bytes(&bytes)
    }

    /// Build a model from already-parsed parameters.
    ///
    /// # Errors
    /// Returns `ArtifactError::InvalidFormat` if the parameters are inconsistent.
    pub fn from_exported(exported: ExportedLogisticModel) -> Result<Self, ArtifactError> {
        if exported.version == 0 || exported.version > SUPPORTED_VERSION {
            return Err(ArtifactError::InvalidFormat(format!(
                "Unsupported model version: {}",
                exported.version
            )));
        }

        let n = exported.feature_names.len();
        if n == 0 {
            return Err(ArtifactError::InvalidFormat(
                "Model declares no features".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &exported.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ArtifactError::InvalidFormat(format!(
                    "Duplicate feature name '{name}'"
                )));
            }
        }

        let mean = exported.scaler_mean.unwrap_or_else(|| vec![0.0; n]);
        let std = exported.scaler_std.unwrap_or_else(|| vec![1.0; n]);
        if exported.coefficients.len() != n || mean.len() != n || std.len() != n {
            return Err(ArtifactError::InvalidFormat(
                "Model parameter lengths do not match feature_names length".into(),
            ));
        }

        let all_finite = exported
            .coefficients
            .iter()
            .chain(mean.iter())
            .chain(std.iter())
            .chain(std::iter::once(&exported.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ArtifactError::InvalidFormat(
                "Model parameters must be finite".into(),
            ));
        }
        if let Some(pos) = std.iter().position(|s| *s <= 0.0) {
            return Err(ArtifactError::InvalidFormat(format!(
                "Scaler std for '{}' must be > 0",
                exported.feature_names[pos]
            )));
        }

        tracing::debug!("Validated logistic model with {} features", n);

        Ok(Self {
            feature_names: exported.feature_names,
            coefficients: exported.coefficients,
            intercept: exported.intercept,
            mean,
            std,
            content_sha256: String::new(),
        })
    }

    /// SHA-256 of the artifact bytes (empty when built from parameters).
    #[must_use]
    pub fn content_sha256(&self) -> &str {
        &self.content_sha256
    }

    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn standardized(&self, i: usize, x: f64) -> f64 {
        (x - self.mean[i]) / self.std[i]
    }

    /// Linear predictor (log-odds) for one row in model column order.
    #[must_use]
    pub fn logit(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .enumerate()
                .map(|(i, &x)| self.coefficients[i] * self.standardized(i, x))
                .sum::<f64>()
    }
}

/// Numerically stable logistic function.
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl RiskClassifier for LogisticRiskModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ClassifierError> {
        let expected = self.feature_names.len();
        let mut out = Vec::with_capacity(features.len());

        for (r, row) in features.rows.iter().enumerate() {
            if row.len() != expected {
                return Err(ClassifierError::FeatureCount {
                    got: row.len(),
                    expected,
                });
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(ClassifierError::NonFiniteFeature {
                    row: r,
                    column: self.feature_names[j].clone(),
                });
            }
            out.push(sigmoid(self.logit(row)));
        }

        Ok(out)
    }

    /// Exact additive logit contributions `coef_i * (x_i - mean_i) / std_i`.
    fn contributions(&self, row: &[f64]) -> Option<Vec<f64>> {
        if row.len() != self.feature_names.len() {
            return None;
        }
        Some(
            row.iter()
                .enumerate()
                .map(|(i, &x)| self.coefficients[i] * self.standardized(i, x))
                .collect(),
        )
    }
}
