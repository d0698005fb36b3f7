//! # Chronicare
#![allow(non_snake_case)]
//!
//! Clinical risk engine for chronic-care cohorts.
//!
//! This crate provides:
//! - Loading and gap-filling of per-reading vital-sign time series
//! - Per-patient feature engineering (aggregates, volatility, trend slope)
//! - Scoring with a pre-trained binary classifier
//! - Cohort assembly with threshold filtering, ranking and explanations
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (readings, feature rows, risk records)
//! - `ports`: Trait definitions for external capabilities (classifier, explainer, artifacts)
//! - `adapters`: Concrete implementations (logistic model, explainers, artifact fetch/cache, log sanitizing)
//! - `application`: Use cases orchestrating the pipeline stages
//! - `config`: Runtime configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{CleanedReading, FeatureMatrix, PatientFeatureRow, RiskLevel, RiskRecord};

/// Result type for Chronicare operations
pub type Result<T> = std::result::Result<T, ChronicareError>;

/// Main error type for Chronicare
#[derive(Debug, thiserror::Error)]
pub enum ChronicareError {
    #[error("Data source not found or unreadable: {0}")]
    DataNotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Model artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Classifier returned an invalid prediction: {0}")]
    InvalidPrediction(String),

    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<adapters::ArtifactError> for ChronicareError {
    fn from(e: adapters::ArtifactError) -> Self {
        Self::ArtifactUnavailable(e.to_string())
    }
}
