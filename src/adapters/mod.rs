//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external resources:
//! - `logistic`: JSON-exported logistic model implementing `RiskClassifier`
//! - `explain`: placeholder, rule-based and SHAP explainers
//! - `artifact`: model artifact retrieval (file, HTTP) and the model cache
//! - `retry`: bounded retry with backoff for I/O
//! - `sanitize`: PII filtering for logs

pub mod artifact;
pub mod explain;
pub mod logistic;
pub mod retry;
pub mod sanitize;

// Re-export artifact error for lib.rs
pub use artifact::ArtifactError;
