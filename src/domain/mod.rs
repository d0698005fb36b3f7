//! Domain layer: Core business types and logic.
//!
//! This module contains plain Rust types with no I/O.
//! All types are serializable.

mod features;
mod reading;
mod risk;

pub use features::{FeatureMatrix, PatientFeatureRow, FEATURE_NAMES};
pub use reading::{CleanedReading, RawReading};
pub use risk::{
    risk_score_from_probability, Explanation, ExplanationSource, RiskLevel, RiskRecord, RiskTrend,
};
