//! Explainer port: Trait for per-patient risk explanations.
//!
//! The cohort assembler asks an explainer for the trend indicator and the
//! top risk driver of every patient, so real explanation logic can replace
//! the placeholder without touching the assembler.

use crate::domain::{Explanation, PatientFeatureRow};

/// Trait for risk explainers.
pub trait Explainer: Send + Sync {
    /// Explain one patient's risk.
    ///
    /// # Arguments
    /// * `row` - The patient's features
    /// * `probability` - The classifier's class-1 probability for this patient
    fn explain(&self, row: &PatientFeatureRow, probability: f64) -> Explanation;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<T: Explainer + ?Sized> Explainer for Box<T> {
    fn explain(&self, row: &PatientFeatureRow, probability: f64) -> Explanation {
        (**self).explain(row, probability)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
