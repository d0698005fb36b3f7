//! Cohort assembler: Risk records, threshold filtering and ranking.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::{risk_score_from_probability, PatientFeatureRow, RiskLevel, RiskRecord};
use crate::ports::Explainer;
use crate::{ChronicareError, Result};

/// Default minimum score shown in the cohort table.
pub const DEFAULT_RISK_THRESHOLD: f64 = 50.0;

/// Minimum risk score for a patient to appear in the filtered cohort.
///
/// Always within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RiskThreshold(f64);

impl RiskThreshold {
    /// Validate a threshold.
    ///
    /// # Errors
    /// Returns `Validation` if `value` is not a finite number in [0, 100].
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=100.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ChronicareError::Validation(format!(
                "risk threshold must be within [0, 100], got {value}"
            )))
        }
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether a record passes the threshold (inclusive).
    #[must_use]
    pub fn admits(self, record: &RiskRecord) -> bool {
        f64::from(record.risk_score) >= self.0
    }
}

impl Default for RiskThreshold {
    fn default() -> Self {
        Self(DEFAULT_RISK_THRESHOLD)
    }
}

impl TryFrom<f64> for RiskThreshold {
    type Error = ChronicareError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RiskThreshold> for f64 {
    fn from(t: RiskThreshold) -> Self {
        t.0
    }
}

impl std::fmt::Display for RiskThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Records with `risk_score >= threshold`, in input order.
#[must_use]
pub fn filter_by_threshold(records: &[RiskRecord], threshold: RiskThreshold) -> Vec<RiskRecord> {
    records
        .iter()
        .filter(|r| threshold.admits(r))
        .cloned()
        .collect()
}

fn rank_order(a: &RiskRecord, b: &RiskRecord) -> Ordering {
    b.risk_score
        .cmp(&a.risk_score)
        .then_with(|| a.patient_id.cmp(&b.patient_id))
}

/// Sort by score descending, ties by patient id ascending.
pub fn rank(records: &mut [RiskRecord]) {
    records.sort_by(rank_order);
}

/// Service joining probabilities and explanations into risk records.
pub struct CohortAssembler<E: Explainer> {
    explainer: E,
}

impl<E: Explainer> CohortAssembler<E> {
    pub fn new(explainer: E) -> Self {
        Self { explainer }
    }

    #[must_use]
    pub fn explainer_name(&self) -> &'static str {
        self.explainer.name()
    }

    /// Build one risk record per feature row.
    ///
    /// `probabilities[i]` belongs to `rows[i]`; output keeps that order.
    ///
    /// # Errors
    /// Returns `InvalidPrediction` if the two slices differ in length.
    pub fn assemble(
        &self,
        rows: &[PatientFeatureRow],
        probabilities: &[f64],
    ) -> Result<Vec<RiskRecord>> {
        if rows.len() != probabilities.len() {
            return Err(ChronicareError::InvalidPrediction(format!(
                "{} probabilities for {} patients",
                probabilities.len(),
                rows.len()
            )));
        }

        let records: Vec<RiskRecord> = rows
            .iter()
            .zip(probabilities)
            .map(|(row, &probability)| {
                let risk_score = risk_score_from_probability(probability);
                RiskRecord {
                    patient_id: row.patient_id.clone(),
                    risk_score,
                    probability,
                    risk_level: RiskLevel::from_score(risk_score),
                    explanation: self.explainer.explain(row, probability),
                }
            })
            .collect();

        tracing::info!(
            "Assembled {} risk records using {} explainer",
            records.len(),
            self.explainer.name()
        );
        Ok(records)
    }
}
