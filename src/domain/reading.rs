//! Vital-sign reading types.
//!
//! One reading is a single (patient, timestamp) observation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reading as parsed from the source, before gap-filling.
///
/// Numeric cells that were empty (or an explicit NA marker) are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Patient identifier
    pub patient_id: String,

    /// Observation time (naive source values are interpreted as UTC)
    pub timestamp: DateTime<Utc>,

    /// Heart rate in beats per minute
    pub heart_rate: Option<f64>,

    /// Systolic blood pressure in mmHg
    pub systolic_bp: Option<f64>,

    /// Any further vitals present in the source, keyed by column name
    pub other_vitals: BTreeMap<String, Option<f64>>,
}

/// A reading after forward-fill; no numeric value is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedReading {
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub heart_rate: f64,
    pub systolic_bp: f64,
    pub other_vitals: BTreeMap<String, f64>,
}

impl RawReading {
    /// Convert to a cleaned reading if no value is missing.
    #[must_use]
    pub fn into_cleaned(self) -> Option<CleanedReading> {
        let heart_rate = self.heart_rate?;
        let systolic_bp = self.systolic_bp?;

        let mut other_vitals = BTreeMap::new();
        for (name, value) in self.other_vitals {
            other_vitals.insert(name, value?);
        }

        Some(CleanedReading {
            patient_id: self.patient_id,
            timestamp: self.timestamp,
            heart_rate,
            systolic_bp,
            other_vitals,
        })
    }
}
