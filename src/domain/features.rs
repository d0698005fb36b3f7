//! Per-patient feature types used as classifier input.

use serde::{Deserialize, Serialize};

/// Feature names in the column order used at training time.
pub const FEATURE_NAMES: [&str; 7] = [
    "avg_hr",
    "max_hr",
    "avg_sbp",
    "max_sbp",
    "std_hr",
    "std_sbp",
    "sbp_trend",
];

/// Summary features for a single patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFeatureRow {
    /// Patient identifier
    pub patient_id: String,

    /// Mean heart rate (bpm)
    pub avg_hr: f64,

    /// Maximum heart rate (bpm)
    pub max_hr: f64,

    /// Mean systolic blood pressure (mmHg)
    pub avg_sbp: f64,

    /// Maximum systolic blood pressure (mmHg)
    pub max_sbp: f64,

    /// Sample standard deviation of heart rate (0 for a single reading)
    pub std_hr: f64,

    /// Sample standard deviation of systolic blood pressure (0 for a single reading)
    pub std_sbp: f64,

    /// OLS slope of systolic blood pressure against reading index
    pub sbp_trend: f64,

    /// Number of cleaned readings behind these features
    pub reading_count: usize,
}

impl PatientFeatureRow {
    /// Feature values in `FEATURE_NAMES` order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.avg_hr,
            self.max_hr,
            self.avg_sbp,
            self.max_sbp,
            self.std_hr,
            self.std_sbp,
            self.sbp_trend,
        ]
    }

    /// Look up a feature value by column name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "avg_hr" => Some(self.avg_hr),
            "max_hr" => Some(self.max_hr),
            "avg_sbp" => Some(self.avg_sbp),
            "max_sbp" => Some(self.max_sbp),
            "std_hr" => Some(self.std_hr),
            "std_sbp" => Some(self.std_sbp),
            "sbp_trend" => Some(self.sbp_trend),
            _ => None,
        }
    }
}

/// Feature table: one row per patient, identifier column kept apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    /// Column names, in the order of each row's values
    pub columns: Vec<String>,

    /// Patient identifier for each row
    pub patient_ids: Vec<String>,

    /// Feature values, `rows[i][j]` belongs to `patient_ids[i]` and `columns[j]`
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build the matrix from feature rows using the canonical column order.
    #[must_use]
    pub fn from_rows(rows: &[PatientFeatureRow]) -> Self {
        Self {
            columns: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            patient_ids: rows.iter().map(|r| r.patient_id.clone()).collect(),
            rows: rows.iter().map(PatientFeatureRow::to_vec).collect(),
        }
    }

    /// Number of patient rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return a copy with columns rearranged into `order`.
    ///
    /// # Errors
    /// Returns a description of the mismatch if `order` is not a permutation
    /// of this matrix's columns, or if a row's width differs from the column
    /// count.
    pub fn reorder(&self, order: &[String]) -> Result<Self, String> {
        if let Some(i) = self.rows.iter().position(|r| r.len() != self.columns.len()) {
            return Err(format!(
                "row {i} has {} values for {} columns",
                self.rows[i].len(),
                self.columns.len()
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.as_str()) {
                return Err(format!("duplicate column '{c}'"));
            }
        }

        let missing: Vec<&str> = order
            .iter()
            .filter(|c| !seen.contains(c.as_str()))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !order.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() || !extra.is_empty() || order.len() != self.columns.len() {
            return Err(format!(
                "expected columns {:?}, missing {:?}, unexpected {:?}",
                order, missing, extra
            ));
        }

        let index: Vec<usize> = order
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| index.iter().map(|&j| row[j]).collect())
            .collect();

        Ok(Self {
            columns: order.to_vec(),
            patient_ids: self.patient_ids.clone(),
            rows,
        })
    }
}
