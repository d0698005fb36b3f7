//! Feature builder: Per-patient aggregates, volatility and BP trend.

use std::collections::BTreeMap;

use crate::domain::{CleanedReading, FeatureMatrix, PatientFeatureRow};

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Sample standard deviation (n - 1 denominator). Fewer than two values give 0.
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Least-squares line through `(x, y)` samples as `(intercept, slope)`.
///
/// `None` when x has no spread.
fn fit_linear(samples: &[(f64, f64)]) -> Option<(f64, f64)> {
    let m = samples.len() as f64;
    if samples.is_empty() {
        return None;
    }
    let mean_x = samples.iter().map(|(x, _)| x).sum::<f64>() / m;
    let mean_y = samples.iter().map(|(_, y)| y).sum::<f64>() / m;
    let (sxx, sxy) = samples.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });
    if !sxx.is_finite() || sxx.abs() <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

/// Slope of `values` regressed on their index `0..n`.
///
/// Fewer than two points or a constant series give exactly 0.
#[must_use]
pub fn trend_slope(values: &[f64]) -> f64 {
    let Some(first) = values.first() else {
        return 0.0;
    };
    if values.len() < 2 || values.iter().all(|v| v == first) {
        return 0.0;
    }

    let samples: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();
    fit_linear(&samples).map_or(0.0, |(_, slope)| slope)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Compute the feature row for one patient's readings.
///
/// `readings` need not be sorted; they are ordered by timestamp here.
#[must_use]
pub fn patient_features(patient_id: &str, readings: &[&CleanedReading]) -> PatientFeatureRow {
    let mut ordered: Vec<&CleanedReading> = readings.to_vec();
    ordered.sort_by_key(|r| r.timestamp);

    let hr: Vec<f64> = ordered.iter().map(|r| r.heart_rate).collect();
    let sbp: Vec<f64> = ordered.iter().map(|r| r.systolic_bp).collect();

    PatientFeatureRow {
        patient_id: patient_id.to_string(),
        avg_hr: finite_or_zero(mean(&hr)),
        max_hr: finite_or_zero(max(&hr)),
        avg_sbp: finite_or_zero(mean(&sbp)),
        max_sbp: finite_or_zero(max(&sbp)),
        std_hr: finite_or_zero(sample_std(&hr)),
        std_sbp: finite_or_zero(sample_std(&sbp)),
        sbp_trend: finite_or_zero(trend_slope(&sbp)),
        reading_count: ordered.len(),
    }
}

/// Service turning cleaned readings into one feature row per patient.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// One row per distinct patient id, ordered by patient id.
    #[must_use]
    pub fn build(&self, readings: &[CleanedReading]) -> Vec<PatientFeatureRow> {
        let mut by_patient: BTreeMap<&str, Vec<&CleanedReading>> = BTreeMap::new();
        for r in readings {
            by_patient.entry(r.patient_id.as_str()).or_default().push(r);
        }

        let rows: Vec<PatientFeatureRow> = by_patient
            .into_iter()
            .map(|(id, group)| patient_features(id, &group))
            .collect();

        tracing::info!(
            "Feature engineering complete: {} patients, {} features",
            rows.len(),
            crate::domain::FEATURE_NAMES.len()
        );
        rows
    }

    /// Build the feature rows and the matching matrix.
    #[must_use]
    pub fn build_matrix(&self, readings: &[CleanedReading]) -> (Vec<PatientFeatureRow>, FeatureMatrix) {
        let rows = self.build(readings);
        let matrix = FeatureMatrix::from_rows(&rows);
        (rows, matrix)
    }
}
