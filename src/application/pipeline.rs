//! Pipeline service: Orchestrates one risk run.
//!
//! This service coordinates:
//! - Loading and gap-filling readings
//! - Feature engineering
//! - Scoring
//! - Cohort assembly
//!
//! and returns a `RiskReport` for the presentation layer.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::cohort::{filter_by_threshold, rank, CohortAssembler, RiskThreshold};
use super::features::FeatureBuilder;
use super::loader::Loader;
use super::scoring::Scorer;
use crate::domain::{CleanedReading, PatientFeatureRow, RiskLevel, RiskRecord};
use crate::ports::{Explainer, RiskClassifier};
use crate::Result;

/// Stage of a pipeline run, reported before the stage starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loading,
    BuildingFeatures,
    Scoring,
    Assembling,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Loading => "Loading readings",
            Self::BuildingFeatures => "Building features",
            Self::Scoring => "Scoring patients",
            Self::Assembling => "Assembling cohort",
        };
        f.write_str(label)
    }
}

/// Cohort-level statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CohortSummary {
    pub patient_count: usize,
    pub mean_score: f64,
    pub max_score: u8,
    pub level_counts: BTreeMap<RiskLevel, usize>,
}

impl CohortSummary {
    #[must_use]
    pub fn from_records(records: &[RiskRecord]) -> Self {
        let mut level_counts = BTreeMap::new();
        for r in records {
            *level_counts.entry(r.risk_level).or_insert(0) += 1;
        }

        let mean_score = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| f64::from(r.risk_score)).sum::<f64>() / records.len() as f64
        };

        Self {
            patient_count: records.len(),
            mean_score,
            max_score: records.iter().map(|r| r.risk_score).max().unwrap_or(0),
            level_counts,
        }
    }

    /// Number of patients in `level`.
    #[must_use]
    pub fn count(&self, level: RiskLevel) -> usize {
        self.level_counts.get(&level).copied().unwrap_or(0)
    }
}

/// Everything the detail view shows for one patient.
#[derive(Debug, Clone, Copy)]
pub struct PatientDetail<'a> {
    pub features: &'a PatientFeatureRow,
    pub record: &'a RiskRecord,
    /// Cleaned readings in time order, for the trend chart
    pub readings: &'a [CleanedReading],
}

/// Output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// Feature rows, ordered by patient id
    pub features: Vec<PatientFeatureRow>,

    /// Risk records in feature-row order (unfiltered)
    pub cohort: Vec<RiskRecord>,

    /// Cleaned readings per patient
    pub readings: BTreeMap<String, Vec<CleanedReading>>,

    pub summary: CohortSummary,
}

impl RiskReport {
    /// Records at or above `threshold`, in feature-row order.
    #[must_use]
    pub fn filtered(&self, threshold: RiskThreshold) -> Vec<RiskRecord> {
        filter_by_threshold(&self.cohort, threshold)
    }

    /// Records at or above `threshold`, highest score first.
    #[must_use]
    pub fn ranked(&self, threshold: RiskThreshold) -> Vec<RiskRecord> {
        let mut records = self.filtered(threshold);
        rank(&mut records);
        records
    }

    #[must_use]
    pub fn record(&self, patient_id: &str) -> Option<&RiskRecord> {
        self.cohort.iter().find(|r| r.patient_id == patient_id)
    }

    /// Features, risk record and readings for one patient.
    #[must_use]
    pub fn patient_detail(&self, patient_id: &str) -> Option<PatientDetail<'_>> {
        let features = self.features.iter().find(|f| f.patient_id == patient_id)?;
        let record = self.record(patient_id)?;
        let readings = self
            .readings
            .get(patient_id)
            .map_or(&[][..], Vec::as_slice);
        Some(PatientDetail {
            features,
            record,
            readings,
        })
    }
}

/// Runs Loader → Feature Builder → Scorer → Cohort Assembler.
pub struct RiskPipeline<C: RiskClassifier, E: Explainer> {
    loader: Loader,
    features: FeatureBuilder,
    scorer: Scorer<C>,
    assembler: CohortAssembler<E>,
}

impl<C: RiskClassifier, E: Explainer> RiskPipeline<C, E> {
    /// Create a pipeline from a loaded classifier and an explainer.
    pub fn new(loader: Loader, classifier: C, explainer: E) -> Self {
        Self {
            loader,
            features: FeatureBuilder::new(),
            scorer: Scorer::new(classifier),
            assembler: CohortAssembler::new(explainer),
        }
    }

    /// Run on a CSV file.
    ///
    /// # Errors
    /// Returns the first stage error; no partial report is produced.
    pub fn run_path(&self, path: &Path) -> Result<RiskReport> {
        self.run_path_with_progress(path, |_| {})
    }

    /// Run on a CSV file, calling `on_stage` as each stage begins.
    ///
    /// # Errors
    /// Returns the first stage error.
    pub fn run_path_with_progress<F>(&self, path: &Path, mut on_stage: F) -> Result<RiskReport>
    where
        F: FnMut(PipelineStage),
    {
        tracing::info!("Starting risk pipeline for {}", path.display());
        on_stage(PipelineStage::Loading);
        let readings = self.loader.load_path(path)?;
        self.run_readings_with_progress(readings, on_stage)
    }

    /// Run on CSV content from any reader.
    ///
    /// # Errors
    /// Returns the first stage error.
    pub fn run_reader<R: Read>(&self, reader: R) -> Result<RiskReport> {
        let readings = self.loader.load_reader(reader)?;
        self.run_readings(readings)
    }

    /// Run on already cleaned readings.
    ///
    /// # Errors
    /// Returns the first stage error.
    pub fn run_readings(&self, readings: Vec<CleanedReading>) -> Result<RiskReport> {
        self.run_readings_with_progress(readings, |_| {})
    }

    fn run_readings_with_progress<F>(
        &self,
        readings: Vec<CleanedReading>,
        mut on_stage: F,
    ) -> Result<RiskReport>
    where
        F: FnMut(PipelineStage),
    {
        on_stage(PipelineStage::BuildingFeatures);
        let (features, matrix) = self.features.build_matrix(&readings);

        on_stage(PipelineStage::Scoring);
        let probabilities = self.scorer.score(&matrix)?;

        on_stage(PipelineStage::Assembling);
        tracing::debug!(
            "Explaining {} patients with the {} explainer",
            features.len(),
            self.assembler.explainer_name()
        );
        let cohort = self.assembler.assemble(&features, &probabilities)?;
        let summary = CohortSummary::from_records(&cohort);

        let mut by_patient: BTreeMap<String, Vec<CleanedReading>> = BTreeMap::new();
        for r in readings {
            by_patient.entry(r.patient_id.clone()).or_default().push(r);
        }
        for series in by_patient.values_mut() {
            series.sort_by_key(|r| r.timestamp);
        }

        tracing::info!(
            "Pipeline complete: {} patients, mean score {:.1}, {} high risk",
            summary.patient_count,
            summary.mean_score,
            summary.count(RiskLevel::High)
        );

        Ok(RiskReport {
            features,
            cohort,
            readings: by_patient,
            summary,
        })
    }
}
