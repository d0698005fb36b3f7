//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the pipeline stages and the end-to-end risk run.

mod cohort;
mod features;
mod loader;
mod pipeline;
mod scoring;
mod worker;

pub use cohort::{
    filter_by_threshold, rank, CohortAssembler, RiskThreshold, DEFAULT_RISK_THRESHOLD,
};
pub use features::{patient_features, sample_std, trend_slope, FeatureBuilder};
pub use loader::{clean_readings, parse_raw, parse_timestamp, Loader};
pub use pipeline::{CohortSummary, PatientDetail, PipelineStage, RiskPipeline, RiskReport};
pub use scoring::Scorer;
pub use worker::{PipelineProgress, PipelineWorker, PipelineWorkerHandle};
