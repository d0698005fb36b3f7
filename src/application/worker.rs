//! Background pipeline worker.
//!
//! Runs a pipeline on its own thread and streams stage progress over a
//! channel, so an interactive front-end stays responsive while a large
//! cohort is scored.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::pipeline::{PipelineStage, RiskPipeline, RiskReport};
use crate::ports::{Explainer, RiskClassifier};

/// Progress updates from the pipeline worker.
#[derive(Debug, Clone)]
pub enum PipelineProgress {
    /// Reading and cleaning the source
    Loading,
    /// Computing per-patient features
    BuildingFeatures,
    /// Running the classifier
    Scoring,
    /// Building risk records
    Assembling,
    /// Run finished with a report
    Complete(Box<RiskReport>),
    /// Run failed
    Error(String),
}

impl From<PipelineStage> for PipelineProgress {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Loading => Self::Loading,
            PipelineStage::BuildingFeatures => Self::BuildingFeatures,
            PipelineStage::Scoring => Self::Scoring,
            PipelineStage::Assembling => Self::Assembling,
        }
    }
}

impl PipelineProgress {
    /// Whether no further updates will follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}

/// Handle to a running pipeline worker.
pub struct PipelineWorkerHandle {
    /// Receiver for progress updates
    pub progress_rx: Receiver<PipelineProgress>,
    _handle: JoinHandle<()>,
}

impl PipelineWorkerHandle {
    /// Try to receive the next progress update (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<PipelineProgress> {
        self.progress_rx.try_recv().ok()
    }

    /// Block until the run finishes.
    ///
    /// # Errors
    /// Returns the worker's error message, or a message if the worker
    /// stopped without reporting.
    pub fn wait(self) -> Result<RiskReport, String> {
        for update in self.progress_rx.iter() {
            match update {
                PipelineProgress::Complete(report) => return Ok(*report),
                PipelineProgress::Error(e) => return Err(e),
                _ => {}
            }
        }
        Err("Pipeline worker exited without a result".to_string())
    }
}

/// Runs pipelines in the background.
pub struct PipelineWorker;

impl PipelineWorker {
    /// Spawn a background run over `source`.
    ///
    /// Returns a handle to receive progress updates.
    pub fn spawn<C, E>(pipeline: Arc<RiskPipeline<C, E>>, source: PathBuf) -> PipelineWorkerHandle
    where
        C: RiskClassifier + 'static,
        E: Explainer + 'static,
    {
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            Self::run_with_progress(&pipeline, &source, &tx);
        });

        PipelineWorkerHandle {
            progress_rx: rx,
            _handle: handle,
        }
    }

    fn run_with_progress<C, E>(
        pipeline: &RiskPipeline<C, E>,
        source: &std::path::Path,
        tx: &Sender<PipelineProgress>,
    ) where
        C: RiskClassifier,
        E: Explainer,
    {
        let result = pipeline.run_path_with_progress(source, |stage| {
            let _ = tx.send(stage.into());
        });

        let update = match result {
            Ok(report) => PipelineProgress::Complete(Box::new(report)),
            Err(e) => {
                tracing::warn!("Pipeline run failed: {}", e);
                PipelineProgress::Error(e.to_string())
            }
        };
        let _ = tx.send(update);
    }
}
