//! Classifier port: Trait for the trained risk model.
//!
//! The pipeline depends only on "predict class-1 probabilities"; how the
//! model was trained or serialized is an adapter concern.

use crate::domain::FeatureMatrix;

/// Errors a classifier may report while predicting.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("Feature count mismatch: got {got}, expected {expected}")]
    FeatureCount { got: usize, expected: usize },

    #[error("Non-finite feature value in row {row}, column '{column}'")]
    NonFiniteFeature { row: usize, column: String },
}

/// Trait for binary risk classifiers.
pub trait RiskClassifier: Send + Sync {
    /// Ordered feature names the model was trained on (identifier column excluded).
    fn feature_names(&self) -> &[String];

    /// Predict the class-1 probability for every row.
    ///
    /// `features` is guaranteed by the caller to use exactly the columns of
    /// `feature_names()` in that order.
    ///
    /// # Errors
    /// Returns `ClassifierError` if the rows cannot be scored.
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ClassifierError>;

    /// Per-feature additive contributions to the logit, when the model can
    /// provide them. The default is "not supported".
    fn contributions(&self, _row: &[f64]) -> Option<Vec<f64>> {
        None
    }
}

impl<T: RiskClassifier + ?Sized> RiskClassifier for std::sync::Arc<T> {
    fn feature_names(&self) -> &[String] {
        (**self).feature_names()
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ClassifierError> {
        (**self).predict_proba(features)
    }

    fn contributions(&self, row: &[f64]) -> Option<Vec<f64>> {
        (**self).contributions(row)
    }
}
