//! Scorer: Applies the trained classifier to the feature matrix.
//!
//! The classifier declares the ordered feature names it was trained on. A
//! matrix whose columns are a permutation of that schema is reordered by
//! name; anything else is a `SchemaMismatch`.

use std::borrow::Cow;

use crate::domain::FeatureMatrix;
use crate::ports::{ClassifierError, RiskClassifier};
use crate::{ChronicareError, Result};

/// Service producing one class-1 probability per patient.
pub struct Scorer<C: RiskClassifier> {
    classifier: C,
}

impl<C: RiskClassifier> Scorer<C> {
    /// Create a scorer around a loaded classifier.
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// Bring `features` into the classifier's column order.
    fn align<'a>(&self, features: &'a FeatureMatrix) -> Result<Cow<'a, FeatureMatrix>> {
        let schema = self.classifier.feature_names();
        if features.columns.as_slice() == schema {
            return Ok(Cow::Borrowed(features));
        }

        let reordered = features
            .reorder(schema)
            .map_err(ChronicareError::SchemaMismatch)?;
        tracing::debug!("Reordered feature columns to match classifier schema");
        Ok(Cow::Owned(reordered))
    }

    /// Score every row of `features`.
    ///
    /// Probabilities are returned in input row order.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` if the columns cannot be aligned with the
    /// classifier schema, or `InvalidPrediction` if the classifier returns a
    /// wrong number of values or a value outside [0, 1].
    pub fn score(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let aligned = self.align(features)?;
        if aligned.is_empty() {
            return Ok(Vec::new());
        }

        let probabilities = self
            .classifier
            .predict_proba(&aligned)
            .map_err(|e| match e {
                ClassifierError::FeatureCount { .. } => ChronicareError::SchemaMismatch(e.to_string()),
                ClassifierError::NonFiniteFeature { .. } => {
                    ChronicareError::MalformedInput(e.to_string())
                }
            })?;

        if probabilities.len() != aligned.len() {
            return Err(ChronicareError::InvalidPrediction(format!(
                "expected {} probabilities, got {}",
                aligned.len(),
                probabilities.len()
            )));
        }

        if let Some((i, p)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
        {
            return Err(ChronicareError::InvalidPrediction(format!(
                "probability {p} for row {i} is outside [0, 1]"
            )));
        }

        tracing::info!("Scored {} patients", probabilities.len());
        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PatientFeatureRow, FEATURE_NAMES};

    /// Returns a fixed probability vector regardless of input.
    struct FixedModel {
        names: Vec<String>,
        output: Vec<f64>,
    }

    impl RiskClassifier for FixedModel {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(
            &self,
            _features: &FeatureMatrix,
        ) -> std::result::Result<Vec<f64>, ClassifierError> {
            Ok(self.output.clone())
        }
    }

    /// Probability equals the value of the first schema column divided by 100.
    struct FirstColumnModel {
        names: Vec<String>,
    }

    impl RiskClassifier for FirstColumnModel {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(
            &self,
            features: &FeatureMatrix,
        ) -> std::result::Result<Vec<f64>, ClassifierError> {
            Ok(features.rows.iter().map(|r| r[0] / 100.0).collect())
        }
    }

    fn names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect()
    }

    fn row(id: &str, avg_hr: f64) -> PatientFeatureRow {
        PatientFeatureRow {
            patient_id: id.into(),
            avg_hr,
            max_hr: 90.0,
            avg_sbp: 130.0,
            max_sbp: 140.0,
            std_hr: 2.0,
            std_sbp: 10.0,
            sbp_trend: 0.0,
            reading_count: 3,
        }
    }

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::from_rows(&[row("A", 30.0), row("B", 60.0)])
    }

    #[test]
    fn test_scores_in_row_order() {
        let scorer = Scorer::new(FirstColumnModel { names: names() });
        let p = scorer.score(&matrix()).expect("score");
        assert_eq!(p.len(), 2);
        assert!((p[0] - 0.3).abs() < 1e-12);
        assert!((p[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_permuted_columns_are_reordered() {
        let mut permuted = names();
        permuted.reverse();
        let scorer = Scorer::new(FirstColumnModel { names: permuted });

        // First schema column is now sbp_trend (0.0) for every row.
        let p = scorer.score(&matrix()).expect("score");
        assert_eq!(p, vec![0.0, 0.0]);

        let mut m = matrix();
        m = m.reorder(&{
            let mut n = names();
            n.swap(0, 2);
            n
        })
        .expect("reorder");
        let scorer = Scorer::new(FirstColumnModel { names: names() });
        let p = scorer.score(&m).expect("score");
        assert!((p[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let mut schema = names();
        schema.push("bmi".into());
        let scorer = Scorer::new(FixedModel {
            names: schema,
            output: vec![0.5, 0.5],
        });
        let err = scorer.score(&matrix()).expect_err("mismatch");
        assert!(matches!(err, ChronicareError::SchemaMismatch(_)));
    }

    #[test]
    fn test_extra_column_is_schema_mismatch() {
        let scorer = Scorer::new(FixedModel {
            names: names()[..6].to_vec(),
            output: vec![0.5, 0.5],
        });
        let err = scorer.score(&matrix()).expect_err("mismatch");
        assert!(matches!(err, ChronicareError::SchemaMismatch(_)));
    }

    #[test]
    fn test_wrong_prediction_count() {
        let scorer = Scorer::new(FixedModel {
            names: names(),
            output: vec![0.5],
        });
        let err = scorer.score(&matrix()).expect_err("count");
        assert!(matches!(err, ChronicareError::InvalidPrediction(_)));
    }

    #[test]
    fn test_out_of_range_probability() {
        for bad in [1.2, -0.1, f64::NAN] {
            let scorer = Scorer::new(FixedModel {
                names: names(),
                output: vec![0.5, bad],
            });
            let err = scorer.score(&matrix()).expect_err("range");
            assert!(matches!(err, ChronicareError::InvalidPrediction(_)));
        }
    }

    #[test]
    fn test_empty_matrix_skips_model() {
        let scorer = Scorer::new(FixedModel {
            names: names(),
            output: vec![0.9],
        });
        let p = scorer.score(&FeatureMatrix::from_rows(&[])).expect("score");
        assert!(p.is_empty());
    }
}
