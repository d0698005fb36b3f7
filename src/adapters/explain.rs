//! Explainer adapters: Placeholder, rule-based and SHAP explanations.
//!
//! All three implement the `Explainer` port; `ExplainerKind` selects one
//! from configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Explanation, ExplanationSource, PatientFeatureRow, RiskTrend};
use crate::ports::{Explainer, RiskClassifier};

/// Display label for a feature column.
#[must_use]
pub fn feature_label(name: &str) -> &str {
    match name {
        "avg_hr" => "Average Heart Rate",
        "max_hr" => "Maximum Heart Rate",
        "avg_sbp" => "Average Systolic BP",
        "max_sbp" => "Peak Systolic BP",
        "std_hr" => "Heart Rate Volatility",
        "std_sbp" => "BP Volatility",
        "sbp_trend" => "Rising BP Trend",
        other => other,
    }
}

/// Which explainer to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainerKind {
    #[default]
    Placeholder,
    RuleBased,
    Shap,
}

impl std::str::FromStr for ExplainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "placeholder" | "none" => Ok(Self::Placeholder),
            "rule_based" | "rules" => Ok(Self::RuleBased),
            "shap" => Ok(Self::Shap),
            other => Err(format!("unknown explainer '{other}'")),
        }
    }
}

impl ExplainerKind {
    /// Instantiate the explainer; SHAP attributions come from `classifier`.
    #[must_use]
    pub fn build(self, classifier: Arc<dyn RiskClassifier>) -> Box<dyn Explainer> {
        match self {
            Self::Placeholder => Box::new(PlaceholderExplainer),
            Self::RuleBased => Box::new(RuleBasedExplainer::default()),
            Self::Shap => Box::new(ShapExplainer::new(classifier)),
        }
    }
}

/// Fixed trend and driver, not backed by computation.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderExplainer;

impl Explainer for PlaceholderExplainer {
    fn explain(&self, _row: &PatientFeatureRow, _probability: f64) -> Explanation {
        Explanation {
            trend: RiskTrend::Stable,
            top_driver: feature_label("std_sbp").to_string(),
            source: ExplanationSource::Placeholder,
            contributions: Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Classify a systolic BP slope (mmHg per reading) into a trend arrow.
#[must_use]
pub fn trend_from_slope(slope: f64, tolerance: f64) -> RiskTrend {
    if slope > tolerance {
        RiskTrend::Rising
    } else if slope < -tolerance {
        RiskTrend::Falling
    } else {
        RiskTrend::Stable
    }
}

/// Explanations from clinical reference ranges.
///
/// The driver is the feature whose value exceeds its reference by the
/// largest relative margin.
#[derive(Debug, Clone)]
pub struct RuleBasedExplainer {
    /// (feature name, reference upper bound)
    references: Vec<(&'static str, f64)>,
    /// Slope magnitude (mmHg per reading) below which the trend is stable
    trend_tolerance: f64,
}

impl Default for RuleBasedExplainer {
    fn default() -> Self {
        Self {
            references: vec![
                ("std_sbp", 10.0),
                ("max_sbp", 140.0),
                ("avg_sbp", 130.0),
                ("max_hr", 100.0),
                ("avg_hr", 90.0),
            ],
            trend_tolerance: 1.0,
        }
    }
}

impl RuleBasedExplainer {
    fn excesses(&self, row: &PatientFeatureRow) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .references
            .iter()
            .filter_map(|(name, reference)| {
                let value = row.get(name)?;
                let excess = (value - reference) / reference;
                (excess > 0.0).then(|| ((*name).to_string(), excess))
            })
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }
}

impl Explainer for RuleBasedExplainer {
    fn explain(&self, row: &PatientFeatureRow, _probability: f64) -> Explanation {
        let excesses = self.excesses(row);
        let top_driver = excesses
            .first()
            .map(|(name, _)| feature_label(name).to_string())
            .unwrap_or_else(|| "Within reference ranges".to_string());

        Explanation {
            trend: trend_from_slope(row.sbp_trend, self.trend_tolerance),
            top_driver,
            source: ExplanationSource::RuleBased,
            contributions: excesses,
        }
    }

    fn name(&self) -> &'static str {
        "rule_based"
    }
}

/// Additive feature attributions from the classifier.
///
/// For a linear-logit model with a standardizing scaler, the contribution
/// `coef_i * (x_i - mean_i) / std_i` is the exact SHAP value of feature `i`
/// in log-odds space (independent features, mean baseline). Models that do
/// not expose contributions fall back to the rule-based explainer.
pub struct ShapExplainer<C: RiskClassifier> {
    classifier: C,
    fallback: RuleBasedExplainer,
    /// Logit contribution of `sbp_trend` below which the trend is stable
    trend_tolerance: f64,
}

impl<C: RiskClassifier> ShapExplainer<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            fallback: RuleBasedExplainer::default(),
            trend_tolerance: 0.05,
        }
    }
}

impl<C: RiskClassifier> Explainer for ShapExplainer<C> {
    fn explain(&self, row: &PatientFeatureRow, probability: f64) -> Explanation {
        let names = self.classifier.feature_names();
        let values: Option<Vec<f64>> = names.iter().map(|n| row.get(n)).collect();

        let contributions = values
            .and_then(|v| self.classifier.contributions(&v))
            .filter(|c| c.len() == names.len());
        let Some(contributions) = contributions else {
            tracing::debug!("Classifier exposes no usable contributions, using rule-based explanation");
            return self.fallback.explain(row, probability);
        };

        let mut ranked: Vec<(String, f64)> = names
            .iter()
            .cloned()
            .zip(contributions.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

        let top_driver = ranked
            .iter()
            .filter(|(_, c)| *c > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| feature_label(name).to_string())
            .unwrap_or_else(|| "No risk-increasing factor".to_string());

        let trend_contribution = names
            .iter()
            .position(|n| n == "sbp_trend")
            .map(|i| contributions[i])
            .unwrap_or(0.0);

        Explanation {
            trend: trend_from_slope(trend_contribution, self.trend_tolerance),
            top_driver,
            source: ExplanationSource::Shap,
            contributions: ranked,
        }
    }

    fn name(&self) -> &'static str {
        "shap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::logistic::{ExportedLogisticModel, LogisticRiskModel};
    use crate::domain::FEATURE_NAMES;

    fn row() -> PatientFeatureRow {
        PatientFeatureRow {
            patient_id: "P1".into(),
            avg_hr: 80.0,
            max_hr: 95.0,
            avg_sbp: 128.0,
            max_sbp: 150.0,
            std_hr: 4.0,
            std_sbp: 22.0,
            sbp_trend: 3.0,
            reading_count: 5,
        }
    }

    fn model(coefficients: Vec<f64>) -> LogisticRiskModel {
        LogisticRiskModel::from_exported(ExportedLogisticModel {
            version: 1,
            feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            coefficients,
            intercept: 0.0,
            scaler_mean: Some(vec![80.0, 100.0, 130.0, 145.0, 8.0, 10.0, 0.0]),
            scaler_std: Some(vec![10.0, 15.0, 15.0, 18.0, 4.0, 5.0, 3.0]),
        })
        .expect("valid model")
    }

    #[test]
    fn test_placeholder_is_marked() {
        let e = PlaceholderExplainer.explain(&row(), 0.9);
        assert_eq!(e.source, ExplanationSource::Placeholder);
        assert_eq!(e.trend, RiskTrend::Stable);
        assert_eq!(e.top_driver, "BP Volatility");
    }

    #[test]
    fn test_rule_based_picks_largest_excess() {
        let e = RuleBasedExplainer::default().explain(&row(), 0.5);
        // std_sbp exceeds 10 by 120%, max_sbp exceeds 140 by ~7%
        assert_eq!(e.top_driver, "BP Volatility");
        assert_eq!(e.trend, RiskTrend::Rising);
        assert_eq!(e.source, ExplanationSource::RuleBased);
        assert_eq!(e.contributions.len(), 2);
    }

    #[test]
    fn test_rule_based_within_ranges() {
        let mut r = row();
        r.std_sbp = 5.0;
        r.max_sbp = 130.0;
        r.sbp_trend = -2.0;
        let e = RuleBasedExplainer::default().explain(&r, 0.1);
        assert_eq!(e.top_driver, "Within reference ranges");
        assert_eq!(e.trend, RiskTrend::Falling);
        assert!(e.contributions.is_empty());
    }

    #[test]
    fn test_trend_from_slope_tolerance() {
        assert_eq!(trend_from_slope(0.5, 1.0), RiskTrend::Stable);
        assert_eq!(trend_from_slope(1.5, 1.0), RiskTrend::Rising);
        assert_eq!(trend_from_slope(-1.5, 1.0), RiskTrend::Falling);
    }

    #[test]
    fn test_shap_driver_is_largest_positive_contribution() {
        let explainer = ShapExplainer::new(model(vec![0.2, 0.3, 0.4, 0.3, 0.2, 1.5, 0.5]));
        let e = explainer.explain(&row(), 0.8);

        assert_eq!(e.source, ExplanationSource::Shap);
        // std_sbp: 1.5 * (22 - 10) / 5 = 3.6 dominates.
        assert_eq!(e.top_driver, "BP Volatility");
        assert_eq!(e.contributions[0].0, "std_sbp");
        assert!((e.contributions[0].1 - 3.6).abs() < 1e-9);
        // sbp_trend: 0.5 * 3 / 3 = 0.5 > tolerance
        assert_eq!(e.trend, RiskTrend::Rising);
    }

    #[test]
    fn test_shap_with_no_positive_contribution() {
        let explainer = ShapExplainer::new(model(vec![0.0; 7]));
        let e = explainer.explain(&row(), 0.5);
        assert_eq!(e.top_driver, "No risk-increasing factor");
        assert_eq!(e.trend, RiskTrend::Stable);
    }

    struct OpaqueModel(Vec<String>);

    impl RiskClassifier for OpaqueModel {
        fn feature_names(&self) -> &[String] {
            &self.0
        }

        fn predict_proba(
            &self,
            features: &crate::domain::FeatureMatrix,
        ) -> Result<Vec<f64>, crate::ports::ClassifierError> {
            Ok(vec![0.5; features.len()])
        }
    }

    #[test]
    fn test_shap_falls_back_without_contributions() {
        let names = FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect();
        let e = ShapExplainer::new(OpaqueModel(names)).explain(&row(), 0.5);
        assert_eq!(e.source, ExplanationSource::RuleBased);
    }

    /// Reports one contribution fewer than it has features.
    struct ShortModel(Vec<String>);

    impl RiskClassifier for ShortModel {
        fn feature_names(&self) -> &[String] {
            &self.0
        }

        fn predict_proba(
            &self,
            features: &crate::domain::FeatureMatrix,
        ) -> Result<Vec<f64>, crate::ports::ClassifierError> {
            Ok(vec![0.5; features.len()])
        }

        fn contributions(&self, values: &[f64]) -> Option<Vec<f64>> {
            Some(vec![1.0; values.len().saturating_sub(1)])
        }
    }

    #[test]
    fn test_shap_falls_back_on_short_contributions() {
        let names = FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect();
        let e = ShapExplainer::new(ShortModel(names)).explain(&row(), 0.5);
        assert_eq!(e.source, ExplanationSource::RuleBased);
    }

    #[test]
    fn test_explainer_kind_parsing() {
        assert_eq!("shap".parse::<ExplainerKind>(), Ok(ExplainerKind::Shap));
        assert_eq!("rule-based".parse::<ExplainerKind>(), Ok(ExplainerKind::RuleBased));
        assert_eq!("None".parse::<ExplainerKind>(), Ok(ExplainerKind::Placeholder));
        assert!("magic".parse::<ExplainerKind>().is_err());
    }

    #[test]
    fn test_explainer_kind_build() {
        let classifier: Arc<dyn RiskClassifier> = Arc::new(model(vec![0.1; 7]));
        assert_eq!(ExplainerKind::Placeholder.build(classifier.clone()).name(), "placeholder");
        assert_eq!(ExplainerKind::RuleBased.build(classifier.clone()).name(), "rule_based");

        let shap = ExplainerKind::Shap.build(classifier);
        assert_eq!(shap.name(), "shap");
        assert_eq!(shap.explain(&row(), 0.5).source, ExplanationSource::Shap);
    }
}
