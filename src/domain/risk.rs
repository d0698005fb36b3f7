//! Risk record types.
//!
//! Represents the per-patient output of scoring and cohort assembly.

use serde::{Deserialize, Serialize};

/// Risk band for a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score 0-40
    Low,
    /// Score 41-70
    Moderate,
    /// Score 71-100
    High,
}

impl RiskLevel {
    /// Classify an integer risk score.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        if score > 70 {
            Self::High
        } else if score > 40 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - Routine monitoring",
            Self::Moderate => "Moderate risk - Review at next contact",
            Self::High => "High risk - Clinical review advised",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Direction indicator shown next to a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTrend {
    Rising,
    Stable,
    Falling,
}

impl RiskTrend {
    #[must_use]
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Rising => "↑",
            Self::Stable => "→",
            Self::Falling => "↓",
        }
    }
}

impl std::fmt::Display for RiskTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.arrow())
    }
}

/// Which explainer produced the trend/driver fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    /// Fixed values, not backed by any computation
    Placeholder,
    /// Clinical reference-range rules
    RuleBased,
    /// Additive per-feature contributions from the model
    Shap,
}

/// Explainer output for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub trend: RiskTrend,
    pub top_driver: String,
    pub source: ExplanationSource,

    /// Per-feature contributions, largest magnitude first (empty unless computed)
    #[serde(default)]
    pub contributions: Vec<(String, f64)>,
}

/// Presentation-ready risk row for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    /// Patient identifier
    pub patient_id: String,

    /// Risk score as an integer percentage in [0, 100]
    pub risk_score: u8,

    /// Raw class-1 probability from the classifier
    pub probability: f64,

    /// Band for the risk score
    pub risk_level: RiskLevel,

    /// Trend indicator and top driver
    pub explanation: Explanation,
}

impl RiskRecord {
    #[must_use]
    pub fn trend(&self) -> RiskTrend {
        self.explanation.trend
    }

    #[must_use]
    pub fn top_driver(&self) -> &str {
        &self.explanation.top_driver
    }
}

/// Convert a probability into an integer percentage.
///
/// Rounds half away from zero and clamps into [0, 100]. A NaN probability maps
/// to 0; callers validate probabilities before reaching this point.
#[must_use]
pub fn risk_score_from_probability(probability: f64) -> u8 {
    let pct = (probability * 100.0).round();
    if pct.is_nan() {
        return 0;
    }
    pct.clamp(0.0, 100.0) as u8
}
