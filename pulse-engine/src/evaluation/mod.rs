//! Experiment evaluation: baseline vs intervention verdicts.
//!
//! Every evaluation ends in exactly one [`Verdict`]. The same thresholds are
//! applied whether the verdict comes from raw windows
//! ([`EvaluationCalculator`]) or from lagged attributions
//! ([`AttributionEvaluator`]).

mod advanced;
mod attribution;
mod calculator;

pub use advanced::{
    difference_in_differences, interrupted_time_series, window_shift_sensitivity, DidResult,
    ItsResult, SensitivityResult,
};
pub use attribution::{
    interaction_adjustment, AttributionEvaluator, AttributionSnapshot, AttributionVerdict,
    InteractionAdjustment,
};
pub use calculator::{
    EvaluationCalculator, EvaluationDetails, EvaluationInput, EvaluationResult, WindowStats,
};

use serde::{Deserialize, Serialize};

/// Outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Helpful,
    Harmful,
    NotHelpful,
    Unclear,
    InsufficientData,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Harmful => "harmful",
            Self::NotHelpful => "not_helpful",
            Self::Unclear => "unclear",
            Self::InsufficientData => "insufficient_data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "helpful" => Some(Self::Helpful),
            "harmful" => Some(Self::Harmful),
            "not_helpful" => Some(Self::NotHelpful),
            "unclear" => Some(Self::Unclear),
            "insufficient_data" => Some(Self::InsufficientData),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds shared by every verdict path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Days of pre-intervention baseline (default: 14)
    pub baseline_days: u32,
    /// Planned length of the intervention window (default: 14)
    pub intervention_days: u32,
    /// Days per window at which coverage saturates (default: 14)
    pub expected_days: usize,
    /// Minimum daily points in each window for a directional verdict (default: 7)
    pub min_points: usize,
    /// Below this confidence the verdict is always unclear (default: 0.4)
    pub confidence_threshold: f64,
    /// |d| at or above which an effect is helpful or harmful (default: 0.5)
    pub strong_effect: f64,
    /// |d| below which an effect is negligible (default: 0.2)
    pub negligible_effect: f64,
    /// Subgroup delta below which a confounder interaction is reported (default: -0.4)
    pub interaction_threshold: f64,
    /// Largest start shift tried by the sensitivity analysis (default: 3)
    pub sensitivity_shift_days: u32,
    /// Minimum points per shifted window in the sensitivity analysis (default: 5)
    pub sensitivity_min_points: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            baseline_days: 14,
            intervention_days: 14,
            expected_days: 14,
            min_points: 7,
            confidence_threshold: 0.4,
            strong_effect: 0.5,
            negligible_effect: 0.2,
            interaction_threshold: -0.4,
            sensitivity_shift_days: 3,
            sensitivity_min_points: 5,
        }
    }
}

impl EvaluationConfig {
    /// Map an oriented effect size and a confidence to a verdict
    ///
    /// `oriented_effect` is positive when the metric moved the healthy way.
    /// Confidence below the threshold is always unclear.
    pub fn classify(&self, oriented_effect: f64, confidence: f64) -> Verdict {
        let magnitude = if oriented_effect.is_finite() {
            oriented_effect.abs()
        } else {
            0.0
        };

        if confidence.is_nan() || confidence < self.confidence_threshold {
            Verdict::Unclear
        } else if magnitude >= self.strong_effect {
            if oriented_effect > 0.0 {
                Verdict::Helpful
            } else {
                Verdict::Harmful
            }
        } else if magnitude < self.negligible_effect {
            Verdict::NotHelpful
        } else {
            Verdict::InsufficientData
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_is_always_unclear() {
        let config = EvaluationConfig::default();
        assert_eq!(config.classify(2.0, 0.39), Verdict::Unclear);
        assert_eq!(config.classify(0.0, 0.1), Verdict::Unclear);
        assert_eq!(config.classify(1.0, f64::NAN), Verdict::Unclear);
    }

    #[test]
    fn strong_effects_pick_a_side() {
        let config = EvaluationConfig::default();
        assert_eq!(config.classify(0.5, 0.4), Verdict::Helpful);
        assert_eq!(config.classify(-0.8, 0.9), Verdict::Harmful);
    }

    #[test]
    fn weak_and_negligible_effects() {
        let config = EvaluationConfig::default();
        assert_eq!(config.classify(0.3, 0.9), Verdict::InsufficientData);
        assert_eq!(config.classify(-0.1, 0.9), Verdict::NotHelpful);
        assert_eq!(config.classify(f64::NAN, 0.9), Verdict::NotHelpful);
    }

    #[test]
    fn verdict_labels_roundtrip() {
        for v in [
            Verdict::Helpful,
            Verdict::Harmful,
            Verdict::NotHelpful,
            Verdict::Unclear,
            Verdict::InsufficientData,
        ] {
            assert_eq!(Verdict::parse(v.as_str()), Some(v));
        }
        assert_eq!(
            serde_json::to_string(&Verdict::NotHelpful).unwrap(),
            "\"not_helpful\""
        );
    }
}
