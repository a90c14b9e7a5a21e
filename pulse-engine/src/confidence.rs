//! Confidence scoring and its user-facing explanation.
//!
//! Confidence is a fixed blend of three components:
//!
//! ```text
//! confidence = 0.4 * coverage + 0.4 * effect_component + 0.2 * consistency
//! coverage         = min(sample_days / expected_days, 1)
//! effect_component = 1 - e^(-|effect_size|)   (0.5 when no effect size)
//! ```
//!
//! Every input is sanitised so the result is always inside `[0, 1]`.

use serde::{Deserialize, Serialize};

/// Weights of the confidence blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Weight of data coverage (default: 0.4)
    pub coverage: f64,
    /// Weight of squashed effect magnitude (default: 0.4)
    pub effect: f64,
    /// Weight of consistency ratio (default: 0.2)
    pub consistency: f64,
    /// Effect component used when no effect size is known (default: 0.5)
    pub unknown_effect: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            coverage: 0.4,
            effect: 0.4,
            consistency: 0.2,
            unknown_effect: 0.5,
        }
    }
}

/// Raw inputs to the confidence blend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInputs {
    pub sample_days: usize,
    pub expected_days: usize,
    pub effect_size: Option<f64>,
    pub consistency_ratio: f64,
}

/// Computes confidence scores
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
        }
    }

    pub fn with_weights(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ConfidenceWeights {
        &self.weights
    }

    /// Share of expected days that have data, in [0, 1]
    pub fn coverage(sample_days: usize, expected_days: usize) -> f64 {
        unit(sample_days as f64 / expected_days.max(1) as f64)
    }

    /// Map an unbounded effect size into [0, 1)
    pub fn effect_component(&self, effect_size: Option<f64>) -> f64 {
        match effect_size {
            Some(e) if e.is_nan() => 0.0,
            Some(e) => unit(1.0 - (-e.abs()).exp()),
            None => unit(self.weights.unknown_effect),
        }
    }

    pub fn score(&self, inputs: &ConfidenceInputs) -> f64 {
        let coverage = Self::coverage(inputs.sample_days, inputs.expected_days);
        let effect = self.effect_component(inputs.effect_size);
        let consistency = unit(inputs.consistency_ratio);

        let blended = self.weights.coverage * coverage
            + self.weights.effect * effect
            + self.weights.consistency * consistency;
        unit(blended)
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub(crate) fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Why a confidence value is what it is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceExplanation {
    pub overall_confidence: f64,
    /// Share of expected data points present
    pub data_coverage: f64,
    pub adherence_rate: Option<f64>,
    pub effect_size: Option<f64>,
    /// Consistency across time windows
    pub consistency: Option<f64>,
    pub confounder_risk: Option<f64>,
    pub sample_size: Option<usize>,
    pub days_of_data: Option<u32>,
}

impl ConfidenceExplanation {
    /// Explanation for an observational insight
    pub fn for_insight(
        confidence: f64,
        data_coverage: f64,
        sample_size: usize,
        days_of_data: u32,
        consistency: Option<f64>,
    ) -> Self {
        Self {
            overall_confidence: confidence,
            data_coverage,
            adherence_rate: None,
            effect_size: None,
            consistency,
            confounder_risk: None,
            sample_size: Some(sample_size),
            days_of_data: Some(days_of_data),
        }
    }

    /// Explanation for a driver attribution
    pub fn for_attribution(
        confidence: f64,
        data_coverage: f64,
        effect_size: f64,
        sample_size: usize,
        days_of_data: u32,
        confounder_risk: Option<f64>,
    ) -> Self {
        Self {
            overall_confidence: confidence,
            data_coverage,
            adherence_rate: None,
            effect_size: Some(effect_size),
            consistency: None,
            confounder_risk,
            sample_size: Some(sample_size),
            days_of_data: Some(days_of_data),
        }
    }

    /// Explanation for an experiment evaluation
    pub fn for_evaluation(
        confidence: f64,
        data_coverage: f64,
        adherence_rate: f64,
        effect_size: f64,
        sample_size: usize,
        days_of_data: u32,
    ) -> Self {
        Self {
            overall_confidence: confidence,
            data_coverage,
            adherence_rate: Some(adherence_rate),
            effect_size: Some(effect_size),
            consistency: None,
            confounder_risk: None,
            sample_size: Some(sample_size),
            days_of_data: Some(days_of_data),
        }
    }

    /// Short sentence-style rendering for display
    pub fn to_human_readable(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(
            if self.data_coverage < 0.5 {
                "Limited data coverage"
            } else if self.data_coverage < 0.8 {
                "Moderate data coverage"
            } else {
                "Good data coverage"
            }
            .to_string(),
        );

        if let Some(n) = self.sample_size.filter(|n| *n > 0) {
            parts.push(format!("based on {n} observations"));
        }
        if let Some(days) = self.days_of_data.filter(|d| *d > 0) {
            parts.push(format!("over {days} days"));
        }

        if let Some(adherence) = self.adherence_rate {
            parts.push(
                if adherence < 0.7 {
                    "with low adherence"
                } else if adherence < 0.9 {
                    "with moderate adherence"
                } else {
                    "with high adherence"
                }
                .to_string(),
            );
        }

        if let Some(consistency) = self.consistency {
            parts.push(
                if consistency < 0.6 {
                    "(inconsistent pattern)"
                } else if consistency < 0.8 {
                    "(moderately consistent)"
                } else {
                    "(highly consistent)"
                }
                .to_string(),
            );
        }

        if self.confounder_risk.is_some_and(|r| r > 0.5) {
            parts.push("(possible confounders present)".to_string());
        }

        format!("{}.", parts.join(". "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_coverage_strong_effect() {
        let scorer = ConfidenceScorer::new();
        let c = scorer.score(&ConfidenceInputs {
            sample_days: 7,
            expected_days: 7,
            effect_size: Some(2.0),
            consistency_ratio: 1.0,
        });
        let expected = 0.4 + 0.4 * (1.0 - (-2.0f64).exp()) + 0.2;
        assert!((c - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_effect_uses_midpoint() {
        let scorer = ConfidenceScorer::new();
        let c = scorer.score(&ConfidenceInputs {
            sample_days: 0,
            expected_days: 14,
            effect_size: None,
            consistency_ratio: 0.0,
        });
        assert!((c - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_expected_days_does_not_divide_by_zero() {
        assert_eq!(ConfidenceScorer::coverage(3, 0), 1.0);
        assert_eq!(ConfidenceScorer::coverage(0, 0), 0.0);
    }

    #[test]
    fn nan_inputs_stay_in_range() {
        let scorer = ConfidenceScorer::new();
        let c = scorer.score(&ConfidenceInputs {
            sample_days: 5,
            expected_days: 7,
            effect_size: Some(f64::NAN),
            consistency_ratio: f64::NAN,
        });
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn human_readable_evaluation() {
        let text = ConfidenceExplanation::for_evaluation(0.7, 0.85, 0.75, 0.6, 28, 28)
            .to_human_readable();
        assert_eq!(
            text,
            "Good data coverage. based on 28 observations. over 28 days. with moderate adherence."
        );
    }

    #[test]
    fn human_readable_flags_confounders() {
        let text = ConfidenceExplanation::for_attribution(0.5, 0.4, 0.3, 9, 14, Some(0.6))
            .to_human_readable();
        assert!(text.starts_with("Limited data coverage"));
        assert!(text.ends_with("(possible confounders present)."));
    }
}
