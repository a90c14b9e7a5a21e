//! Verdicts driven by lagged attribution results

use serde::{Deserialize, Serialize};

use super::{EvaluationConfig, Verdict};
use crate::attribution::{pick_best, AttributionDirection, AttributionResult, InteractionEffect};

/// The attribution a verdict was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    pub metric_key: String,
    pub best_lag_days: u32,
    pub effect_size: f64,
    pub direction: AttributionDirection,
    pub coverage: f64,
    pub confidence: f64,
}

impl AttributionSnapshot {
    pub fn of(result: &AttributionResult) -> Self {
        Self {
            metric_key: result.metric_key.clone(),
            best_lag_days: result.lag_days,
            effect_size: result.effect_size,
            direction: result.direction,
            coverage: result.coverage,
            confidence: result.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionVerdict {
    pub verdict: Verdict,
    pub reason: String,
    pub confidence: f64,
    pub best: Option<AttributionSnapshot>,
}

/// Converts attribution results into a verdict using the evaluation thresholds
pub struct AttributionEvaluator {
    config: EvaluationConfig,
}

impl AttributionEvaluator {
    pub fn new() -> Self {
        Self {
            config: EvaluationConfig::default(),
        }
    }

    pub fn with_config(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, attributions: &[AttributionResult]) -> AttributionVerdict {
        let Some(best) = pick_best(attributions) else {
            return AttributionVerdict {
                verdict: Verdict::InsufficientData,
                reason: "No attribution results available".to_string(),
                confidence: 0.0,
                best: None,
            };
        };

        // Direction already carries metric polarity
        let magnitude = best.effect_size.abs();
        let oriented = match best.direction {
            AttributionDirection::Improved => magnitude,
            AttributionDirection::Worsened => -magnitude,
            AttributionDirection::NoChange => magnitude.min(self.config.negligible_effect / 2.0),
        };

        let verdict = self.config.classify(oriented, best.confidence);
        let reason = match verdict {
            Verdict::Unclear => "Low confidence despite observed effect".to_string(),
            Verdict::Helpful | Verdict::Harmful => format!(
                "Strong {} effect at lag {} days",
                best.direction.as_str(),
                best.lag_days
            ),
            Verdict::InsufficientData => format!("Weak effect at lag {} days", best.lag_days),
            Verdict::NotHelpful => "No meaningful effect detected".to_string(),
        };

        AttributionVerdict {
            verdict,
            reason,
            confidence: best.confidence,
            best: Some(AttributionSnapshot::of(best)),
        }
    }
}

impl Default for AttributionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether confounder interactions materially change the picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionAdjustment {
    /// Set when some confounder makes the intervention look ineffective or harmful
    pub note: Option<String>,
    pub summary: String,
}

/// Report the first confounder whose subgroup delta is below `threshold`
pub fn interaction_adjustment(
    interactions: &[InteractionEffect],
    threshold: f64,
) -> InteractionAdjustment {
    if interactions.is_empty() {
        return InteractionAdjustment {
            note: None,
            summary: "No major interactions detected.".to_string(),
        };
    }

    match interactions.iter().find(|i| i.delta_vs_control < threshold) {
        Some(strong) => {
            let note = format!(
                "Intervention appears ineffective or harmful when {} is present.",
                strong.confounder_key
            );
            InteractionAdjustment {
                summary: note.clone(),
                note: Some(note),
            }
        }
        None => InteractionAdjustment {
            note: None,
            summary: "Effect consistent across confounder states.".to_string(),
        },
    }
}
