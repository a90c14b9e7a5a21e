//! Next-step decisions for a running experiment.
//!
//! [`DecisionPolicy::decide`] is a pure function of the verdict, its
//! confidence, the best attribution and an optional interaction note. Rules
//! are checked in priority order and the first match wins:
//!
//! 1. interaction note on a helpful verdict: adjust
//! 2. harmful, or a strong confident worsening: stop
//! 3. helpful with enough confidence: continue
//! 4. not helpful: stop
//! 5. insufficient data: extend
//! 6. anything else: adjust

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionDirection;
use crate::evaluation::{AttributionSnapshot, Verdict};
use crate::types::{DecisionId, EvaluationId, ExperimentId, UserId};

pub const DECISION_NOTE: &str = "Conservative decision logic. Not medical advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Continue,
    Stop,
    Adjust,
    Extend,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Stop => "stop",
            Self::Adjust => "adjust",
            Self::Extend => "extend",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    pub verdict: Verdict,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<AttributionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_note: Option<String>,
    pub notes: String,
}

/// Decision payload: action, reason and the inputs behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: String,
    pub metadata: DecisionMetadata,
}

/// A decision as persisted for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    pub user_id: UserId,
    pub experiment_id: ExperimentId,
    /// Absent when the evaluation windows had no data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<EvaluationId>,
    #[serde(flatten)]
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        user_id: UserId,
        experiment_id: ExperimentId,
        evaluation_id: Option<EvaluationId>,
        decision: Decision,
    ) -> Self {
        Self {
            id: DecisionId::new(),
            user_id,
            experiment_id,
            evaluation_id,
            decision,
            created_at: Utc::now(),
        }
    }
}

/// Thresholds used by the decision rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// |effect| of a worsening attribution that stops an experiment (default: 0.5)
    pub stop_effect_size: f64,
    /// Confidence needed for a worsening attribution to stop (default: 0.5)
    pub stop_confidence: f64,
    /// Confidence needed to continue a helpful experiment (default: 0.6)
    pub continue_confidence: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            stop_effect_size: 0.5,
            stop_confidence: 0.5,
            continue_confidence: 0.6,
        }
    }
}

pub struct DecisionPolicy {
    config: DecisionConfig,
}

impl DecisionPolicy {
    pub fn new() -> Self {
        Self {
            config: DecisionConfig::default(),
        }
    }

    pub fn with_config(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn decide(
        &self,
        verdict: Verdict,
        confidence: f64,
        best: Option<&AttributionSnapshot>,
        interaction_note: Option<&str>,
    ) -> Decision {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence };
        let strongly_worsened = best.is_some_and(|b| {
            b.direction == AttributionDirection::Worsened
                && b.effect_size.abs() >= self.config.stop_effect_size
        }) && confidence >= self.config.stop_confidence;

        let (action, reason) = match (verdict, interaction_note) {
            (Verdict::Helpful, Some(note)) => (DecisionAction::Adjust, note.to_string()),
            _ if verdict == Verdict::Harmful || strongly_worsened => (
                DecisionAction::Stop,
                "Evidence suggests this intervention may be worsening the target metric."
                    .to_string(),
            ),
            (Verdict::Helpful, _) if confidence >= self.config.continue_confidence => {
                let reason = match best {
                    Some(b) => format!(
                        "Helpful effect observed (best lag {}d). Continue and monitor.",
                        b.best_lag_days
                    ),
                    None => "Helpful effect observed. Continue and monitor.".to_string(),
                };
                (DecisionAction::Continue, reason)
            }
            (Verdict::NotHelpful, _) => (
                DecisionAction::Stop,
                "No meaningful benefit detected. Stop and consider alternative intervention."
                    .to_string(),
            ),
            (Verdict::InsufficientData, _) => (
                DecisionAction::Extend,
                "Insufficient data coverage/adherence. Extend experiment duration and collect more data."
                    .to_string(),
            ),
            _ => (
                DecisionAction::Adjust,
                "Effect is unclear. Adjust timing/dose or reduce confounders (e.g., caffeine/alcohol) and re-evaluate."
                    .to_string(),
            ),
        };

        Decision {
            action,
            reason,
            metadata: DecisionMetadata {
                verdict,
                confidence,
                attribution: best.cloned(),
                interaction_note: interaction_note.map(str::to_string),
                notes: DECISION_NOTE.to_string(),
            },
        }
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(direction: AttributionDirection, effect_size: f64) -> AttributionSnapshot {
        AttributionSnapshot {
            metric_key: "sleep_duration".into(),
            best_lag_days: 2,
            effect_size,
            direction,
            coverage: 1.0,
            confidence: 0.8,
        }
    }

    #[test]
    fn helpful_and_confident_continues() {
        let best = snapshot(AttributionDirection::Improved, 0.8);
        let d = DecisionPolicy::new().decide(Verdict::Helpful, 0.8, Some(&best), None);
        assert_eq!(d.action, DecisionAction::Continue);
        assert_eq!(d.reason, "Helpful effect observed (best lag 2d). Continue and monitor.");
        assert_eq!(d.metadata.notes, DECISION_NOTE);
        assert_eq!(d.metadata.attribution, Some(best));
    }

    #[test]
    fn interaction_note_takes_priority() {
        let note = "Intervention appears ineffective or harmful when caffeine_pm is present.";
        let d = DecisionPolicy::new().decide(Verdict::Helpful, 0.9, None, Some(note));
        assert_eq!(d.action, DecisionAction::Adjust);
        assert_eq!(d.reason, note);
    }

    #[test]
    fn harmful_or_strong_worsening_stops() {
        let policy = DecisionPolicy::new();
        assert_eq!(
            policy.decide(Verdict::Harmful, 0.1, None, None).action,
            DecisionAction::Stop
        );

        let worse = snapshot(AttributionDirection::Worsened, -0.7);
        let d = policy.decide(Verdict::Unclear, 0.5, Some(&worse), None);
        assert_eq!(d.action, DecisionAction::Stop);
        assert!(d.reason.starts_with("Evidence suggests"));

        // Not confident enough to stop on attribution alone
        let d = policy.decide(Verdict::Unclear, 0.45, Some(&worse), None);
        assert_eq!(d.action, DecisionAction::Adjust);
    }

    #[test]
    fn helpful_with_low_confidence_adjusts() {
        let d = DecisionPolicy::new().decide(Verdict::Helpful, 0.5, None, None);
        assert_eq!(d.action, DecisionAction::Adjust);
        assert!(d.reason.starts_with("Effect is unclear"));
    }

    #[test]
    fn remaining_verdicts() {
        let policy = DecisionPolicy::new();
        assert_eq!(
            policy.decide(Verdict::NotHelpful, 0.9, None, None).action,
            DecisionAction::Stop
        );
        assert_eq!(
            policy.decide(Verdict::InsufficientData, 0.9, None, None).action,
            DecisionAction::Extend
        );
        assert_eq!(
            policy.decide(Verdict::Unclear, 0.9, None, None).action,
            DecisionAction::Adjust
        );
    }

    #[test]
    fn decide_is_deterministic() {
        let policy = DecisionPolicy::new();
        let best = snapshot(AttributionDirection::Improved, 0.6);
        let a = policy.decide(Verdict::Helpful, 0.7, Some(&best), None);
        let b = policy.decide(Verdict::Helpful, 0.7, Some(&best), None);
        assert_eq!(a, b);
    }

    #[test]
    fn record_flattens_decision() {
        let decision = DecisionPolicy::new().decide(Verdict::InsufficientData, 0.3, None, None);
        let record = DecisionRecord::new(
            UserId::from("u1"),
            ExperimentId::new(),
            Some(EvaluationId::new()),
            decision,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["action"], "extend");
        assert_eq!(json["metadata"]["verdict"], "insufficient_data");
    }
}
