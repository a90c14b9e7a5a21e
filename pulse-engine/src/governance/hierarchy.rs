//! Confidence hierarchy and governed decision signals
//!
//! | Level | Name           | Basis                                    |
//! |-------|----------------|------------------------------------------|
//! | 1     | observational  | a single metric changed                  |
//! | 2     | correlational  | two signals move together                |
//! | 3     | attributed     | lagged, behavior-linked effect           |
//! | 4     | evaluated      | baseline vs intervention experiment      |
//! | 5     | reconfirmed    | same verdict repeated across evaluations |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::{unit, ConfidenceExplanation};
use crate::error::{EngineError, Result};
use crate::evaluation::EvaluationResult;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Observational,
    Correlational,
    Attributed,
    Evaluated,
    Reconfirmed,
}

impl ConfidenceLevel {
    pub fn from_u8(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Self::Observational),
            2 => Ok(Self::Correlational),
            3 => Ok(Self::Attributed),
            4 => Ok(Self::Evaluated),
            5 => Ok(Self::Reconfirmed),
            other => Err(EngineError::InvalidConfidenceLevel(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Observational => 1,
            Self::Correlational => 2,
            Self::Attributed => 3,
            Self::Evaluated => 4,
            Self::Reconfirmed => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Observational => "observational",
            Self::Correlational => "correlational",
            Self::Attributed => "attributed",
            Self::Evaluated => "evaluated",
            Self::Reconfirmed => "reconfirmed",
        }
    }
}

/// Action a governed signal may drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedAction {
    Monitor,
    SuggestExperiment,
    ContinueProtocol,
}

/// Actions and language constraints of one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelPolicy {
    pub level: ConfidenceLevel,
    pub allowed_actions: Vec<AllowedAction>,
    /// At least one is required from level 2 upwards
    pub must_use: Vec<String>,
    pub must_not_use: Vec<String>,
    pub example_language: String,
}

impl LevelPolicy {
    pub fn allows(&self, action: AllowedAction) -> bool {
        self.allowed_actions.contains(&action)
    }

    /// Whether the level demands one of its `must_use` phrases
    pub fn requires_phrase(&self) -> bool {
        self.level >= ConfidenceLevel::Correlational && !self.must_use.is_empty()
    }
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelPolicies {
    pub observational: LevelPolicy,
    pub correlational: LevelPolicy,
    pub attributed: LevelPolicy,
    pub evaluated: LevelPolicy,
    pub reconfirmed: LevelPolicy,
}

impl LevelPolicies {
    pub fn get(&self, level: ConfidenceLevel) -> &LevelPolicy {
        match level {
            ConfidenceLevel::Observational => &self.observational,
            ConfidenceLevel::Correlational => &self.correlational,
            ConfidenceLevel::Attributed => &self.attributed,
            ConfidenceLevel::Evaluated => &self.evaluated,
            ConfidenceLevel::Reconfirmed => &self.reconfirmed,
        }
    }
}

impl Default for LevelPolicies {
    fn default() -> Self {
        use AllowedAction::*;

        Self {
            observational: LevelPolicy {
                level: ConfidenceLevel::Observational,
                allowed_actions: vec![Monitor],
                must_use: phrases(&["has changed", "shows", "trend"]),
                must_not_use: phrases(&["causes", "proves", "improves", "worsens", "recommend"]),
                example_language: "Sleep duration has declined over 10 days".into(),
            },
            correlational: LevelPolicy {
                level: ConfidenceLevel::Correlational,
                allowed_actions: vec![Monitor],
                must_use: phrases(&["associated with", "correlated with", "co-occurs with"]),
                must_not_use: phrases(&["causes", "proves", "recommend", "prescribe"]),
                example_language: "Late caffeine is associated with worse sleep".into(),
            },
            attributed: LevelPolicy {
                level: ConfidenceLevel::Attributed,
                allowed_actions: vec![Monitor, SuggestExperiment],
                must_use: phrases(&["appears to", "may", "suggests", "worth testing"]),
                must_not_use: phrases(&["causes", "proves", "prescribe", "definitely"]),
                example_language: "On days you take magnesium, sleep appears to improve next day. Worth testing with an experiment.".into(),
            },
            evaluated: LevelPolicy {
                level: ConfidenceLevel::Evaluated,
                allowed_actions: vec![Monitor, SuggestExperiment, ContinueProtocol],
                must_use: phrases(&["improved", "changed", "effect size", "with adherence"]),
                must_not_use: phrases(&["cures", "guarantees", "always works"]),
                example_language: "This protocol improved HRV by 12% with 85% adherence".into(),
            },
            reconfirmed: LevelPolicy {
                level: ConfidenceLevel::Reconfirmed,
                allowed_actions: vec![Monitor, SuggestExperiment, ContinueProtocol],
                must_use: phrases(&["consistently", "repeated", "reliable pattern"]),
                must_not_use: phrases(&["cures", "guarantees", "always works"]),
                example_language: "This effect has occurred 3 times consistently".into(),
            },
        }
    }
}

/// What produced a decision signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    Insight,
    Driver,
    Attribution,
    Evaluation,
}

/// A claim with its governance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSignal {
    pub user_id: UserId,
    pub origin: SignalOrigin,
    /// Identifier of the insight, evaluation or attribution behind the signal
    pub source_id: String,
    pub metric_key: String,
    pub level: ConfidenceLevel,
    pub confidence: f64,
    pub evidence_count: u32,
    pub allowed_actions: Vec<AllowedAction>,
    pub must_use: Vec<String>,
    pub must_not_use: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ConfidenceExplanation>,
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_until: Option<DateTime<Utc>>,
    pub last_confirmed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Configuration for hierarchy classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Earlier evaluations with the same verdict needed for level 5 (default: 2)
    pub reconfirm_min_matches: usize,
    /// Most recent evaluations considered (default: 10)
    pub history_limit: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            reconfirm_min_matches: 2,
            history_limit: 10,
        }
    }
}

/// Places claims on the confidence hierarchy and builds their signals
pub struct SignalClassifier {
    policies: LevelPolicies,
    config: HierarchyConfig,
}

impl SignalClassifier {
    pub fn new() -> Self {
        Self {
            policies: LevelPolicies::default(),
            config: HierarchyConfig::default(),
        }
    }

    pub fn with_config(policies: LevelPolicies, config: HierarchyConfig) -> Self {
        Self { policies, config }
    }

    pub fn policies(&self) -> &LevelPolicies {
        &self.policies
    }

    /// Level of an evaluation given the user's history, most recent first
    ///
    /// Only evaluations of the same user and metric count, and the
    /// evaluation itself is excluded if it is already in `history`.
    pub fn classify_evaluation(
        &self,
        current: &EvaluationResult,
        history: &[EvaluationResult],
    ) -> ConfidenceLevel {
        let matches = history
            .iter()
            .filter(|e| e.user_id == current.user_id && e.metric_key == current.metric_key)
            .take(self.config.history_limit)
            .filter(|e| e.id != current.id && e.verdict == current.verdict)
            .count();

        if matches >= self.config.reconfirm_min_matches {
            ConfidenceLevel::Reconfirmed
        } else {
            ConfidenceLevel::Evaluated
        }
    }

    /// Build an unsuppressed signal carrying the level's constraints
    #[allow(clippy::too_many_arguments)]
    pub fn signal(
        &self,
        user_id: &UserId,
        origin: SignalOrigin,
        source_id: impl Into<String>,
        metric_key: &str,
        level: ConfidenceLevel,
        confidence: f64,
        evidence_count: u32,
        explanation: Option<ConfidenceExplanation>,
    ) -> DecisionSignal {
        let policy = self.policies.get(level);
        let now = Utc::now();
        DecisionSignal {
            user_id: user_id.clone(),
            origin,
            source_id: source_id.into(),
            metric_key: metric_key.to_string(),
            level,
            confidence: unit(confidence),
            evidence_count,
            allowed_actions: policy.allowed_actions.clone(),
            must_use: policy.must_use.clone(),
            must_not_use: policy.must_not_use.clone(),
            explanation,
            suppressed: false,
            suppression_reason: None,
            suppression_until: None,
            last_confirmed_at: now,
            created_at: now,
        }
    }
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationCalculator, EvaluationInput, Verdict};
    use crate::registry::MetricDirection;
    use crate::signal::{DailySeries, DateWindow};
    use crate::types::{EvaluationId, ExperimentId};
    use chrono::{Duration, NaiveDate};

    fn helpful_evaluation() -> EvaluationResult {
        let day = |i: i64| NaiveDate::from_ymd_opt(2024, 2, 1).unwrap() + Duration::days(i);
        let series = DailySeries::from_days(
            (-14..0)
                .map(|i| (day(i), 390.0 + (i.rem_euclid(2) * 20) as f64))
                .chain((0..14).map(|i| (day(i), 440.0 + (i % 2 * 20) as f64))),
        );
        let user = UserId::from("u1");
        let result = EvaluationCalculator::new()
            .evaluate(&EvaluationInput {
                user_id: &user,
                experiment_id: ExperimentId::new(),
                metric_key: "sleep_duration",
                polarity: MetricDirection::HigherIsBetter,
                baseline_window: DateWindow::new(day(-14), day(-1)),
                intervention_window: DateWindow::new(day(0), day(13)),
                series: &series,
                adherence: &[],
            })
            .unwrap();
        assert_eq!(result.verdict, Verdict::Helpful);
        result
    }

    fn again(e: &EvaluationResult) -> EvaluationResult {
        EvaluationResult {
            id: EvaluationId::new(),
            ..e.clone()
        }
    }

    #[test]
    fn third_matching_evaluation_is_reconfirmed() {
        let classifier = SignalClassifier::new();
        let first = helpful_evaluation();
        let second = again(&first);
        let third = again(&first);

        assert_eq!(classifier.classify_evaluation(&first, &[]), ConfidenceLevel::Evaluated);
        assert_eq!(
            classifier.classify_evaluation(&second, &[first.clone()]),
            ConfidenceLevel::Evaluated
        );
        // History may already contain the current record; it is not counted
        let history = vec![third.clone(), second, first];
        assert_eq!(
            classifier.classify_evaluation(&third, &history),
            ConfidenceLevel::Reconfirmed
        );
    }

    #[test]
    fn other_metrics_and_verdicts_do_not_reconfirm() {
        let classifier = SignalClassifier::new();
        let current = helpful_evaluation();
        let mut other_metric = again(&current);
        other_metric.metric_key = "hrv_rmssd".into();
        let mut other_verdict = again(&current);
        other_verdict.verdict = Verdict::NotHelpful;
        assert_eq!(
            classifier.classify_evaluation(&current, &[other_metric, other_verdict, again(&current)]),
            ConfidenceLevel::Evaluated
        );
    }

    #[test]
    fn level_numbers_roundtrip() {
        for n in 1..=5 {
            assert_eq!(ConfidenceLevel::from_u8(n).unwrap().as_u8(), n);
        }
        assert!(matches!(
            ConfidenceLevel::from_u8(6),
            Err(EngineError::InvalidConfidenceLevel(6))
        ));
        assert!(ConfidenceLevel::from_u8(0).is_err());
    }

    #[test]
    fn actions_widen_with_level() {
        let policies = LevelPolicies::default();
        assert!(!policies
            .get(ConfidenceLevel::Observational)
            .allows(AllowedAction::SuggestExperiment));
        assert!(policies
            .get(ConfidenceLevel::Attributed)
            .allows(AllowedAction::SuggestExperiment));
        assert!(policies
            .get(ConfidenceLevel::Evaluated)
            .allows(AllowedAction::ContinueProtocol));
    }

    #[test]
    fn only_level_two_and_up_require_phrases() {
        let policies = LevelPolicies::default();
        assert!(!policies.get(ConfidenceLevel::Observational).requires_phrase());
        assert!(policies.get(ConfidenceLevel::Correlational).requires_phrase());
    }

    #[test]
    fn signal_copies_policy_constraints() {
        let classifier = SignalClassifier::new();
        let signal = classifier.signal(
            &UserId::from("u1"),
            SignalOrigin::Attribution,
            "exp-1",
            "sleep_duration",
            ConfidenceLevel::Attributed,
            1.4,
            1,
            None,
        );
        assert_eq!(signal.confidence, 1.0);
        assert!(!signal.suppressed);
        assert!(signal.must_use.contains(&"worth testing".to_string()));
        assert_eq!(
            signal.allowed_actions,
            vec![AllowedAction::Monitor, AllowedAction::SuggestExperiment]
        );
    }
}
