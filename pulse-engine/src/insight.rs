//! Candidate insight payloads and the factory that builds them.
//!
//! Every insight carries a confidence, the evidence it was built from and,
//! except for safety alerts, the review of its summary by the claim
//! governor. The summary stored on the insight is always the governed text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::{ranked, AttributionResult};
use crate::baseline::Baseline;
use crate::confidence::{unit, ConfidenceExplanation, ConfidenceInputs, ConfidenceScorer};
use crate::detectors::{DetectorResult, InsightKind};
use crate::error::Result;
use crate::evaluation::AttributionSnapshot;
use crate::governance::{
    ClaimGovernor, ClaimStatus, ClaimViolation, ConfidenceLevel, EvidenceGrade, GradeInputs,
    GradeRubric,
};
use crate::safety::{RiskLevel, SafetyAlert};
use crate::types::{ExperimentId, InsightId, UserId};

/// Statement attached to every attribution insight
pub const ASSOCIATION_STATEMENT: &str =
    "Association only. Not medical advice. If you have concerning symptoms, seek medical care.";

/// What kind of finding an insight reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Change,
    Trend,
    Instability,
    SafetyAlert,
    Attribution,
}

impl InsightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Trend => "trend",
            Self::Instability => "instability",
            Self::SafetyAlert => "safety_alert",
            Self::Attribution => "attribution",
        }
    }
}

impl From<InsightKind> for InsightCategory {
    fn from(kind: InsightKind) -> Self {
        match kind {
            InsightKind::Change => Self::Change,
            InsightKind::Trend => Self::Trend,
            InsightKind::Instability => Self::Instability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Detected,
    /// The only signal for its metric in a run
    WeakSignal,
    Suppressed,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::WeakSignal => "weak_signal",
            Self::Suppressed => "suppressed",
        }
    }
}

/// Lags and safety note behind an attribution insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionEvidence {
    pub experiment_id: ExperimentId,
    pub intervention_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<AttributionSnapshot>,
    /// Up to three best-ranked lags
    pub top_lags: Vec<AttributionSnapshot>,
    pub statement: String,
}

/// Structured evidence, serialized only when persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightEvidence {
    Detector {
        result: DetectorResult,
        baseline_mean: f64,
        baseline_std: f64,
    },
    Safety {
        alert: SafetyAlert,
    },
    Attribution(AttributionEvidence),
}

/// How the claim governor treated an insight's summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReview {
    pub grade: EvidenceGrade,
    pub level: ConfidenceLevel,
    pub status: ClaimStatus,
    pub violations: Vec<ClaimViolation>,
}

/// A candidate insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub user_id: UserId,
    pub metric_key: String,
    pub category: InsightCategory,
    pub title: String,
    pub summary: String,
    pub confidence: f64,
    pub coverage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_size: Option<f64>,
    pub evidence: InsightEvidence,
    pub status: InsightStatus,
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ConfidenceExplanation>,
    /// `None` for safety alerts, which bypass claim governance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<ClaimReview>,
    pub generated_at: DateTime<Utc>,
}

impl Insight {
    pub fn is_safety_alert(&self) -> bool {
        self.category == InsightCategory::SafetyAlert
    }
}

/// Builds governed insights from detector, safety and attribution output
pub struct InsightFactory {
    scorer: ConfidenceScorer,
    rubric: GradeRubric,
    governor: ClaimGovernor,
}

impl InsightFactory {
    pub fn new(scorer: ConfidenceScorer, rubric: GradeRubric, governor: ClaimGovernor) -> Self {
        Self {
            scorer,
            rubric,
            governor,
        }
    }

    /// Factory over the built-in weights, rubric and claim policies
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            ConfidenceScorer::new(),
            GradeRubric::default(),
            ClaimGovernor::with_defaults()?,
        ))
    }

    pub fn governor(&self) -> &ClaimGovernor {
        &self.governor
    }

    fn review(
        &self,
        summary: &str,
        inputs: GradeInputs,
        level: ConfidenceLevel,
    ) -> (String, ClaimReview) {
        let grade = self.rubric.grade(&inputs);
        let governed = self.governor.govern(summary, grade, Some(level));
        let review = ClaimReview {
            grade,
            level,
            status: governed.status,
            violations: governed.violations,
        };
        (governed.text, review)
    }

    /// Observational insight for a detector result
    ///
    /// `expected_days` is the detector's window length; consistency is the
    /// share of those days that had data.
    pub fn from_detection(
        &self,
        user_id: &UserId,
        result: &DetectorResult,
        baseline: &Baseline,
        expected_days: u32,
        now: DateTime<Utc>,
    ) -> Insight {
        let metric = result.metric_key();
        let n = result.n_points();
        let expected = expected_days.max(1) as usize;
        let consistency = unit(n as f64 / expected as f64);
        let effect_size = result.effect_size();
        let confidence = self.scorer.score(&ConfidenceInputs {
            sample_days: n,
            expected_days: expected,
            effect_size: Some(effect_size),
            consistency_ratio: consistency,
        });
        let coverage = ConfidenceScorer::coverage(n, expected);

        let dir = result.direction().as_str();
        let strength = result.strength().as_str();
        let (title, summary) = match result {
            DetectorResult::Change(r) => (
                format!("{metric}: {strength} change detected"),
                format!(
                    "Recent average shifted {dir} vs your baseline (z={:.2}).",
                    r.z_score
                ),
            ),
            DetectorResult::Trend(r) => (
                format!("{metric}: {strength} trend {dir}"),
                format!("Metric is trending {dir} over the last {} days.", r.window_days),
            ),
            DetectorResult::Instability(r) => (
                format!("{metric}: variability increased ({strength})"),
                format!(
                    "Day-to-day variability increased vs your baseline (ratio={:.2}x).",
                    r.std_ratio
                ),
            ),
        };

        let (summary, review) = self.review(
            &summary,
            GradeInputs {
                confidence,
                sample_size: n,
                coverage,
                effect_size: Some(effect_size),
                p_value: None,
            },
            ConfidenceLevel::Observational,
        );

        Insight {
            id: InsightId::new(),
            user_id: user_id.clone(),
            metric_key: metric.to_string(),
            category: result.kind().into(),
            title,
            summary,
            confidence,
            coverage,
            effect_size: Some(effect_size),
            evidence: InsightEvidence::Detector {
                result: result.clone(),
                baseline_mean: baseline.mean,
                baseline_std: baseline.std,
            },
            status: InsightStatus::Detected,
            risk: RiskLevel::Low,
            explanation: Some(ConfidenceExplanation::for_insight(
                confidence,
                coverage,
                n,
                expected_days,
                Some(consistency),
            )),
            claim: Some(review),
            generated_at: now,
        }
    }

    /// High-priority alert; confidence is fixed by the gate
    pub fn from_safety_alert(
        &self,
        user_id: &UserId,
        alert: &SafetyAlert,
        now: DateTime<Utc>,
    ) -> Insight {
        Insight {
            id: InsightId::new(),
            user_id: user_id.clone(),
            metric_key: alert.metric_key.clone(),
            category: InsightCategory::SafetyAlert,
            title: alert.title.clone(),
            summary: alert.summary.clone(),
            confidence: unit(alert.confidence),
            coverage: 1.0,
            effect_size: None,
            evidence: InsightEvidence::Safety {
                alert: alert.clone(),
            },
            status: InsightStatus::Detected,
            risk: RiskLevel::High,
            explanation: None,
            claim: None,
            generated_at: now,
        }
    }

    /// Attributed insight summarising the best lag of an experiment
    pub fn from_attributions(
        &self,
        user_id: &UserId,
        experiment_id: ExperimentId,
        intervention_key: &str,
        metric_key: &str,
        results: &[AttributionResult],
        now: DateTime<Utc>,
    ) -> Insight {
        let top: Vec<&AttributionResult> = ranked(results).into_iter().take(3).collect();

        let (title, summary, confidence, coverage, effect_size, explanation, inputs) =
            match top.first() {
                None => (
                    format!("No clear effect detected for {metric_key}"),
                    "Not enough signal to attribute changes to the intervention yet; more data may clarify the picture. Keep collecting data.".to_string(),
                    0.2,
                    0.0,
                    None,
                    None,
                    GradeInputs {
                        confidence: 0.2,
                        ..GradeInputs::default()
                    },
                ),
                Some(best) => {
                    let n = best.details.n_baseline + best.details.n_intervention;
                    let confidence = unit(best.confidence);
                    (
                        format!(
                            "{metric_key} {} after intervention (lag {}d)",
                            best.direction.phrase(),
                            best.lag_days
                        ),
                        "We observed a measurable change in this metric during the intervention period compared to baseline. This may reflect the intervention, but it is an association (not proof of cause).".to_string(),
                        confidence,
                        best.coverage,
                        Some(best.effect_size),
                        Some(ConfidenceExplanation::for_attribution(
                            confidence,
                            best.coverage,
                            best.effect_size,
                            n,
                            best.details.n_intervention as u32,
                            None,
                        )),
                        GradeInputs {
                            confidence,
                            sample_size: n,
                            coverage: best.coverage,
                            effect_size: Some(best.effect_size),
                            p_value: None,
                        },
                    )
                }
            };

        let (summary, review) = self.review(&summary, inputs, ConfidenceLevel::Attributed);
        let snapshots: Vec<AttributionSnapshot> =
            top.iter().map(|r| AttributionSnapshot::of(r)).collect();

        Insight {
            id: InsightId::new(),
            user_id: user_id.clone(),
            metric_key: metric_key.to_string(),
            category: InsightCategory::Attribution,
            title,
            summary,
            confidence,
            coverage,
            effect_size,
            evidence: InsightEvidence::Attribution(AttributionEvidence {
                experiment_id,
                intervention_key: intervention_key.to_string(),
                best: snapshots.first().cloned(),
                top_lags: snapshots,
                statement: ASSOCIATION_STATEMENT.to_string(),
            }),
            status: InsightStatus::Detected,
            risk: RiskLevel::Low,
            explanation,
            claim: Some(review),
            generated_at: now,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::detectors::{ChangeResult, Direction, Strength};

    pub fn change_result(metric: &str) -> DetectorResult {
        DetectorResult::Change(ChangeResult {
            metric_key: metric.to_string(),
            z_score: 2.0,
            recent_mean: 460.0,
            baseline_mean: 400.0,
            baseline_std: 30.0,
            n_points: 7,
            window_days: 7,
            direction: Direction::Up,
            strength: Strength::Moderate,
        })
    }

    /// Detector-backed insight with the given metric, kind and confidence
    pub fn insight(metric: &str, kind: InsightKind, confidence: f64) -> Insight {
        let result = change_result(metric);
        Insight {
            id: InsightId::new(),
            user_id: UserId::from("u1"),
            metric_key: metric.to_string(),
            category: kind.into(),
            title: format!("{metric}: moderate change detected"),
            summary: "Recent average shifted up vs your baseline (z=2.00) (uncertain)".into(),
            confidence,
            coverage: 1.0,
            effect_size: Some(2.0),
            evidence: InsightEvidence::Detector {
                result,
                baseline_mean: 400.0,
                baseline_std: 30.0,
            },
            status: InsightStatus::Detected,
            risk: RiskLevel::Low,
            explanation: None,
            claim: None,
            generated_at: Utc::now(),
        }
    }
}
