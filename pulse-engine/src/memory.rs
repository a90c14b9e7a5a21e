//! Per-user causal memory ledger
//!
//! One [`CausalMemory`] exists per (user, driver, metric). Each evaluation
//! either creates it (tentative), reinforces it, marks it mixed, or
//! deprecates it when strong prior belief is contradicted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::confidence::unit;
use crate::evaluation::{EvaluationResult, Verdict};
use crate::registry::DriverType;
use crate::types::{EvaluationId, UserId};

/// Believed effect of a driver on a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDirection {
    Improves,
    Worsens,
    Mixed,
}

impl MemoryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improves => "improves",
            Self::Worsens => "worsens",
            Self::Mixed => "mixed",
        }
    }

    /// Direction implied by a verdict; `None` when the verdict carries no evidence
    pub fn from_verdict(verdict: Verdict) -> Option<Self> {
        match verdict {
            Verdict::Helpful => Some(Self::Improves),
            Verdict::Harmful => Some(Self::Worsens),
            Verdict::NotHelpful | Verdict::Unclear => Some(Self::Mixed),
            Verdict::InsufficientData => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Tentative,
    Confirmed,
    Deprecated,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tentative => "tentative",
            Self::Confirmed => "confirmed",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tentative" => Some(Self::Tentative),
            "confirmed" => Some(Self::Confirmed),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// One evaluation that contributed to a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingEvidence {
    pub evaluation_id: EvaluationId,
    pub direction: MemoryDirection,
    pub effect_size: f64,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalMemory {
    pub user_id: UserId,
    pub driver_type: DriverType,
    pub driver_key: String,
    pub metric_key: String,
    pub direction: MemoryDirection,
    pub avg_effect_size: f64,
    pub confidence: f64,
    pub evidence_count: u32,
    pub status: MemoryStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
    pub supporting_evaluations: Vec<SupportingEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// What an update did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOutcome {
    Created,
    Reinforced,
    /// Reinforced and crossed the confirmation thresholds
    Confirmed,
    MarkedMixed,
    Deprecated,
}

/// Promotion and deprecation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPolicy {
    /// Evidence count for the strict confirmation rule (default: 3)
    pub confirm_min_evidence: u32,
    /// Confidence for the strict confirmation rule (default: 0.7)
    pub confirm_min_confidence: f64,
    /// Evidence count for the early confirmation rule (default: 2)
    pub early_confirm_min_evidence: u32,
    /// Confidence for the early confirmation rule (default: 0.6)
    pub early_confirm_min_confidence: f64,
    /// Evidence a confirmed memory needs before a contradiction deprecates it (default: 3)
    pub deprecate_min_evidence: u32,
    /// Applied to the contradicting confidence when a memory turns mixed (default: 0.7)
    pub mixed_confidence_factor: f64,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            confirm_min_evidence: 3,
            confirm_min_confidence: 0.7,
            early_confirm_min_evidence: 2,
            early_confirm_min_confidence: 0.6,
            deprecate_min_evidence: 3,
            mixed_confidence_factor: 0.7,
        }
    }
}

impl MemoryPolicy {
    fn confirms(&self, memory: &CausalMemory) -> bool {
        memory.direction != MemoryDirection::Mixed
            && ((memory.evidence_count >= self.confirm_min_evidence
                && memory.confidence >= self.confirm_min_confidence)
                || (memory.evidence_count >= self.early_confirm_min_evidence
                    && memory.confidence >= self.early_confirm_min_confidence))
    }
}

/// Driver an evaluation is attributed to
#[derive(Debug, Clone, Copy)]
pub struct DriverRef<'a> {
    pub driver_key: &'a str,
    pub driver_type: DriverType,
}

pub struct CausalMemoryAccumulator {
    policy: MemoryPolicy,
}

impl CausalMemoryAccumulator {
    pub fn new() -> Self {
        Self {
            policy: MemoryPolicy::default(),
        }
    }

    pub fn with_policy(policy: MemoryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }

    /// Fold one evaluation into the existing memory for its driver and metric
    ///
    /// Returns `None` when the verdict carries no directional evidence
    /// (insufficient data); the caller keeps `existing` unchanged.
    pub fn apply(
        &self,
        existing: Option<CausalMemory>,
        driver: DriverRef<'_>,
        evaluation: &EvaluationResult,
        now: DateTime<Utc>,
    ) -> Option<(CausalMemory, MemoryOutcome)> {
        let Some(direction) = MemoryDirection::from_verdict(evaluation.verdict) else {
            debug!(
                user_id = %evaluation.user_id,
                driver_key = driver.driver_key,
                metric_key = %evaluation.metric_key,
                "insufficient data, causal memory unchanged"
            );
            return None;
        };

        let evidence = SupportingEvidence {
            evaluation_id: evaluation.id,
            direction,
            effect_size: evaluation.effect_size,
            confidence: unit(evaluation.confidence),
            recorded_at: now,
        };

        let Some(mut memory) = existing else {
            return Some((
                self.create(driver, evaluation, evidence, now),
                MemoryOutcome::Created,
            ));
        };

        let contradicts = memory.direction != MemoryDirection::Mixed && memory.direction != direction;
        if !contradicts {
            self.accumulate(&mut memory, &evidence, evidence.confidence, now);
            let outcome = if self.policy.confirms(&memory) {
                let promoted = memory.status != MemoryStatus::Confirmed;
                memory.status = MemoryStatus::Confirmed;
                if promoted {
                    info!(
                        user_id = %memory.user_id,
                        driver_key = %memory.driver_key,
                        metric_key = %memory.metric_key,
                        evidence_count = memory.evidence_count,
                        "causal memory confirmed"
                    );
                    MemoryOutcome::Confirmed
                } else {
                    MemoryOutcome::Reinforced
                }
            } else {
                // Mixed beliefs are never confirmed; a deprecated entry restarts as tentative
                let demote = memory.status == MemoryStatus::Deprecated
                    || (memory.status == MemoryStatus::Confirmed
                        && memory.direction == MemoryDirection::Mixed);
                if demote {
                    memory.status = MemoryStatus::Tentative;
                }
                MemoryOutcome::Reinforced
            };
            memory.supporting_evaluations.push(evidence);
            return Some((memory, outcome));
        }

        let strong_prior = memory.status == MemoryStatus::Confirmed
            && memory.evidence_count >= self.policy.deprecate_min_evidence;
        if strong_prior {
            info!(
                user_id = %memory.user_id,
                driver_key = %memory.driver_key,
                metric_key = %memory.metric_key,
                old = memory.direction.as_str(),
                new = direction.as_str(),
                "contradictory evidence, deprecating causal memory"
            );
            memory.status = MemoryStatus::Deprecated;
            memory.deprecation_reason = Some(format!("Contradicted by evaluation {}", evaluation.id));
            memory.direction = direction;
            memory.avg_effect_size = evidence.effect_size;
            memory.confidence = evidence.confidence;
            memory.evidence_count = 1;
            memory.updated_at = now;
            memory.supporting_evaluations.push(evidence);
            return Some((memory, MemoryOutcome::Deprecated));
        }

        info!(
            user_id = %memory.user_id,
            driver_key = %memory.driver_key,
            metric_key = %memory.metric_key,
            "mixed evidence for causal memory"
        );
        let damped = unit(evidence.confidence * self.policy.mixed_confidence_factor);
        self.accumulate(&mut memory, &evidence, damped, now);
        memory.direction = MemoryDirection::Mixed;
        memory.status = MemoryStatus::Tentative;
        memory.supporting_evaluations.push(evidence);
        Some((memory, MemoryOutcome::MarkedMixed))
    }

    fn create(
        &self,
        driver: DriverRef<'_>,
        evaluation: &EvaluationResult,
        evidence: SupportingEvidence,
        now: DateTime<Utc>,
    ) -> CausalMemory {
        info!(
            user_id = %evaluation.user_id,
            driver_key = driver.driver_key,
            metric_key = %evaluation.metric_key,
            direction = evidence.direction.as_str(),
            "new causal memory"
        );
        CausalMemory {
            user_id: evaluation.user_id.clone(),
            driver_type: driver.driver_type,
            driver_key: driver.driver_key.to_string(),
            metric_key: evaluation.metric_key.clone(),
            direction: evidence.direction,
            avg_effect_size: evidence.effect_size,
            confidence: evidence.confidence,
            evidence_count: 1,
            status: MemoryStatus::Tentative,
            first_seen_at: now,
            last_confirmed_at: now,
            supporting_evaluations: vec![evidence],
            deprecation_reason: None,
            updated_at: now,
        }
    }

    /// Evidence-count-weighted running averages
    fn accumulate(
        &self,
        memory: &mut CausalMemory,
        evidence: &SupportingEvidence,
        confidence: f64,
        now: DateTime<Utc>,
    ) {
        let n = f64::from(memory.evidence_count);
        let next = memory.evidence_count + 1;
        memory.avg_effect_size = (memory.avg_effect_size * n + evidence.effect_size) / f64::from(next);
        memory.confidence = unit((memory.confidence * n + confidence) / f64::from(next));
        memory.evidence_count = next;
        memory.last_confirmed_at = now;
        memory.updated_at = now;
    }
}

impl Default for CausalMemoryAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationCalculator, EvaluationInput};
    use crate::registry::MetricDirection;
    use crate::signal::{DailySeries, DateWindow};
    use crate::types::ExperimentId;
    use chrono::{Duration, NaiveDate};

    fn evaluation(verdict: Verdict, effect_size: f64, confidence: f64) -> EvaluationResult {
        let day = |i: i64| NaiveDate::from_ymd_opt(2024, 2, 1).unwrap() + Duration::days(i);
        let series = DailySeries::from_days((-14..14).map(|i| (day(i), 400.0 + (i % 3) as f64)));
        let user = UserId::from("u1");
        let mut result = EvaluationCalculator::new()
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
        result.verdict = verdict;
        result.effect_size = effect_size;
        result.confidence = confidence;
        result
    }

    fn driver() -> DriverRef<'static> {
        DriverRef {
            driver_key: "magnesium_glycinate",
            driver_type: DriverType::Supplement,
        }
    }

    fn fold(acc: &CausalMemoryAccumulator, evals: &[EvaluationResult]) -> (CausalMemory, MemoryOutcome) {
        let mut memory = None;
        let mut last = None;
        for e in evals {
            let (m, outcome) = acc.apply(memory.take(), driver(), e, Utc::now()).unwrap();
            memory = Some(m);
            last = Some(outcome);
        }
        (memory.unwrap(), last.unwrap())
    }

    #[test]
    fn first_evidence_is_tentative() {
        let acc = CausalMemoryAccumulator::new();
        let (memory, outcome) = fold(&acc, &[evaluation(Verdict::Helpful, 0.8, 0.9)]);
        assert_eq!(outcome, MemoryOutcome::Created);
        assert_eq!(memory.status, MemoryStatus::Tentative);
        assert_eq!(memory.direction, MemoryDirection::Improves);
        assert_eq!(memory.evidence_count, 1);
        assert_eq!(memory.driver_type, DriverType::Supplement);
    }

    #[test]
    fn consistent_evidence_confirms_and_averages() {
        let acc = CausalMemoryAccumulator::new();
        let (memory, outcome) = fold(
            &acc,
            &[
                evaluation(Verdict::Helpful, 0.6, 0.6),
                evaluation(Verdict::Helpful, 1.0, 0.8),
            ],
        );
        assert_eq!(outcome, MemoryOutcome::Confirmed);
        assert_eq!(memory.status, MemoryStatus::Confirmed);
        assert!((memory.avg_effect_size - 0.8).abs() < 1e-9);
        assert!((memory.confidence - 0.7).abs() < 1e-9);
        assert_eq!(memory.supporting_evaluations.len(), 2);
    }

    #[test]
    fn weak_contradiction_marks_mixed() {
        let acc = CausalMemoryAccumulator::new();
        let (memory, outcome) = fold(
            &acc,
            &[
                evaluation(Verdict::Helpful, 0.8, 0.8),
                evaluation(Verdict::Harmful, -0.8, 1.0),
            ],
        );
        assert_eq!(outcome, MemoryOutcome::MarkedMixed);
        assert_eq!(memory.direction, MemoryDirection::Mixed);
        assert_eq!(memory.status, MemoryStatus::Tentative);
        // (0.8 + 1.0 * 0.7) / 2
        assert!((memory.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn strong_contradiction_deprecates() {
        let acc = CausalMemoryAccumulator::new();
        let helpful = evaluation(Verdict::Helpful, 0.8, 0.8);
        let harmful = evaluation(Verdict::Harmful, -0.9, 0.7);
        let (memory, outcome) = fold(&acc, &[helpful.clone(), helpful.clone(), helpful, harmful.clone()]);
        assert_eq!(outcome, MemoryOutcome::Deprecated);
        assert_eq!(memory.status, MemoryStatus::Deprecated);
        assert_eq!(memory.direction, MemoryDirection::Worsens);
        assert_eq!(memory.evidence_count, 1);
        assert_eq!(
            memory.deprecation_reason,
            Some(format!("Contradicted by evaluation {}", harmful.id))
        );
    }

    #[test]
    fn insufficient_data_leaves_memory_alone() {
        let acc = CausalMemoryAccumulator::new();
        let update = acc.apply(None, driver(), &evaluation(Verdict::InsufficientData, 0.1, 0.2), Utc::now());
        assert!(update.is_none());
    }

    #[test]
    fn mixed_verdicts_never_confirm() {
        let acc = CausalMemoryAccumulator::new();
        let (memory, _) = fold(
            &acc,
            &[
                evaluation(Verdict::NotHelpful, 0.0, 0.9),
                evaluation(Verdict::Unclear, 0.1, 0.9),
                evaluation(Verdict::NotHelpful, 0.0, 0.9),
            ],
        );
        assert_eq!(memory.direction, MemoryDirection::Mixed);
        assert_eq!(memory.status, MemoryStatus::Tentative);
        assert_eq!(memory.evidence_count, 3);
    }
}
