//! Baseline-vs-intervention evaluation of one experiment metric

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::advanced::{
    difference_in_differences, interrupted_time_series, window_shift_sensitivity, DidResult,
    ItsResult, SensitivityResult,
};
use super::{EvaluationConfig, Verdict};
use crate::confidence::{unit, ConfidenceExplanation};
use crate::error::{EngineError, Result};
use crate::experiment::AdherenceEvent;
use crate::registry::MetricDirection;
use crate::signal::{DailySeries, DateWindow};
use crate::stats;
use crate::types::{EvaluationId, ExperimentId, UserId};

/// Daily-value statistics of one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub n: usize,
    pub coverage: f64,
    pub mean: f64,
    /// Population standard deviation, 0 below two values
    pub std: f64,
}

impl WindowStats {
    fn from_values(values: &[f64], expected_days: u32) -> Self {
        let std = if values.len() >= 2 {
            stats::population_std(values)
        } else {
            0.0
        };
        Self {
            n: values.len(),
            coverage: unit(values.len() as f64 / f64::from(expected_days.max(1))),
            mean: stats::mean(values),
            std,
        }
    }
}

/// Structured details persisted with an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDetails {
    pub baseline_window: DateWindow,
    pub intervention_window: DateWindow,
    pub pre: WindowStats,
    pub post: WindowStats,
    /// Cohen's d oriented so positive is an improvement
    pub oriented_effect: f64,
    pub reasons: Vec<String>,
    pub did: DidResult,
    pub its: ItsResult,
    pub sensitivity: SensitivityResult,
    pub explanation: ConfidenceExplanation,
}

/// Immutable outcome of one evaluation; re-evaluating creates a new record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: EvaluationId,
    pub user_id: UserId,
    pub experiment_id: ExperimentId,
    pub metric_key: String,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub intervention_mean: f64,
    pub intervention_std: f64,
    pub delta: f64,
    pub percent_change: f64,
    pub effect_size: f64,
    pub coverage: f64,
    pub adherence_rate: f64,
    pub verdict: Verdict,
    pub confidence: f64,
    pub summary: String,
    pub details: EvaluationDetails,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to evaluate one experiment metric
///
/// `series` should span the windows plus the sensitivity shift on either side
/// (see [`EvaluationCalculator::required_window`]).
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub user_id: &'a UserId,
    pub experiment_id: ExperimentId,
    pub metric_key: &'a str,
    pub polarity: MetricDirection,
    pub baseline_window: DateWindow,
    pub intervention_window: DateWindow,
    pub series: &'a DailySeries,
    pub adherence: &'a [AdherenceEvent],
}

pub struct EvaluationCalculator {
    config: EvaluationConfig,
}

impl EvaluationCalculator {
    pub fn new() -> Self {
        Self {
            config: EvaluationConfig::default(),
        }
    }

    pub fn with_config(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Baseline `[start - baseline_days, start - 1]` and intervention
    /// `[start, min(start + intervention_days - 1, end, today)]`
    pub fn windows(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> (DateWindow, DateWindow) {
        let baseline = DateWindow::new(
            start - Duration::days(i64::from(self.config.baseline_days.max(1))),
            start - Duration::days(1),
        );
        let planned = start + Duration::days(i64::from(self.config.intervention_days.max(1)) - 1);
        let last = end.map_or(planned, |e| e.min(planned)).min(today);
        (baseline, DateWindow::new(start, last))
    }

    /// Span of days an evaluation reads, including sensitivity shifts
    pub fn required_window(&self, baseline: &DateWindow, intervention: &DateWindow) -> DateWindow {
        let shift = Duration::days(i64::from(self.config.sensitivity_shift_days));
        DateWindow::new(baseline.start - shift, intervention.end + shift)
    }

    /// Coverage confidence: mean of per-window counts capped at `expected_days`
    pub fn confidence(&self, n_baseline: usize, n_intervention: usize) -> f64 {
        let expected = self.config.expected_days.max(1);
        let covered = n_baseline.min(expected) + n_intervention.min(expected);
        unit(covered as f64 / (2 * expected) as f64)
    }

    /// Share of adherence events in the intervention window marked taken
    ///
    /// `None` when no events were logged in the window.
    pub fn adherence_rate(events: &[AdherenceEvent], window: &DateWindow) -> Option<f64> {
        let (start, end) = window.bounds();
        let in_window: Vec<&AdherenceEvent> = events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .collect();
        if in_window.is_empty() {
            return None;
        }
        let taken = in_window.iter().filter(|e| e.taken).count();
        Some(unit(taken as f64 / in_window.len() as f64))
    }

    pub fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<EvaluationResult> {
        let pre_values = input.series.values_in(&input.baseline_window);
        let post_values = input.series.values_in(&input.intervention_window);
        if pre_values.is_empty() || post_values.is_empty() {
            return Err(EngineError::NotEnoughData(format!(
                "{}: {} baseline days and {} intervention days",
                input.metric_key,
                pre_values.len(),
                post_values.len()
            )));
        }

        let pre = WindowStats::from_values(&pre_values, self.config.baseline_days);
        let post = WindowStats::from_values(&post_values, self.config.intervention_days);

        let delta = post.mean - pre.mean;
        let percent_change = if pre.mean.abs() > 1e-9 {
            delta / pre.mean * 100.0
        } else {
            0.0
        };
        let effect_size = stats::cohens_d(&pre_values, &post_values);
        let oriented_effect = effect_size * input.polarity.polarity();
        let confidence = self.confidence(pre.n, post.n);

        let mut reasons = Vec::new();
        let mut verdict = self.config.classify(oriented_effect, confidence);
        match verdict {
            Verdict::Unclear => reasons.push("low_confidence".to_string()),
            _ if pre.n < self.config.min_points || post.n < self.config.min_points => {
                verdict = Verdict::InsufficientData;
                reasons.push("not_enough_points".to_string());
            }
            Verdict::Helpful => {
                reasons.push("effect_size_meaningful".to_string());
                reasons.push("direction_matches_expected".to_string());
            }
            Verdict::Harmful => {
                reasons.push("effect_size_meaningful".to_string());
                reasons.push("direction_opposes_expected".to_string());
            }
            Verdict::NotHelpful => reasons.push("effect_negligible".to_string()),
            Verdict::InsufficientData => reasons.push("effect_too_small_or_noisy".to_string()),
        }

        let adherence = Self::adherence_rate(input.adherence, &input.intervention_window);
        if adherence.is_none() {
            reasons.push("no_adherence_events_logged".to_string());
        }
        let adherence_rate = adherence.unwrap_or(0.0);

        let coverage = pre.coverage.min(post.coverage);
        let summary = summarize(
            input.metric_key,
            verdict,
            percent_change,
            effect_size,
            adherence,
        );

        let details = EvaluationDetails {
            baseline_window: input.baseline_window,
            intervention_window: input.intervention_window,
            pre,
            post,
            oriented_effect,
            reasons,
            did: difference_in_differences(&pre_values, &post_values),
            its: interrupted_time_series(&pre_values, &post_values),
            sensitivity: window_shift_sensitivity(
                input.series,
                &input.baseline_window,
                &input.intervention_window,
                self.config.sensitivity_shift_days,
                self.config.sensitivity_min_points,
            ),
            explanation: ConfidenceExplanation::for_evaluation(
                confidence,
                coverage,
                adherence_rate,
                effect_size,
                pre.n + post.n,
                input.baseline_window.days() + input.intervention_window.days(),
            ),
        };

        Ok(EvaluationResult {
            id: EvaluationId::new(),
            user_id: input.user_id.clone(),
            experiment_id: input.experiment_id,
            metric_key: input.metric_key.to_string(),
            baseline_mean: pre.mean,
            baseline_std: pre.std,
            intervention_mean: post.mean,
            intervention_std: post.std,
            delta,
            percent_change,
            effect_size,
            coverage,
            adherence_rate,
            verdict,
            confidence,
            summary,
            details,
            created_at: Utc::now(),
        })
    }
}

impl Default for EvaluationCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(
    metric_key: &str,
    verdict: Verdict,
    percent_change: f64,
    effect_size: f64,
    adherence: Option<f64>,
) -> String {
    let finding = match verdict {
        Verdict::Helpful => format!(
            "Intervention showed {:.1}% change in expected direction (effect size: {effect_size:.2})",
            percent_change.abs()
        ),
        Verdict::Harmful => format!(
            "Intervention showed {:.1}% change in the unfavourable direction (effect size: {effect_size:.2})",
            percent_change.abs()
        ),
        Verdict::NotHelpful => {
            format!("No meaningful change detected (effect size: {effect_size:.2})")
        }
        Verdict::Unclear => format!("Effect size too small or noisy (effect size: {effect_size:.2})"),
        Verdict::InsufficientData => "Insufficient data for evaluation".to_string(),
    };
    let adherence = match adherence {
        Some(rate) if rate > 0.0 => format!("Adherence: {:.0}%", rate * 100.0),
        Some(_) => "Adherence: 0%".to_string(),
        None => "No adherence events logged".to_string(),
    };
    format!("Metric: {metric_key}. {finding}. {adherence}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() + Duration::days(offset)
    }

    fn input<'a>(
        user: &'a UserId,
        series: &'a DailySeries,
        adherence: &'a [AdherenceEvent],
        polarity: MetricDirection,
    ) -> EvaluationInput<'a> {
        EvaluationInput {
            user_id: user,
            experiment_id: ExperimentId(uuid::Uuid::nil()),
            metric_key: "sleep_duration",
            polarity,
            baseline_window: DateWindow::new(day(-14), day(-1)),
            intervention_window: DateWindow::new(day(0), day(13)),
            series,
            adherence,
        }
    }

    fn step(before: [f64; 2], after: [f64; 2]) -> DailySeries {
        DailySeries::from_days(
            (-17..0)
                .map(|i| (day(i), before[(i.rem_euclid(2)) as usize]))
                .chain((0..17).map(|i| (day(i), after[(i % 2) as usize]))),
        )
    }

    fn taken(offset: i64, taken: bool) -> AdherenceEvent {
        AdherenceEvent {
            experiment_id: ExperimentId(uuid::Uuid::nil()),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap() + Duration::days(offset),
            taken,
            notes: None,
        }
    }

    #[test]
    fn flat_metric_is_not_helpful() {
        let user = UserId::from("u1");
        let series = DailySeries::from_days((-10..10).map(|i| (day(i), 100.0)));
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &[], MetricDirection::HigherIsBetter))
            .unwrap();
        assert_eq!(result.effect_size, 0.0);
        assert_eq!(result.verdict, Verdict::NotHelpful);
        assert!((result.confidence - 20.0 / 28.0).abs() < 1e-9);
        assert!(result.details.reasons.contains(&"no_adherence_events_logged".to_string()));
        assert!(result.summary.ends_with("No adherence events logged"));
    }

    #[test]
    fn improvement_is_helpful() {
        let user = UserId::from("u1");
        let series = step([390.0, 410.0], [440.0, 460.0]);
        let events = [taken(0, true), taken(1, true), taken(2, false), taken(3, true)];
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &events, MetricDirection::HigherIsBetter))
            .unwrap();
        assert_eq!(result.verdict, Verdict::Helpful);
        assert!((result.delta - 50.0).abs() < 1e-9);
        assert!((result.percent_change - 12.5).abs() < 1e-9);
        assert!((result.adherence_rate - 0.75).abs() < 1e-9);
        assert!((result.confidence - 1.0).abs() < 1e-9);
        assert!(result.summary.contains("12.5% change in expected direction"));
        assert!(result.summary.ends_with("Adherence: 75%"));
        assert!(result.details.sensitivity.stable);
    }

    #[test]
    fn rise_in_lower_is_better_metric_is_harmful() {
        let user = UserId::from("u1");
        let series = step([58.0, 62.0], [68.0, 72.0]);
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &[], MetricDirection::LowerIsBetter))
            .unwrap();
        assert_eq!(result.verdict, Verdict::Harmful);
        assert!(result.effect_size > 0.0);
        assert!(result.details.oriented_effect < 0.0);
    }

    #[test]
    fn empty_window_is_an_error() {
        let user = UserId::from("u1");
        let series = DailySeries::from_days((0..10).map(|i| (day(i), 100.0)));
        let err = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &[], MetricDirection::HigherIsBetter))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotEnoughData(_)));
    }

    #[test]
    fn sparse_windows_are_unclear_or_insufficient() {
        let user = UserId::from("u1");
        // Six days each side: confidence 12/28 passes the gate, points do not
        let series = DailySeries::from_days(
            (-6..0)
                .map(|i| (day(i), 400.0 + (i % 2) as f64 * 10.0))
                .chain((0..6).map(|i| (day(i), 480.0 + (i % 2) as f64 * 10.0))),
        );
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &[], MetricDirection::HigherIsBetter))
            .unwrap();
        assert_eq!(result.verdict, Verdict::InsufficientData);
        assert!(result.details.reasons.contains(&"not_enough_points".to_string()));

        let thin = DailySeries::from_days((-2..2).map(|i| (day(i), 400.0 + i as f64)));
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &thin, &[], MetricDirection::HigherIsBetter))
            .unwrap();
        assert_eq!(result.verdict, Verdict::Unclear);
    }

    #[test]
    fn zero_baseline_mean_has_zero_percent_change() {
        let user = UserId::from("u1");
        let series = step([-1.0, 1.0], [4.0, 6.0]);
        let result = EvaluationCalculator::new()
            .evaluate(&input(&user, &series, &[], MetricDirection::Neutral))
            .unwrap();
        assert_eq!(result.percent_change, 0.0);
    }

    #[test]
    fn windows_respect_end_and_today() {
        let calc = EvaluationCalculator::new();
        let (baseline, intervention) = calc.windows(day(0), None, day(30));
        assert_eq!(baseline, DateWindow::new(day(-14), day(-1)));
        assert_eq!(intervention, DateWindow::new(day(0), day(13)));

        let (_, ended) = calc.windows(day(0), Some(day(5)), day(30));
        assert_eq!(ended.end, day(5));

        let (_, running) = calc.windows(day(0), None, day(9));
        assert_eq!(running.end, day(9));
    }

    #[test]
    fn adherence_ignores_events_outside_window() {
        let events = [taken(-3, false), taken(0, true), taken(20, false)];
        let rate =
            EvaluationCalculator::adherence_rate(&events, &DateWindow::new(day(0), day(13)));
        assert_eq!(rate, Some(1.0));
        assert_eq!(
            EvaluationCalculator::adherence_rate(&[], &DateWindow::new(day(0), day(13))),
            None
        );
    }
}
