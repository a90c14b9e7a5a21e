//! Lagged effect estimation for a single experiment and metric
//!
//! The baseline window is the `baseline_days` days immediately before the
//! intervention start. For every lag in `0..=max_lag_days` the intervention
//! window `[start, end]` is shifted forward by the lag and compared to the
//! baseline with Cohen's d. Windows with fewer than `min_points` daily
//! values are skipped; nothing is interpolated.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::types::{AttributionDetails, AttributionDirection, AttributionResult};
use crate::confidence::unit;
use crate::registry::MetricDirection;
use crate::signal::{DailySeries, DateWindow};
use crate::stats;
use crate::types::{ExperimentId, UserId};

/// Configuration for lagged attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Days of pre-intervention baseline (default: 14)
    pub baseline_days: u32,
    /// Largest lag tested when the driver registry has no opinion (default: 3)
    pub max_lag_days: u32,
    /// Minimum daily points in the baseline and in each lagged window (default: 5)
    pub min_points: usize,
    /// |d| above which an effect has a direction (default: 0.2)
    pub direction_threshold: f64,
    /// Weight of coverage in attribution confidence (default: 0.4)
    pub coverage_weight: f64,
    /// Weight of min(|d|, 1) in attribution confidence (default: 0.6)
    pub effect_weight: f64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            baseline_days: 14,
            max_lag_days: 3,
            min_points: 5,
            direction_threshold: 0.2,
            coverage_weight: 0.4,
            effect_weight: 0.6,
        }
    }
}

/// What the engine needs to know about one experiment/metric pair
#[derive(Debug, Clone, Copy)]
pub struct LaggedInput<'a> {
    pub user_id: &'a UserId,
    pub experiment_id: ExperimentId,
    pub intervention_key: &'a str,
    pub metric_key: &'a str,
    pub polarity: MetricDirection,
    /// First day of the intervention
    pub start: NaiveDate,
    /// Last day of the intervention (inclusive)
    pub end: NaiveDate,
    /// Overrides `max_lag_days` when set
    pub max_lag_days: Option<u32>,
}

/// Cohen's-d-per-lag attribution engine
pub struct LaggedEffectEngine {
    config: AttributionConfig,
}

impl LaggedEffectEngine {
    pub fn new() -> Self {
        Self {
            config: AttributionConfig::default(),
        }
    }

    pub fn with_config(config: AttributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// `[start - baseline_days, start - 1]`
    pub fn baseline_window(&self, start: NaiveDate) -> DateWindow {
        DateWindow::new(
            start - Duration::days(i64::from(self.config.baseline_days.max(1))),
            start - Duration::days(1),
        )
    }

    /// `[start + lag, end + lag]`
    pub fn lag_window(&self, start: NaiveDate, end: NaiveDate, lag: u32) -> DateWindow {
        DateWindow::new(start, end).shift(i64::from(lag))
    }

    /// Span of days the series must cover for a full run
    pub fn required_window(&self, input: &LaggedInput<'_>) -> DateWindow {
        let max_lag = input.max_lag_days.unwrap_or(self.config.max_lag_days);
        DateWindow::new(
            self.baseline_window(input.start).start,
            input.end + Duration::days(i64::from(max_lag)),
        )
    }

    /// Classify an effect size for a metric of the given polarity
    pub fn classify(&self, effect_size: f64, polarity: MetricDirection) -> AttributionDirection {
        let oriented = effect_size * polarity.polarity();
        if oriented > self.config.direction_threshold {
            AttributionDirection::Improved
        } else if oriented < -self.config.direction_threshold {
            AttributionDirection::Worsened
        } else {
            AttributionDirection::NoChange
        }
    }

    /// Attribution confidence from coverage and effect size
    pub fn confidence(&self, coverage: f64, effect_size: f64) -> f64 {
        let effect = if effect_size.is_finite() {
            effect_size.abs().min(1.0)
        } else {
            0.0
        };
        unit(self.config.coverage_weight * unit(coverage) + self.config.effect_weight * effect)
    }

    /// One result per lag that has enough data; empty when the baseline is too thin
    pub fn run(&self, input: &LaggedInput<'_>, series: &DailySeries) -> Vec<AttributionResult> {
        let baseline = series.values_in(&self.baseline_window(input.start));
        if baseline.len() < self.config.min_points.max(2) || input.end < input.start {
            return Vec::new();
        }

        let window_len = DateWindow::new(input.start, input.end).days();
        let max_lag = input.max_lag_days.unwrap_or(self.config.max_lag_days);

        (0..=max_lag)
            .filter_map(|lag| {
                let lagged = series.values_in(&self.lag_window(input.start, input.end, lag));
                if lagged.len() < self.config.min_points.max(2) {
                    return None;
                }

                let d = stats::cohens_d(&baseline, &lagged);
                let coverage = unit(lagged.len() as f64 / f64::from(window_len));

                Some(AttributionResult {
                    user_id: input.user_id.clone(),
                    experiment_id: input.experiment_id,
                    intervention_key: input.intervention_key.to_string(),
                    metric_key: input.metric_key.to_string(),
                    lag_days: lag,
                    effect_size: d,
                    direction: self.classify(d, input.polarity),
                    confidence: self.confidence(coverage, d),
                    coverage,
                    details: AttributionDetails {
                        baseline_mean: stats::mean(&baseline),
                        intervention_mean: stats::mean(&lagged),
                        n_baseline: baseline.len(),
                        n_intervention: lagged.len(),
                    },
                    interaction: None,
                })
            })
            .collect()
    }
}

impl Default for LaggedEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}
