//! Confounder interaction analysis
//!
//! Splits a lagged intervention window by whether a day-level confounder
//! (for example `caffeine_pm`) was logged as present or absent, and reports
//! how the confounder-present days compare to the absent ones.

use serde::{Deserialize, Serialize};

use super::types::{AttributionResult, InteractionEffect};
use crate::registry::MetricDirection;
use crate::signal::{BehaviorLog, DailySeries, DateWindow};
use crate::stats;

/// Configuration for interaction analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Minimum days in each subgroup (default: 4)
    pub min_points_per_subset: usize,
    /// Minimum days in the lagged window before splitting (default: 8)
    pub min_total_points: usize,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_points_per_subset: 4,
            min_total_points: 8,
        }
    }
}

pub struct InteractionAnalyzer {
    config: InteractionConfig,
}

impl InteractionAnalyzer {
    pub fn new() -> Self {
        Self {
            config: InteractionConfig::default(),
        }
    }

    pub fn with_config(config: InteractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Compare confounder-present and confounder-absent days in one window
    ///
    /// `delta_vs_control = polarity * (mean_present - mean_absent) / pstdev(all)`,
    /// with a unit divisor when the combined spread is zero.
    pub fn split(
        &self,
        series: &DailySeries,
        window: &DateWindow,
        behaviors: &BehaviorLog,
        confounder_key: &str,
        polarity: MetricDirection,
    ) -> Option<InteractionEffect> {
        let windowed = series.window(window);
        if windowed.len() < self.config.min_total_points {
            return None;
        }

        let mut present = Vec::new();
        let mut absent = Vec::new();
        for (day, value) in windowed.iter() {
            match behaviors.flag(day, confounder_key) {
                Some(true) => present.push(value),
                Some(false) => absent.push(value),
                None => {}
            }
        }

        let min = self.config.min_points_per_subset.max(1);
        if present.len() < min || absent.len() < min {
            return None;
        }

        let mean_present = stats::mean(&present);
        let mean_absent = stats::mean(&absent);
        let combined: Vec<f64> = present.iter().chain(absent.iter()).copied().collect();
        let spread = stats::population_std(&combined);
        let pooled = if spread > 0.0 { spread } else { 1.0 };

        Some(InteractionEffect {
            confounder_key: confounder_key.to_string(),
            mean_present,
            mean_absent,
            delta_vs_control: polarity.polarity() * (mean_present - mean_absent) / pooled,
            n_present: present.len(),
            n_absent: absent.len(),
        })
    }

    /// Annotate each base attribution with the interaction in its lag window
    ///
    /// Attributions whose window cannot be split are dropped.
    pub fn run(
        &self,
        base: &[AttributionResult],
        series: &DailySeries,
        intervention: &DateWindow,
        behaviors: &BehaviorLog,
        confounder_key: &str,
        polarity: MetricDirection,
    ) -> Vec<AttributionResult> {
        base.iter()
            .filter_map(|attr| {
                let window = intervention.shift(i64::from(attr.lag_days));
                let effect = self.split(series, &window, behaviors, confounder_key, polarity)?;
                let mut annotated = attr.clone();
                annotated.interaction = Some(effect);
                Some(annotated)
            })
            .collect()
    }
}

impl Default for InteractionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::types::fixtures::attribution;
    use chrono::{Duration, NaiveDate};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(offset)
    }

    /// Sleep is 60 minutes shorter on caffeine days
    fn caffeine_fixture() -> (DailySeries, BehaviorLog) {
        let mut log = BehaviorLog::new();
        let mut days = Vec::new();
        for i in 0..14 {
            let caffeine = i % 2 == 0;
            log.record(day(i), "caffeine_pm", caffeine);
            days.push((day(i), if caffeine { 380.0 } else { 440.0 }));
        }
        (DailySeries::from_days(days), log)
    }

    #[test]
    fn caffeine_days_are_worse() {
        let (series, log) = caffeine_fixture();
        let window = DateWindow::new(day(0), day(13));
        let effect = InteractionAnalyzer::new()
            .split(&series, &window, &log, "caffeine_pm", MetricDirection::HigherIsBetter)
            .unwrap();
        assert_eq!(effect.n_present, 7);
        assert_eq!(effect.n_absent, 7);
        // pstdev of the combined set is 30, difference is -60
        assert!((effect.delta_vs_control + 2.0).abs() < 1e-9);
    }

    #[test]
    fn lower_is_better_flips_sign() {
        let (series, log) = caffeine_fixture();
        let window = DateWindow::new(day(0), day(13));
        let effect = InteractionAnalyzer::new()
            .split(&series, &window, &log, "caffeine_pm", MetricDirection::LowerIsBetter)
            .unwrap();
        assert!(effect.delta_vs_control > 0.0);
    }

    #[test]
    fn small_subgroup_is_skipped() {
        let mut log = BehaviorLog::new();
        let mut days = Vec::new();
        for i in 0..10 {
            log.record(day(i), "alcohol_evening", i < 3);
            days.push((day(i), 400.0));
        }
        let series = DailySeries::from_days(days);
        let window = DateWindow::new(day(0), day(9));
        assert!(InteractionAnalyzer::new()
            .split(&series, &window, &log, "alcohol_evening", MetricDirection::HigherIsBetter)
            .is_none());
    }

    #[test]
    fn flat_values_use_unit_divisor() {
        let mut log = BehaviorLog::new();
        let mut days = Vec::new();
        for i in 0..10 {
            log.record(day(i), "caffeine_pm", i % 2 == 0);
            days.push((day(i), 400.0));
        }
        let series = DailySeries::from_days(days);
        let effect = InteractionAnalyzer::new()
            .split(
                &series,
                &DateWindow::new(day(0), day(9)),
                &log,
                "caffeine_pm",
                MetricDirection::HigherIsBetter,
            )
            .unwrap();
        assert_eq!(effect.delta_vs_control, 0.0);
    }

    #[test]
    fn run_annotates_base_attributions() {
        let (series, log) = caffeine_fixture();
        let base = vec![attribution(0, 0.8, 0.7), attribution(3, 0.5, 0.6)];
        let out = InteractionAnalyzer::new().run(
            &base,
            &series,
            &DateWindow::new(day(0), day(13)),
            &log,
            "caffeine_pm",
            MetricDirection::HigherIsBetter,
        );
        // lag 3 window [3, 16] has only 11 days with data, still enough
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|a| a.interaction.is_some()));
    }
}
