//! Linear trend detection over the recent window

use serde::{Deserialize, Serialize};

use super::{DetectionInput, Detector, DetectorResult, Direction, InsightKind, Strength};
use crate::stats;

/// Configuration for the trend detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Minimum recent points (default: 7)
    pub min_points: usize,
    /// |slope| at which strength becomes moderate (default: 0.3)
    pub moderate_slope: f64,
    /// |slope| at which strength becomes strong (default: 1.0)
    pub strong_slope: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points: 7,
            moderate_slope: 0.3,
            strong_slope: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric_key: String,
    pub slope_per_day: f64,
    pub n_points: usize,
    pub window_days: u32,
    pub direction: Direction,
    pub strength: Strength,
}

/// OLS slope detector
pub struct TrendDetector {
    config: TrendConfig,
}

impl TrendDetector {
    pub fn new() -> Self {
        Self {
            config: TrendConfig::default(),
        }
    }

    pub fn with_config(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    pub fn detect_trend(
        &self,
        metric_key: &str,
        values: &[f64],
        window_days: u32,
        slope_threshold: f64,
    ) -> Option<TrendResult> {
        if values.len() < self.config.min_points.max(2) {
            return None;
        }

        let slope = stats::ols_slope(values);
        if !slope.is_finite() || slope.abs() < slope_threshold {
            return None;
        }

        Some(TrendResult {
            metric_key: metric_key.to_string(),
            slope_per_day: slope,
            n_points: values.len(),
            window_days,
            direction: Direction::from_sign(slope),
            strength: Strength::bucket(
                slope.abs(),
                self.config.moderate_slope,
                self.config.strong_slope,
            ),
        })
    }
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for TrendDetector {
    fn kind(&self) -> InsightKind {
        InsightKind::Trend
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Option<DetectorResult> {
        if !input.policy.allows(InsightKind::Trend) {
            return None;
        }
        let slope_threshold = input.policy.slope_threshold?;
        self.detect_trend(input.metric_key, input.values, input.window_days, slope_threshold)
            .map(DetectorResult::Trend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn rising_steps_trend() {
        let detector = TrendDetector::new();
        let result = detector
            .detect_trend("steps", &ramp(14, 6000.0, 600.0), 14, 500.0)
            .unwrap();
        assert!((result.slope_per_day - 600.0).abs() < 0.001);
        assert_eq!(result.direction, Direction::Up);
        assert_eq!(result.strength, Strength::Strong);
    }

    #[test]
    fn falling_score_is_moderate() {
        let detector = TrendDetector::new();
        let result = detector
            .detect_trend("energy", &ramp(7, 4.8, -0.5), 14, 0.3)
            .unwrap();
        assert_eq!(result.direction, Direction::Down);
        assert_eq!(result.strength, Strength::Moderate);
    }

    #[test]
    fn needs_seven_points() {
        let detector = TrendDetector::new();
        assert!(detector
            .detect_trend("steps", &ramp(6, 0.0, 1000.0), 14, 500.0)
            .is_none());
    }

    #[test]
    fn flat_series_is_silent() {
        let detector = TrendDetector::new();
        assert!(detector.detect_trend("energy", &[3.0; 10], 14, 0.3).is_none());
    }
}
