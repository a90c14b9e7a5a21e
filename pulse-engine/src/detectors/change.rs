//! Level-shift detection against the personal baseline

use serde::{Deserialize, Serialize};

use super::{DetectionInput, Detector, DetectorResult, Direction, InsightKind, Strength};
use crate::stats;

/// Configuration for the change detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Minimum recent points (default: 5)
    pub min_points: usize,
    /// Baseline std at or below this is treated as unusable (default: 1e-5)
    pub std_epsilon: f64,
    /// |z| at which strength becomes moderate (default: 1.5)
    pub moderate_z: f64,
    /// |z| at which strength becomes strong (default: 2.5)
    pub strong_z: f64,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            min_points: 5,
            std_epsilon: 1e-5,
            moderate_z: 1.5,
            strong_z: 2.5,
        }
    }
}

/// A recent mean that moved away from the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub metric_key: String,
    pub z_score: f64,
    pub recent_mean: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub n_points: usize,
    pub window_days: u32,
    pub direction: Direction,
    pub strength: Strength,
}

/// Z-score detector over the recent window mean
pub struct ChangeDetector {
    config: ChangeConfig,
}

impl ChangeDetector {
    /// Create with default configuration
    pub fn new() -> Self {
        Self {
            config: ChangeConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ChangeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChangeConfig {
        &self.config
    }

    /// Compare the recent mean to the baseline
    pub fn detect_change(
        &self,
        metric_key: &str,
        values: &[f64],
        baseline_mean: f64,
        baseline_std: f64,
        window_days: u32,
        z_threshold: f64,
    ) -> Option<ChangeResult> {
        if values.len() < self.config.min_points {
            return None;
        }
        if baseline_std.is_nan() || baseline_std <= self.config.std_epsilon {
            return None;
        }

        let recent_mean = stats::mean(values);
        let z = (recent_mean - baseline_mean) / baseline_std;
        if !z.is_finite() || z.abs() < z_threshold {
            return None;
        }

        Some(ChangeResult {
            metric_key: metric_key.to_string(),
            z_score: z,
            recent_mean,
            baseline_mean,
            baseline_std,
            n_points: values.len(),
            window_days,
            direction: Direction::from_sign(z),
            strength: Strength::bucket(z.abs(), self.config.moderate_z, self.config.strong_z),
        })
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ChangeDetector {
    fn kind(&self) -> InsightKind {
        InsightKind::Change
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Option<DetectorResult> {
        if !input.policy.allows(InsightKind::Change) {
            return None;
        }
        let z_threshold = input.policy.z_threshold?;
        self.detect_change(
            input.metric_key,
            input.values,
            input.baseline.mean,
            input.baseline.std,
            input.window_days,
            z_threshold,
        )
        .map(DetectorResult::Change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_up_for_shift_of_two_sigma() {
        let detector = ChangeDetector::new();
        let result = detector
            .detect_change("sleep_duration", &[460.0; 7], 400.0, 30.0, 7, 1.5)
            .expect("change should fire");
        assert_eq!(result.direction, Direction::Up);
        assert!((result.z_score - 2.0).abs() < 0.001);
        assert_eq!(result.strength, Strength::Moderate);
        assert_eq!(result.n_points, 7);
    }

    #[test]
    fn strong_from_two_and_a_half_sigma() {
        let detector = ChangeDetector::new();
        let result = detector
            .detect_change("sleep_duration", &[325.0; 7], 400.0, 30.0, 7, 1.5)
            .unwrap();
        assert_eq!(result.direction, Direction::Down);
        assert_eq!(result.strength, Strength::Strong);
    }

    #[test]
    fn below_threshold_is_silent() {
        let detector = ChangeDetector::new();
        assert!(detector
            .detect_change("resting_hr", &[61.0; 7], 60.0, 2.0, 7, 1.3)
            .is_none());
    }

    #[test]
    fn needs_five_points() {
        let detector = ChangeDetector::new();
        assert!(detector
            .detect_change("sleep_duration", &[460.0; 4], 400.0, 30.0, 7, 1.5)
            .is_none());
    }

    #[test]
    fn zero_baseline_std_never_fires() {
        let detector = ChangeDetector::new();
        assert!(detector
            .detect_change("sleep_duration", &[900.0; 7], 400.0, 0.0, 7, 1.5)
            .is_none());
        assert!(detector
            .detect_change("sleep_duration", &[900.0; 7], 400.0, 1e-5, 7, 1.5)
            .is_none());
    }
}
