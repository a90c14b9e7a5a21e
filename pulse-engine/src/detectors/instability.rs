//! Day-to-day variability relative to the baseline spread

use serde::{Deserialize, Serialize};

use super::{DetectionInput, Detector, DetectorResult, Direction, InsightKind, Strength};
use crate::stats;

/// Configuration for the instability detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstabilityConfig {
    /// Minimum recent points (default: 7)
    pub min_points: usize,
    /// Baseline std at or below this is treated as unusable (default: 1e-5)
    pub std_epsilon: f64,
    /// Ratio at which strength becomes strong, otherwise moderate (default: 2.5)
    pub strong_ratio: f64,
}

impl Default for InstabilityConfig {
    fn default() -> Self {
        Self {
            min_points: 7,
            std_epsilon: 1e-5,
            strong_ratio: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstabilityResult {
    pub metric_key: String,
    pub recent_std: f64,
    pub baseline_std: f64,
    pub std_ratio: f64,
    pub n_points: usize,
    pub window_days: u32,
    /// Always `Up`: variability increased
    pub direction: Direction,
    pub strength: Strength,
}

pub struct InstabilityDetector {
    config: InstabilityConfig,
}

impl InstabilityDetector {
    pub fn new() -> Self {
        Self {
            config: InstabilityConfig::default(),
        }
    }

    pub fn with_config(config: InstabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InstabilityConfig {
        &self.config
    }

    pub fn detect_instability(
        &self,
        metric_key: &str,
        values: &[f64],
        baseline_std: f64,
        window_days: u32,
        ratio_threshold: f64,
    ) -> Option<InstabilityResult> {
        if values.len() < self.config.min_points {
            return None;
        }
        if baseline_std.is_nan() || baseline_std <= self.config.std_epsilon {
            return None;
        }

        let recent_std = stats::population_std(values);
        let ratio = recent_std / baseline_std;
        if !ratio.is_finite() || ratio < ratio_threshold {
            return None;
        }

        let strength = if ratio >= self.config.strong_ratio {
            Strength::Strong
        } else {
            Strength::Moderate
        };

        Some(InstabilityResult {
            metric_key: metric_key.to_string(),
            recent_std,
            baseline_std,
            std_ratio: ratio,
            n_points: values.len(),
            window_days,
            direction: Direction::Up,
            strength,
        })
    }
}

impl Default for InstabilityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for InstabilityDetector {
    fn kind(&self) -> InsightKind {
        InsightKind::Instability
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Option<DetectorResult> {
        if !input.policy.allows(InsightKind::Instability) {
            return None;
        }
        let ratio_threshold = input.policy.ratio_threshold?;
        self.detect_instability(
            input.metric_key,
            input.values,
            input.baseline.std,
            input.window_days,
            ratio_threshold,
        )
        .map(DetectorResult::Instability)
    }
}
