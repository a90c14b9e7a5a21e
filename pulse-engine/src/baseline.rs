//! Rolling per-user, per-metric baseline.
//!
//! One current [`Baseline`] exists per (user, metric); recomputing replaces
//! it. Too few samples is a typed, recoverable failure rather than a
//! silently degraded statistic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BaselineError, BaselineErrorKind};
use crate::stats;
use crate::types::UserId;

/// Configuration for baseline computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Trailing window in days (default: 30)
    pub window_days: u32,
    /// Minimum daily samples in the window (default: 7)
    pub min_samples: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_samples: 7,
        }
    }
}

/// Snapshot of a metric's typical level and spread for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub user_id: UserId,
    pub metric_key: String,
    pub mean: f64,
    /// Sample standard deviation, never negative
    pub std: f64,
    pub sample_count: usize,
    pub window_days: u32,
    pub computed_at: DateTime<Utc>,
}

impl Baseline {
    /// Whether the spread is large enough to standardize against
    pub fn has_usable_std(&self, epsilon: f64) -> bool {
        self.std > epsilon
    }
}

/// Computes baselines from trailing-window values
pub struct BaselineCalculator {
    config: BaselineConfig,
}

impl BaselineCalculator {
    /// Create with default configuration
    pub fn new() -> Self {
        Self {
            config: BaselineConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: BaselineConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Compute a baseline from the window's daily values
    pub fn compute(
        &self,
        user_id: &UserId,
        metric_key: &str,
        values: &[f64],
    ) -> Result<Baseline, BaselineError> {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let required = self.config.min_samples.max(1);
        if values.len() < required {
            return Err(BaselineError::insufficient_data(
                user_id.as_str(),
                metric_key,
                values.len(),
                required,
            ));
        }

        let mean = stats::mean(&values);
        let std = stats::sample_std(&values).max(0.0);
        if !mean.is_finite() || !std.is_finite() {
            return Err(BaselineError::new(
                BaselineErrorKind::ComputationError,
                format!("non-finite statistics (mean {mean}, std {std})"),
                user_id.as_str(),
                metric_key,
            ));
        }

        Ok(Baseline {
            user_id: user_id.clone(),
            metric_key: metric_key.to_string(),
            mean,
            std,
            sample_count: values.len(),
            window_days: self.config.window_days,
            computed_at: Utc::now(),
        })
    }
}

impl Default for BaselineCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_samples_is_recoverable_insufficient_data() {
        let calc = BaselineCalculator::new();
        let err = calc
            .compute(&UserId::from("u1"), "sleep_duration", &[400.0; 6])
            .unwrap_err();
        assert_eq!(err.kind, BaselineErrorKind::InsufficientData);
        assert!(err.recoverable);
        assert_eq!(err.metric_key, "sleep_duration");
    }

    #[test]
    fn overflowing_values_are_a_computation_error() {
        let calc = BaselineCalculator::new();
        let err = calc
            .compute(&UserId::from("u1"), "steps", &[1e308; 7])
            .unwrap_err();
        assert_eq!(err.kind, BaselineErrorKind::ComputationError);
        assert!(err.recoverable);
    }

    #[test]
    fn single_sample_baseline_has_zero_std() {
        let calc = BaselineCalculator::with_config(BaselineConfig {
            window_days: 30,
            min_samples: 1,
        });
        let baseline = calc.compute(&UserId::from("u1"), "steps", &[8000.0]).unwrap();
        assert_eq!(baseline.std, 0.0);
        assert_eq!(baseline.sample_count, 1);
        assert!(!baseline.has_usable_std(1e-5));
    }

    #[test]
    fn uses_sample_standard_deviation() {
        let calc = BaselineCalculator::new();
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let baseline = calc.compute(&UserId::from("u1"), "energy", &values).unwrap();
        assert!((baseline.mean - 5.0).abs() < 0.001);
        assert!((baseline.std - 2.138).abs() < 0.001);
        assert_eq!(baseline.window_days, 30);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let calc = BaselineCalculator::new();
        let mut values = vec![60.0; 7];
        values.push(f64::NAN);
        let baseline = calc.compute(&UserId::from("u1"), "resting_hr", &values).unwrap();
        assert_eq!(baseline.sample_count, 7);
        assert_eq!(baseline.std, 0.0);
    }
}
