//! Statistical detectors for change, trend and instability
//!
//! Detectors are stateless. A failed precondition (too few points, no usable
//! baseline spread, below threshold) yields `None`, never an error.

mod change;
mod instability;
mod trend;

pub use change::{ChangeConfig, ChangeDetector, ChangeResult};
pub use instability::{InstabilityConfig, InstabilityDetector, InstabilityResult};
pub use trend::{TrendConfig, TrendDetector, TrendResult};

use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::registry::MetricPolicy;

/// Kind of observational insight a detector produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Change,
    Trend,
    Instability,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Trend => "trend",
            Self::Instability => "instability",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "change" => Some(Self::Change),
            "trend" => Some(Self::Trend),
            "instability" => Some(Self::Instability),
            _ => None,
        }
    }
}

/// Direction of a detected movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `Up` for strictly positive values, `Down` otherwise
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 { Self::Up } else { Self::Down }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Categorical magnitude of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
}

impl Strength {
    /// Bucket a magnitude: `>= strong` strong, `>= moderate` moderate, else weak
    pub fn bucket(magnitude: f64, moderate: f64, strong: f64) -> Self {
        if magnitude >= strong {
            Self::Strong
        } else if magnitude >= moderate {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

/// Output of any detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorResult {
    Change(ChangeResult),
    Trend(TrendResult),
    Instability(InstabilityResult),
}

impl DetectorResult {
    pub fn kind(&self) -> InsightKind {
        match self {
            Self::Change(_) => InsightKind::Change,
            Self::Trend(_) => InsightKind::Trend,
            Self::Instability(_) => InsightKind::Instability,
        }
    }

    pub fn metric_key(&self) -> &str {
        match self {
            Self::Change(r) => &r.metric_key,
            Self::Trend(r) => &r.metric_key,
            Self::Instability(r) => &r.metric_key,
        }
    }

    pub fn n_points(&self) -> usize {
        match self {
            Self::Change(r) => r.n_points,
            Self::Trend(r) => r.n_points,
            Self::Instability(r) => r.n_points,
        }
    }

    pub fn window_days(&self) -> u32 {
        match self {
            Self::Change(r) => r.window_days,
            Self::Trend(r) => r.window_days,
            Self::Instability(r) => r.window_days,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Change(r) => r.direction,
            Self::Trend(r) => r.direction,
            Self::Instability(r) => r.direction,
        }
    }

    pub fn strength(&self) -> Strength {
        match self {
            Self::Change(r) => r.strength,
            Self::Trend(r) => r.strength,
            Self::Instability(r) => r.strength,
        }
    }

    /// The evidence value expressed as an effect magnitude
    pub fn effect_size(&self) -> f64 {
        match self {
            Self::Change(r) => r.z_score.abs(),
            Self::Trend(r) => r.slope_per_day.abs(),
            Self::Instability(r) => r.std_ratio,
        }
    }
}

/// Everything a detector may look at for one metric
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub metric_key: &'a str,
    /// Daily values of the recent window, oldest first
    pub values: &'a [f64],
    pub baseline: &'a Baseline,
    pub policy: &'a MetricPolicy,
    pub window_days: u32,
}

/// A stateless detector over one metric's recent window
pub trait Detector: Send + Sync {
    /// Insight kind this detector emits
    fn kind(&self) -> InsightKind;

    /// Run detection, returning `None` when nothing qualifies
    fn detect(&self, input: &DetectionInput<'_>) -> Option<DetectorResult>;
}

/// Configuration for the full detector set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub change: ChangeConfig,
    pub trend: TrendConfig,
    pub instability: InstabilityConfig,
}

/// The three standard detectors in evaluation order
pub fn standard_detectors(config: &DetectorConfig) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(ChangeDetector::with_config(config.change.clone())),
        Box::new(TrendDetector::with_config(config.trend.clone())),
        Box::new(InstabilityDetector::with_config(config.instability.clone())),
    ]
}
