//! Engine configuration loaded from TOML.
//!
//! Every section is optional; missing keys fall back to the built-in
//! defaults, so an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionConfig, InteractionConfig};
use crate::baseline::BaselineConfig;
use crate::confidence::ConfidenceWeights;
use crate::decision::DecisionConfig;
use crate::detectors::DetectorConfig;
use crate::error::{EngineError, Result};
use crate::evaluation::EvaluationConfig;
use crate::governance::GovernanceConfig;
use crate::memory::MemoryPolicy;
use crate::registry::Registry;
use crate::safety::SafetyConfig;

/// Recent-window lengths handed to each detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Days of recent data for change detection (default: 7)
    pub change_days: u32,
    /// Days of recent data for trend detection (default: 14)
    pub trend_days: u32,
    /// Days of recent data for instability detection (default: 14)
    pub instability_days: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            change_days: 7,
            trend_days: 14,
            instability_days: 14,
        }
    }
}

impl WindowConfig {
    pub fn days_for(&self, kind: crate::detectors::InsightKind) -> u32 {
        use crate::detectors::InsightKind;
        match kind {
            InsightKind::Change => self.change_days,
            InsightKind::Trend => self.trend_days,
            InsightKind::Instability => self.instability_days,
        }
    }

    /// Longest detector window
    pub fn longest(&self) -> u32 {
        self.change_days.max(self.trend_days).max(self.instability_days)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub baseline: BaselineConfig,
    pub windows: WindowConfig,
    pub detectors: DetectorConfig,
    pub safety: SafetyConfig,
    pub confidence: ConfidenceWeights,
    pub attribution: AttributionConfig,
    pub interaction: InteractionConfig,
    pub evaluation: EvaluationConfig,
    pub decision: DecisionConfig,
    pub governance: GovernanceConfig,
    pub memory: MemoryPolicy,
    pub registry: Registry,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Reject settings that would make the engine misbehave silently
    pub fn validate(&self) -> Result<()> {
        if self.baseline.window_days == 0 {
            return Err(EngineError::Config(
                "baseline.window_days must be at least 1".to_string(),
            ));
        }
        if self.windows.change_days == 0
            || self.windows.trend_days == 0
            || self.windows.instability_days == 0
        {
            return Err(EngineError::Config(
                "detector windows must be at least 1 day".to_string(),
            ));
        }
        for metric in self.registry.policies.keys() {
            if !self.registry.metrics.contains_key(metric) {
                return Err(EngineError::Config(format!(
                    "policy for unknown metric: {metric}"
                )));
            }
        }
        // Claim language must compile
        self.governance.claim_governor()?;
        Ok(())
    }
}
