//! Deterministic safety gate.
//!
//! Two independent checks live here:
//!
//! - **Red flags** ([`SafetyGate`]): when every recent value of a metric
//!   breaches its critical threshold, a fixed-confidence alert is produced.
//!   The alert bypasses the confidence pipeline and, by default, suppresses
//!   the regular detectors for that metric in the same pass.
//! - **Intervention checks** ([`InterventionSafety`]): an intervention is
//!   evaluated against the user's safety flags before it may be surfaced.
//!
//! Neither check diagnoses or prescribes; they only block or label.

mod intervention;

pub use intervention::{InterventionSafety, UserSafetyFlags};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::{RedFlagAction, RedFlagRule, RedFlagSeverity, Registry};

/// Risk attached to surfacing something
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

/// What kind of output something is allowed to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Describes what the data shows
    Informational,
    /// Safe, generic options
    Lifestyle,
    /// User-run, tracked, reversible, bounded
    Experiment,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informational => "informational",
            Self::Lifestyle => "lifestyle",
            Self::Experiment => "experiment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "informational" => Some(Self::Informational),
            "lifestyle" => Some(Self::Lifestyle),
            "experiment" => Some(Self::Experiment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyIssueCode {
    UnknownIntervention,
    Contraindication,
    Interaction,
    InvalidBoundary,
    InvalidEvidenceGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyIssue {
    pub code: SafetyIssueCode,
    pub severity: RiskLevel,
    pub message: String,
    /// The user flag or requested value that caused the issue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Outcome of an intervention safety check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub allowed: bool,
    pub risk: RiskLevel,
    pub issues: Vec<SafetyIssue>,
    pub boundary: Boundary,
    pub evidence_grade: crate::governance::EvidenceGrade,
}

/// Configuration for the red-flag gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Confidence attached to every red-flag alert (default: 0.9)
    pub alert_confidence: f64,
    /// How many of the most recent daily values must all breach (default: 5)
    pub recent_points: usize,
    /// Skip regular detectors for a metric that raised an alert (default: true)
    pub suppress_detectors_on_alert: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            alert_confidence: 0.9,
            recent_points: 5,
            suppress_detectors_on_alert: true,
        }
    }
}

/// High-priority health warning raised by a red-flag rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub rule_key: String,
    pub metric_key: String,
    pub title: String,
    pub summary: String,
    pub confidence: f64,
    pub severity: RedFlagSeverity,
    pub action: RedFlagAction,
    pub threshold: f64,
    pub values: Vec<f64>,
}

impl SafetyAlert {
    fn from_rule(rule: &RedFlagRule, confidence: f64, values: Vec<f64>) -> Self {
        Self {
            rule_key: rule.key.clone(),
            metric_key: rule.metric_key.clone(),
            title: "Health warning".to_string(),
            summary: rule.message.clone(),
            confidence,
            severity: rule.severity,
            action: rule.action,
            threshold: rule.threshold,
            values,
        }
    }
}

/// Evaluates red-flag rules over recent values
pub struct SafetyGate {
    registry: Arc<Registry>,
    config: SafetyConfig,
}

impl SafetyGate {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            config: SafetyConfig::default(),
        }
    }

    pub fn with_config(registry: Arc<Registry>, config: SafetyConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Alert if every one of the recent values breaches a rule for the metric
    ///
    /// Only the last `recent_points` values are considered. An empty slice
    /// never triggers.
    pub fn check(&self, metric_key: &str, values: &[f64]) -> Option<SafetyAlert> {
        let skip = values.len().saturating_sub(self.config.recent_points.max(1));
        let recent = &values[skip..];
        if recent.is_empty() {
            return None;
        }

        self.registry
            .red_flags_for(metric_key)
            .filter(|rule| recent.iter().all(|v| rule.breached_by(*v)))
            .min_by_key(|rule| rule.severity)
            .map(|rule| SafetyAlert::from_rule(rule, self.config.alert_confidence, recent.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SafetyGate {
        SafetyGate::new(Arc::new(Registry::default()))
    }

    #[test]
    fn all_low_sleep_triggers_alert() {
        let alert = gate()
            .check("sleep_duration", &[200.0, 210.0, 190.0, 230.0, 220.0])
            .expect("alert expected");
        assert_eq!(alert.title, "Health warning");
        assert!((alert.confidence - 0.9).abs() < 0.001);
        assert_eq!(alert.rule_key, "sleep_very_low");
    }

    #[test]
    fn one_normal_value_prevents_alert() {
        assert!(gate()
            .check("sleep_duration", &[200.0, 210.0, 420.0, 230.0, 220.0])
            .is_none());
    }

    #[test]
    fn only_recent_points_are_considered() {
        // Older normal values fall outside the last five
        let values = [420.0, 430.0, 200.0, 210.0, 190.0, 230.0, 220.0];
        assert!(gate().check("sleep_duration", &values).is_some());
    }

    #[test]
    fn empty_values_never_trigger() {
        assert!(gate().check("resting_hr", &[]).is_none());
    }

    #[test]
    fn metric_without_rules_is_silent() {
        assert!(gate().check("steps", &[0.0; 5]).is_none());
    }

    #[test]
    fn threshold_is_strict() {
        assert!(gate().check("resting_hr", &[100.0; 5]).is_none());
        assert!(gate().check("resting_hr", &[101.0; 5]).is_some());
    }
}
