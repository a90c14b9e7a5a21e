//! Minimum-trust filter and multi-signal escalation for insights

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::insight::{Insight, InsightStatus};
use crate::safety::RiskLevel;

/// Thresholds an insight must meet to be surfaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    pub min_confidence: f64,
    pub min_coverage: f64,
    pub min_effect_size: f64,
    /// A lone insight for its metric is downgraded to a weak signal
    pub require_multi_signal: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_coverage: 0.5,
            min_effect_size: 0.2,
            require_multi_signal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Policy for metrics without an override
    pub default: GuardrailPolicy,
    pub per_metric: BTreeMap<String, GuardrailPolicy>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        let per_metric = BTreeMap::from([
            (
                "sleep_duration".to_string(),
                GuardrailPolicy {
                    min_coverage: 0.6,
                    ..GuardrailPolicy::default()
                },
            ),
            (
                "resting_hr".to_string(),
                GuardrailPolicy {
                    min_confidence: 0.7,
                    min_effect_size: 0.25,
                    ..GuardrailPolicy::default()
                },
            ),
        ]);
        Self {
            default: GuardrailPolicy::default(),
            per_metric,
        }
    }
}

impl GuardrailConfig {
    pub fn policy_for(&self, metric_key: &str) -> &GuardrailPolicy {
        self.per_metric.get(metric_key).unwrap_or(&self.default)
    }
}

pub struct InsightGuardrails {
    config: GuardrailConfig,
}

impl InsightGuardrails {
    pub fn new() -> Self {
        Self {
            config: GuardrailConfig::default(),
        }
    }

    pub fn with_config(config: GuardrailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Whether one insight clears its metric's thresholds
    pub fn passes(&self, insight: &Insight) -> bool {
        if insight.is_safety_alert() {
            return true;
        }
        let policy = self.config.policy_for(&insight.metric_key);
        let effect = insight.effect_size.map_or(0.0, f64::abs);

        insight.confidence >= policy.min_confidence
            && insight.coverage >= policy.min_coverage
            && effect >= policy.min_effect_size
            && insight.risk != RiskLevel::High
    }

    /// Drop insights below their thresholds; safety alerts always pass
    pub fn filter(&self, insights: Vec<Insight>) -> Vec<Insight> {
        insights.into_iter().filter(|i| self.passes(i)).collect()
    }

    /// Downgrade the only insight of a metric to [`InsightStatus::WeakSignal`]
    pub fn escalate(&self, mut insights: Vec<Insight>) -> Vec<Insight> {
        let mut per_metric: BTreeMap<String, usize> = BTreeMap::new();
        for insight in insights.iter().filter(|i| !i.is_safety_alert()) {
            *per_metric.entry(insight.metric_key.clone()).or_default() += 1;
        }

        for insight in insights.iter_mut().filter(|i| !i.is_safety_alert()) {
            let lone = per_metric.get(&insight.metric_key).copied() == Some(1);
            if lone && self.config.policy_for(&insight.metric_key).require_multi_signal {
                insight.status = InsightStatus::WeakSignal;
            }
        }
        insights
    }
}

impl Default for InsightGuardrails {
    fn default() -> Self {
        Self::new()
    }
}
