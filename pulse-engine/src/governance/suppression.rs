//! Insight fatigue control: repeat suppression and a daily cap

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::hierarchy::{ConfidenceLevel, DecisionSignal, SignalOrigin};
use crate::insight::{Insight, InsightStatus};

/// Configuration for insight suppression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Days before the same metric and category may surface again (default: 7)
    pub min_days_between_repeats: u32,
    /// Most insights surfaced per user per run (default: 10)
    pub max_daily_insights: usize,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            min_days_between_repeats: 7,
            max_daily_insights: 10,
        }
    }
}

pub struct InsightSuppressor {
    config: SuppressionConfig,
}

impl InsightSuppressor {
    pub fn new() -> Self {
        Self {
            config: SuppressionConfig::default(),
        }
    }

    pub fn with_config(config: SuppressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SuppressionConfig {
        &self.config
    }

    /// Reason to suppress `candidate`, if an equivalent insight surfaced recently
    ///
    /// Equivalent means same user, metric and category. Insights that were
    /// themselves suppressed do not count, and safety alerts are never
    /// suppressed.
    pub fn should_suppress(
        &self,
        candidate: &Insight,
        recent: &[Insight],
        now: DateTime<Utc>,
    ) -> Option<String> {
        if candidate.is_safety_alert() {
            return None;
        }
        let min_days = i64::from(self.config.min_days_between_repeats);

        recent
            .iter()
            .filter(|i| {
                i.id != candidate.id
                    && i.status != InsightStatus::Suppressed
                    && i.user_id == candidate.user_id
                    && i.metric_key == candidate.metric_key
                    && i.category == candidate.category
            })
            .map(|i| (now - i.generated_at).num_days())
            .filter(|days| (0..min_days).contains(days))
            .min()
            .map(|days| {
                format!(
                    "Duplicate insight for same metric within {days} days (min: {min_days})"
                )
            })
    }

    /// Keep the `max_daily_insights` most confident insights
    ///
    /// Safety alerts are always kept and do not count towards the cap.
    /// Returns `(kept, dropped)`; ties keep their original order.
    pub fn cap_daily(&self, insights: Vec<Insight>) -> (Vec<Insight>, Vec<Insight>) {
        let (alerts, mut regular): (Vec<Insight>, Vec<Insight>) =
            insights.into_iter().partition(Insight::is_safety_alert);

        regular.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let cap = self.config.max_daily_insights.min(regular.len());
        let dropped = regular.split_off(cap);

        let mut kept = alerts;
        kept.extend(regular);
        (kept, dropped)
    }

    /// Suppressed level-1 signal recording why `insight` was withheld
    pub fn suppressed_signal(
        &self,
        insight: &Insight,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DecisionSignal {
        DecisionSignal {
            user_id: insight.user_id.clone(),
            origin: SignalOrigin::Insight,
            source_id: insight.id.to_string(),
            metric_key: insight.metric_key.clone(),
            level: ConfidenceLevel::Observational,
            confidence: 0.0,
            evidence_count: 0,
            allowed_actions: Vec::new(),
            must_use: Vec::new(),
            must_not_use: Vec::new(),
            explanation: None,
            suppressed: true,
            suppression_reason: Some(reason.into()),
            suppression_until: Some(
                now + Duration::days(i64::from(self.config.min_days_between_repeats)),
            ),
            last_confirmed_at: now,
            created_at: now,
        }
    }
}

impl Default for InsightSuppressor {
    fn default() -> Self {
        Self::new()
    }
}
