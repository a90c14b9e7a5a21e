//! Attribution result types

use serde::{Deserialize, Serialize};

use crate::types::{ExperimentId, UserId};

/// Direction of an attributed effect, oriented so that `Improved` means the
/// metric moved the healthy way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionDirection {
    Improved,
    Worsened,
    NoChange,
}

impl AttributionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improved => "improved",
            Self::Worsened => "worsened",
            Self::NoChange => "no_change",
        }
    }

    /// Phrase used in insight titles
    pub fn phrase(&self) -> &'static str {
        match self {
            Self::Improved => "improved",
            Self::Worsened => "worsened",
            Self::NoChange => "did not materially change",
        }
    }
}

/// Window statistics behind an attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionDetails {
    pub baseline_mean: f64,
    pub intervention_mean: f64,
    pub n_baseline: usize,
    pub n_intervention: usize,
}

/// Effect of the intervention split by a day-level confounder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEffect {
    pub confounder_key: String,
    pub mean_present: f64,
    pub mean_absent: f64,
    /// Standardized difference of confounder-present days against
    /// confounder-absent days, oriented so negative means worse when present
    pub delta_vs_control: f64,
    pub n_present: usize,
    pub n_absent: usize,
}

/// Effect estimate for one (experiment, metric, lag)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub user_id: UserId,
    pub experiment_id: ExperimentId,
    pub intervention_key: String,
    pub metric_key: String,
    pub lag_days: u32,
    /// Raw Cohen's d of the lagged window against the baseline window
    pub effect_size: f64,
    pub direction: AttributionDirection,
    pub confidence: f64,
    pub coverage: f64,
    pub details: AttributionDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionEffect>,
}

impl AttributionResult {
    /// Ranking score used to pick the best lag
    pub fn rank_score(&self) -> f64 {
        self.effect_size.abs() * self.confidence
    }
}

/// The attribution with the highest `|effect_size| * confidence`
///
/// Ties keep the earliest result, so shorter lags win.
pub fn pick_best(results: &[AttributionResult]) -> Option<&AttributionResult> {
    results.iter().fold(None, |best: Option<&AttributionResult>, r| match best {
        Some(b) if b.rank_score() >= r.rank_score() => Some(b),
        _ => Some(r),
    })
}

/// Results ordered by rank score, best first
pub fn ranked(results: &[AttributionResult]) -> Vec<&AttributionResult> {
    let mut out: Vec<&AttributionResult> = results.iter().collect();
    out.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn attribution(lag: u32, d: f64, confidence: f64) -> AttributionResult {
        let direction = if d > 0.2 {
            AttributionDirection::Improved
        } else if d < -0.2 {
            AttributionDirection::Worsened
        } else {
            AttributionDirection::NoChange
        };
        AttributionResult {
            user_id: UserId::from("u1"),
            experiment_id: ExperimentId(uuid::Uuid::nil()),
            intervention_key: "magnesium_glycinate".into(),
            metric_key: "sleep_duration".into(),
            lag_days: lag,
            effect_size: d,
            direction,
            confidence,
            coverage: 1.0,
            details: AttributionDetails {
                baseline_mean: 400.0,
                intervention_mean: 400.0 + d * 30.0,
                n_baseline: 14,
                n_intervention: 14,
            },
            interaction: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::attribution;
    use super::*;

    #[test]
    fn best_maximizes_effect_times_confidence() {
        let results = vec![
            attribution(0, 0.9, 0.3),
            attribution(1, 0.6, 0.8),
            attribution(2, -0.7, 0.5),
        ];
        let best = pick_best(&results).unwrap();
        assert_eq!(best.lag_days, 1);
    }

    #[test]
    fn ties_prefer_shorter_lag() {
        let results = vec![attribution(0, 0.5, 0.5), attribution(1, 0.5, 0.5)];
        assert_eq!(pick_best(&results).unwrap().lag_days, 0);
    }

    #[test]
    fn ranked_is_descending() {
        let results = vec![
            attribution(0, 0.1, 0.9),
            attribution(1, 0.8, 0.9),
            attribution(2, 0.4, 0.9),
        ];
        let lags: Vec<_> = ranked(&results).iter().map(|r| r.lag_days).collect();
        assert_eq!(lags, vec![1, 2, 0]);
    }

    #[test]
    fn empty_has_no_best() {
        assert!(pick_best(&[]).is_none());
    }
}
