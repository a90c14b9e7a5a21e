//! Immutable registries of metrics, detection policies, red flags, drivers
//! and interventions.
//!
//! A [`Registry`] is loaded once (built-in defaults or the `[registry]`
//! section of the engine config) and shared behind an `Arc`. Lookups for
//! unknown keys fail explicitly.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::detectors::InsightKind;
use crate::error::{EngineError, Result};
use crate::governance::EvidenceGrade;
use crate::safety::RiskLevel;

/// Which way a metric should move to count as an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
    /// No inherent polarity; raw effect direction is reported as-is
    Neutral,
}

impl MetricDirection {
    /// Sign that turns a raw effect into an "improvement" effect
    pub fn polarity(&self) -> f64 {
        match self {
            Self::HigherIsBetter | Self::Neutral => 1.0,
            Self::LowerIsBetter => -1.0,
        }
    }
}

/// Definition of a tracked metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub key: String,
    pub unit: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub direction: MetricDirection,
    #[serde(default)]
    pub description: String,
}

impl MetricSpec {
    fn new(
        key: &str,
        unit: &str,
        min: f64,
        max: f64,
        direction: MetricDirection,
        description: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            unit: unit.to_string(),
            min_value: Some(min),
            max_value: Some(max),
            direction,
            description: description.to_string(),
        }
    }

    /// Whether a value lies inside the physiologically valid range
    pub fn is_in_range(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.min_value.is_none_or(|min| value >= min) && self.max_value.is_none_or(|max| value <= max)
    }
}

/// Per-metric detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPolicy {
    pub metric_key: String,
    pub allowed_insights: BTreeSet<InsightKind>,
    pub z_threshold: Option<f64>,
    pub slope_threshold: Option<f64>,
    pub ratio_threshold: Option<f64>,
}

impl MetricPolicy {
    fn new(metric_key: &str) -> Self {
        Self {
            metric_key: metric_key.to_string(),
            allowed_insights: BTreeSet::new(),
            z_threshold: None,
            slope_threshold: None,
            ratio_threshold: None,
        }
    }

    fn change(mut self, z: f64) -> Self {
        self.allowed_insights.insert(InsightKind::Change);
        self.z_threshold = Some(z);
        self
    }

    fn trend(mut self, slope: f64) -> Self {
        self.allowed_insights.insert(InsightKind::Trend);
        self.slope_threshold = Some(slope);
        self
    }

    fn instability(mut self, ratio: f64) -> Self {
        self.allowed_insights.insert(InsightKind::Instability);
        self.ratio_threshold = Some(ratio);
        self
    }

    /// Whether the detector for `kind` should run for this metric
    pub fn allows(&self, kind: InsightKind) -> bool {
        let has_threshold = match kind {
            InsightKind::Change => self.z_threshold.is_some(),
            InsightKind::Trend => self.slope_threshold.is_some(),
            InsightKind::Instability => self.ratio_threshold.is_some(),
        };
        has_threshold && self.allowed_insights.contains(&kind)
    }
}

/// Comparison applied by a red-flag rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagCondition {
    Below,
    Above,
}

/// How urgently a triggered red flag should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagSeverity {
    Urgent,
    High,
    Medium,
}

/// Recommended follow-up for a triggered red flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagAction {
    SeekCareNow,
    ContactDoctor,
    Monitor,
}

/// Critical threshold for a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlagRule {
    pub key: String,
    pub metric_key: String,
    pub condition: RedFlagCondition,
    pub threshold: f64,
    pub message: String,
    pub severity: RedFlagSeverity,
    pub action: RedFlagAction,
}

impl RedFlagRule {
    /// Whether a single value breaches the threshold
    pub fn breached_by(&self, value: f64) -> bool {
        match self.condition {
            RedFlagCondition::Below => value < self.threshold,
            RedFlagCondition::Above => value > self.threshold,
        }
    }
}

/// Category of a driver (behavior, supplement, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverType {
    Behavior,
    Supplement,
    Sleep,
    Exercise,
    Intervention,
    LabMarker,
}

impl DriverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Behavior => "behavior",
            Self::Supplement => "supplement",
            Self::Sleep => "sleep",
            Self::Exercise => "exercise",
            Self::Intervention => "intervention",
            Self::LabMarker => "lab_marker",
        }
    }

    /// Guess a driver type from a free-form driver key
    pub fn infer(driver_key: &str) -> Self {
        let key = driver_key.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| key.contains(w));
        if has(&["vitamin", "supplement", "magnesium", "melatonin", "omega"]) {
            Self::Supplement
        } else if has(&["sleep", "bedtime", "wake"]) {
            Self::Sleep
        } else if has(&["exercise", "workout", "run", "gym"]) {
            Self::Exercise
        } else {
            Self::Behavior
        }
    }
}

/// Expected effect of a driver on its outcome metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedEffect {
    Positive,
    Negative,
}

/// Something that may influence outcome metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSpec {
    pub driver_key: String,
    pub driver_type: DriverType,
    pub outcome_metrics: Vec<String>,
    pub expected_effect: Option<ExpectedEffect>,
    pub max_lag_days: u32,
    pub min_data_days: u32,
}

impl DriverSpec {
    fn new(
        key: &str,
        driver_type: DriverType,
        outcomes: &[&str],
        expected_effect: Option<ExpectedEffect>,
        max_lag_days: u32,
        min_data_days: u32,
    ) -> Self {
        Self {
            driver_key: key.to_string(),
            driver_type,
            outcome_metrics: outcomes.iter().map(|s| s.to_string()).collect(),
            expected_effect,
            max_lag_days,
            min_data_days,
        }
    }
}

/// Safety and evidence metadata for an intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionSpec {
    pub key: String,
    pub display_name: String,
    pub default_risk: RiskLevel,
    pub evidence_grade: EvidenceGrade,
    /// User flags that make the intervention unsafe
    pub contraindications: Vec<String>,
    /// User flags (usually medications) that interact with the intervention
    pub interactions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl InterventionSpec {
    fn new(
        key: &str,
        display_name: &str,
        default_risk: RiskLevel,
        evidence_grade: EvidenceGrade,
        contraindications: &[&str],
        interactions: &[&str],
        notes: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            default_risk,
            evidence_grade,
            contraindications: contraindications.iter().map(|s| s.to_string()).collect(),
            interactions: interactions.iter().map(|s| s.to_string()).collect(),
            notes: Some(notes.to_string()),
        }
    }
}

/// All static domain knowledge the engine consults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
    pub metrics: BTreeMap<String, MetricSpec>,
    pub policies: BTreeMap<String, MetricPolicy>,
    pub red_flags: Vec<RedFlagRule>,
    pub drivers: BTreeMap<String, DriverSpec>,
    pub interventions: BTreeMap<String, InterventionSpec>,
}

impl Registry {
    /// Registry with no entries
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
            policies: BTreeMap::new(),
            red_flags: Vec::new(),
            drivers: BTreeMap::new(),
            interventions: BTreeMap::new(),
        }
    }

    pub fn get_metric_spec(&self, metric_key: &str) -> Result<&MetricSpec> {
        self.metrics
            .get(metric_key)
            .ok_or_else(|| EngineError::UnknownMetric(metric_key.to_string()))
    }

    pub fn get_policy(&self, metric_key: &str) -> Result<&MetricPolicy> {
        self.policies
            .get(metric_key)
            .ok_or_else(|| EngineError::NoPolicy(metric_key.to_string()))
    }

    pub fn get_driver(&self, driver_key: &str) -> Option<&DriverSpec> {
        self.drivers.get(driver_key)
    }

    pub fn get_intervention(&self, key: &str) -> Option<&InterventionSpec> {
        self.interventions.get(key)
    }

    /// Red-flag rules that apply to a metric
    pub fn red_flags_for<'a>(&'a self, metric_key: &'a str) -> impl Iterator<Item = &'a RedFlagRule> {
        self.red_flags
            .iter()
            .filter(move |rule| rule.metric_key == metric_key)
    }

    /// Drivers registered as able to influence `metric_key`
    pub fn drivers_for_outcome(&self, metric_key: &str) -> Vec<&DriverSpec> {
        self.drivers
            .values()
            .filter(|d| d.outcome_metrics.iter().any(|m| m == metric_key))
            .collect()
    }

    /// Metric keys in stable order
    pub fn metric_keys(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        use MetricDirection::*;

        let metrics = [
            MetricSpec::new("sleep_duration", "minutes", 0.0, 1000.0, HigherIsBetter, "Total sleep duration"),
            MetricSpec::new("sleep_efficiency", "percent", 0.0, 100.0, HigherIsBetter, "Sleep efficiency %"),
            MetricSpec::new("resting_hr", "bpm", 20.0, 200.0, LowerIsBetter, "Resting heart rate"),
            MetricSpec::new("hrv_rmssd", "ms", 0.0, 300.0, HigherIsBetter, "HRV RMSSD"),
            MetricSpec::new("steps", "count", 0.0, 100_000.0, HigherIsBetter, "Daily steps"),
            MetricSpec::new("sleep_quality", "score_1_5", 1.0, 5.0, HigherIsBetter, "Self-reported sleep quality"),
            MetricSpec::new("energy", "score_1_5", 1.0, 5.0, HigherIsBetter, "Self-reported energy"),
            MetricSpec::new("stress", "score_1_5", 1.0, 5.0, LowerIsBetter, "Self-reported stress"),
        ];

        let policies = [
            MetricPolicy::new("sleep_duration").change(1.5).trend(15.0).instability(1.8),
            MetricPolicy::new("sleep_efficiency").change(1.2).trend(1.0),
            MetricPolicy::new("resting_hr").change(1.3).trend(0.8),
            MetricPolicy::new("hrv_rmssd").change(1.5).trend(1.0).instability(2.0),
            MetricPolicy::new("steps").trend(500.0),
            MetricPolicy::new("sleep_quality").trend(0.3).instability(2.0),
            MetricPolicy::new("energy").trend(0.3).instability(2.0),
            MetricPolicy::new("stress").trend(0.3).instability(2.0),
        ];

        let red_flags = vec![
            RedFlagRule {
                key: "sleep_very_low".into(),
                metric_key: "sleep_duration".into(),
                condition: RedFlagCondition::Below,
                threshold: 240.0,
                message: "Very low sleep detected for multiple days. Consider seeking medical advice."
                    .into(),
                severity: RedFlagSeverity::High,
                action: RedFlagAction::ContactDoctor,
            },
            RedFlagRule {
                key: "resting_hr_high".into(),
                metric_key: "resting_hr".into(),
                condition: RedFlagCondition::Above,
                threshold: 100.0,
                message: "Persistently elevated resting heart rate detected.".into(),
                severity: RedFlagSeverity::Urgent,
                action: RedFlagAction::SeekCareNow,
            },
            RedFlagRule {
                key: "hrv_very_low".into(),
                metric_key: "hrv_rmssd".into(),
                condition: RedFlagCondition::Below,
                threshold: 20.0,
                message: "Very low HRV detected over multiple days.".into(),
                severity: RedFlagSeverity::Medium,
                action: RedFlagAction::Monitor,
            },
        ];

        use DriverType::{Behavior, Intervention, LabMarker, Supplement};
        use ExpectedEffect::{Negative, Positive};
        let drivers = [
            DriverSpec::new(
                "alcohol_evening",
                Behavior,
                &["sleep_duration", "sleep_efficiency", "sleep_quality", "hrv_rmssd"],
                Some(Negative),
                2,
                10,
            ),
            DriverSpec::new(
                "caffeine_pm",
                Behavior,
                &["sleep_duration", "sleep_efficiency", "sleep_quality"],
                Some(Negative),
                1,
                10,
            ),
            DriverSpec::new(
                "exercise",
                Behavior,
                &["sleep_duration", "sleep_quality", "hrv_rmssd", "resting_hr", "energy"],
                Some(Positive),
                2,
                10,
            ),
            DriverSpec::new(
                "melatonin",
                Supplement,
                &["sleep_duration", "sleep_efficiency", "sleep_quality"],
                Some(Positive),
                2,
                7,
            ),
            DriverSpec::new(
                "magnesium",
                Supplement,
                &["sleep_duration", "sleep_quality", "hrv_rmssd", "energy", "stress"],
                Some(Positive),
                3,
                10,
            ),
            DriverSpec::new(
                "omega3",
                Supplement,
                &["hrv_rmssd", "resting_hr", "energy"],
                Some(Positive),
                7,
                14,
            ),
            DriverSpec::new(
                "magnesium_glycinate",
                Intervention,
                &["sleep_duration", "sleep_quality", "hrv_rmssd", "energy"],
                Some(Positive),
                3,
                10,
            ),
            DriverSpec::new(
                "vitamin_d",
                LabMarker,
                &["energy", "hrv_rmssd"],
                Some(Positive),
                30,
                1,
            ),
        ];

        let interventions = [
            InterventionSpec::new(
                "magnesium_glycinate",
                "Magnesium (glycinate)",
                RiskLevel::Low,
                EvidenceGrade::B,
                &["kidney_disease"],
                &["tetracycline_antibiotics", "levothyroxine"],
                "Separate from some medications by 4+ hours.",
            ),
            InterventionSpec::new(
                "melatonin",
                "Melatonin",
                RiskLevel::Moderate,
                EvidenceGrade::B,
                &["pregnant", "trying_to_conceive"],
                &["anticoagulants", "immunosuppressants"],
                "Use the lowest effective dose; avoid long-term daily use without clinician input.",
            ),
            InterventionSpec::new(
                "omega_3",
                "Omega-3 (EPA/DHA)",
                RiskLevel::Low,
                EvidenceGrade::B,
                &["bleeding_disorder"],
                &["warfarin", "anticoagulants"],
                "Bleeding risk at high doses.",
            ),
        ];

        Self {
            metrics: metrics.into_iter().map(|m| (m.key.clone(), m)).collect(),
            policies: policies
                .into_iter()
                .map(|p| (p.metric_key.clone(), p))
                .collect(),
            red_flags,
            drivers: drivers
                .into_iter()
                .map(|d| (d.driver_key.clone(), d))
                .collect(),
            interventions: interventions
                .into_iter()
                .map(|i| (i.key.clone(), i))
                .collect(),
        }
    }
}
