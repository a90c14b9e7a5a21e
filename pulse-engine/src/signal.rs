//! Signal observations and day-level series.
//!
//! The engine works at daily granularity: raw observations are collapsed to
//! one mean value per calendar day (UTC) before any windowed statistic.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Where an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Wearable,
    Lab,
    Questionnaire,
    Manual,
    Other,
}

impl SignalSource {
    /// Default trust placed in a value from this source
    pub fn reliability(&self) -> f64 {
        match self {
            Self::Wearable => 0.7,
            Self::Lab => 0.9,
            Self::Questionnaire => 0.5,
            Self::Manual => 0.4,
            Self::Other => 0.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wearable => "wearable",
            Self::Lab => "lab",
            Self::Questionnaire => "questionnaire",
            Self::Manual => "manual",
            Self::Other => "other",
        }
    }

    /// Parse a source label, falling back to `Other` for unknown labels
    pub fn parse(s: &str) -> Self {
        match s {
            "wearable" => Self::Wearable,
            "lab" => Self::Lab,
            "questionnaire" => Self::Questionnaire,
            "manual" => Self::Manual,
            _ => Self::Other,
        }
    }
}

/// A single immutable observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub user_id: UserId,
    pub metric_key: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub source: SignalSource,
    /// Trust in the value, in [0, 1]
    pub reliability: f64,
}

impl Signal {
    /// Create a signal whose reliability is derived from its source
    pub fn new(
        user_id: UserId,
        metric_key: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: SignalSource,
    ) -> Self {
        Self {
            user_id,
            metric_key: metric_key.into(),
            value,
            unit: unit.into(),
            timestamp,
            source,
            reliability: source.reliability(),
        }
    }

    pub fn point(&self) -> DataPoint {
        DataPoint {
            timestamp: self.timestamp,
            value: self.value,
        }
    }
}

/// A (timestamp, value) pair as returned by the signal reader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` days ending on (and including) `end`
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - Duration::days(span),
            end,
        }
    }

    /// Number of days covered, at least 1
    pub fn days(&self) -> u32 {
        let diff = (self.end - self.start).num_days() + 1;
        diff.max(1) as u32
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Same window moved forward by `days`
    pub fn shift(&self, days: i64) -> Self {
        Self {
            start: self.start + Duration::days(days),
            end: self.end + Duration::days(days),
        }
    }

    /// Half-open timestamp bounds `[start 00:00, end+1 00:00)` for store queries
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(NaiveTime::MIN).and_utc();
        let end = (self.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        (start, end)
    }
}

/// One value per calendar day, ordered by date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    days: BTreeMap<NaiveDate, f64>,
}

impl DailySeries {
    /// Collapse raw points to the mean value of each UTC day
    pub fn from_points(points: &[DataPoint]) -> Self {
        let mut sums: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for p in points {
            if !p.value.is_finite() {
                continue;
            }
            let entry = sums.entry(p.timestamp.date_naive()).or_insert((0.0, 0));
            entry.0 += p.value;
            entry.1 += 1;
        }
        Self {
            days: sums
                .into_iter()
                .map(|(day, (sum, n))| (day, sum / f64::from(n)))
                .collect(),
        }
    }

    pub fn from_days(days: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn get(&self, day: NaiveDate) -> Option<f64> {
        self.days.get(&day).copied()
    }

    /// All values in date order
    pub fn values(&self) -> Vec<f64> {
        self.days.values().copied().collect()
    }

    /// Values whose day falls inside `window`, in date order
    pub fn values_in(&self, window: &DateWindow) -> Vec<f64> {
        if window.end < window.start {
            return Vec::new();
        }
        self.days
            .range(window.start..=window.end)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Sub-series restricted to `window`
    pub fn window(&self, window: &DateWindow) -> Self {
        if window.end < window.start {
            return Self::default();
        }
        Self {
            days: self
                .days
                .range(window.start..=window.end)
                .map(|(d, v)| (*d, *v))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.days.iter().map(|(d, v)| (*d, *v))
    }
}

/// Day-level yes/no behaviors from check-ins (e.g. `caffeine_pm`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorLog {
    days: BTreeMap<NaiveDate, BTreeMap<String, bool>>,
}

impl BehaviorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a behavior for a day, replacing any earlier entry
    pub fn record(&mut self, day: NaiveDate, key: impl Into<String>, present: bool) {
        self.days.entry(day).or_default().insert(key.into(), present);
    }

    /// `Some(true)` present, `Some(false)` explicitly absent, `None` not logged
    pub fn flag(&self, day: NaiveDate, key: &str) -> Option<bool> {
        self.days.get(&day).and_then(|b| b.get(key)).copied()
    }

    /// Every behavior key seen in the log
    pub fn keys(&self) -> std::collections::BTreeSet<&str> {
        self.days
            .values()
            .flat_map(|b| b.keys().map(String::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
