//! Collaborator seams: signal reads, experiment reads and persistence
//!
//! The engine never talks to a database directly. Services take these traits
//! as `Arc<dyn ...>` and [`InMemoryStore`] implements all of them for tests
//! and the CLI.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::attribution::AttributionResult;
use crate::baseline::Baseline;
use crate::decision::DecisionRecord;
use crate::error::Result;
use crate::evaluation::EvaluationResult;
use crate::experiment::{AdherenceEvent, Experiment};
use crate::governance::DecisionSignal;
use crate::insight::Insight;
use crate::memory::{CausalMemory, MemoryStatus};
use crate::signal::{BehaviorLog, DataPoint, DateWindow, Signal};
use crate::types::{ExperimentId, UserId};

/// Read-only view over observations
#[async_trait]
pub trait SignalReader: Send + Sync {
    /// Points for one metric with `start <= timestamp < end`, oldest first
    async fn get_values(
        &self,
        user_id: &UserId,
        metric_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>>;

    /// Day-level behavior flags inside `window`
    async fn get_behaviors(&self, user_id: &UserId, window: &DateWindow) -> Result<BehaviorLog>;
}

/// Read-only view over experiments and their adherence logs
#[async_trait]
pub trait ExperimentReader: Send + Sync {
    async fn get_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>>;

    async fn adherence_events(&self, id: ExperimentId) -> Result<Vec<AdherenceEvent>>;
}

/// Persistence sink for everything the engine produces
#[async_trait]
pub trait EngineStore: Send + Sync {
    /// Replace the current baseline for its (user, metric)
    async fn save_baseline(&self, baseline: &Baseline) -> Result<()>;

    async fn get_baseline(&self, user_id: &UserId, metric_key: &str) -> Result<Option<Baseline>>;

    async fn save_insight(&self, insight: &Insight) -> Result<()>;

    /// Insights generated at or after `since`
    async fn recent_insights(&self, user_id: &UserId, since: DateTime<Utc>) -> Result<Vec<Insight>>;

    async fn save_attributions(&self, results: &[AttributionResult]) -> Result<()>;

    async fn save_evaluation(&self, evaluation: &EvaluationResult) -> Result<()>;

    /// Evaluations for (user, metric), most recent first
    async fn evaluation_history(
        &self,
        user_id: &UserId,
        metric_key: &str,
        limit: usize,
    ) -> Result<Vec<EvaluationResult>>;

    async fn save_signal(&self, signal: &DecisionSignal) -> Result<()>;

    async fn save_decision(&self, decision: &DecisionRecord) -> Result<()>;

    async fn get_memory(
        &self,
        user_id: &UserId,
        driver_key: &str,
        metric_key: &str,
    ) -> Result<Option<CausalMemory>>;

    /// Insert or replace the memory for its (user, driver, metric)
    async fn save_memory(&self, memory: &CausalMemory) -> Result<()>;

    /// Memories of a user, most confident first
    async fn list_memories(
        &self,
        user_id: &UserId,
        status: Option<MemoryStatus>,
    ) -> Result<Vec<CausalMemory>>;
}

/// A behavior flag as it appears in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEntry {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub key: String,
    pub present: bool,
}

/// Everything an [`InMemoryStore`] holds, in serializable form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub signals: Vec<Signal>,
    pub behaviors: Vec<BehaviorEntry>,
    pub experiments: Vec<Experiment>,
    pub adherence: Vec<AdherenceEvent>,
    pub baselines: Vec<Baseline>,
    pub insights: Vec<Insight>,
    pub attributions: Vec<AttributionResult>,
    pub evaluations: Vec<EvaluationResult>,
    pub decision_signals: Vec<DecisionSignal>,
    pub decisions: Vec<DecisionRecord>,
    pub memories: Vec<CausalMemory>,
}

#[derive(Debug, Default)]
struct Inner {
    signals: Vec<Signal>,
    behavior_entries: Vec<BehaviorEntry>,
    experiments: BTreeMap<String, Experiment>,
    adherence: Vec<AdherenceEvent>,
    baselines: BTreeMap<(UserId, String), Baseline>,
    insights: Vec<Insight>,
    attributions: Vec<AttributionResult>,
    evaluations: Vec<EvaluationResult>,
    decision_signals: Vec<DecisionSignal>,
    decisions: Vec<DecisionRecord>,
    memories: BTreeMap<(UserId, String, String), CausalMemory>,
}

/// In-process store backed by `tokio::sync::RwLock`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let inner = Inner {
            signals: snapshot.signals,
            behavior_entries: snapshot.behaviors,
            experiments: snapshot
                .experiments
                .into_iter()
                .map(|e| (e.id.to_string(), e))
                .collect(),
            adherence: snapshot.adherence,
            baselines: snapshot
                .baselines
                .into_iter()
                .map(|b| ((b.user_id.clone(), b.metric_key.clone()), b))
                .collect(),
            insights: snapshot.insights,
            attributions: snapshot.attributions,
            evaluations: snapshot.evaluations,
            decision_signals: snapshot.decision_signals,
            decisions: snapshot.decisions,
            memories: snapshot
                .memories
                .into_iter()
                .map(|m| ((m.user_id.clone(), m.driver_key.clone(), m.metric_key.clone()), m))
                .collect(),
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot {
            signals: inner.signals.clone(),
            behaviors: inner.behavior_entries.clone(),
            experiments: inner.experiments.values().cloned().collect(),
            adherence: inner.adherence.clone(),
            baselines: inner.baselines.values().cloned().collect(),
            insights: inner.insights.clone(),
            attributions: inner.attributions.clone(),
            evaluations: inner.evaluations.clone(),
            decision_signals: inner.decision_signals.clone(),
            decisions: inner.decisions.clone(),
            memories: inner.memories.values().cloned().collect(),
        }
    }

    pub async fn add_signal(&self, signal: Signal) {
        self.inner.write().await.signals.push(signal);
    }

    pub async fn add_signals(&self, signals: impl IntoIterator<Item = Signal>) {
        self.inner.write().await.signals.extend(signals);
    }

    pub async fn record_behavior(&self, user_id: &UserId, day: NaiveDate, key: &str, present: bool) {
        // Later entries for the same (user, day, key) win when read back
        self.inner.write().await.behavior_entries.push(BehaviorEntry {
            user_id: user_id.clone(),
            day,
            key: key.to_string(),
            present,
        });
    }

    pub async fn add_experiment(&self, experiment: Experiment) {
        self.inner
            .write()
            .await
            .experiments
            .insert(experiment.id.to_string(), experiment);
    }

    pub async fn add_adherence(&self, event: AdherenceEvent) {
        self.inner.write().await.adherence.push(event);
    }

    /// Every stored insight of a user, oldest first
    pub async fn insights(&self, user_id: &UserId) -> Vec<Insight> {
        self.inner
            .read()
            .await
            .insights
            .iter()
            .filter(|i| &i.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn decision_signals(&self, user_id: &UserId) -> Vec<DecisionSignal> {
        self.inner
            .read()
            .await
            .decision_signals
            .iter()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn decisions(&self, user_id: &UserId) -> Vec<DecisionRecord> {
        self.inner
            .read()
            .await
            .decisions
            .iter()
            .filter(|d| &d.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Experiments of a user in start order
    pub async fn experiments(&self, user_id: &UserId) -> Vec<Experiment> {
        let mut out: Vec<Experiment> = self
            .inner
            .read()
            .await
            .experiments
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.started_on);
        out
    }

    /// Every user with at least one signal
    pub async fn users(&self) -> Vec<UserId> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserId> = inner.signals.iter().map(|s| s.user_id.clone()).collect();
        users.sort();
        users.dedup();
        users
    }
}

#[async_trait]
impl SignalReader for InMemoryStore {
    async fn get_values(
        &self,
        user_id: &UserId,
        metric_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>> {
        let inner = self.inner.read().await;
        let mut points: Vec<DataPoint> = inner
            .signals
            .iter()
            .filter(|s| {
                &s.user_id == user_id
                    && s.metric_key == metric_key
                    && s.timestamp >= start
                    && s.timestamp < end
            })
            .map(Signal::point)
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    async fn get_behaviors(&self, user_id: &UserId, window: &DateWindow) -> Result<BehaviorLog> {
        let inner = self.inner.read().await;
        let mut log = BehaviorLog::new();
        for entry in inner
            .behavior_entries
            .iter()
            .filter(|e| &e.user_id == user_id && window.contains(e.day))
        {
            log.record(entry.day, entry.key.clone(), entry.present);
        }
        Ok(log)
    }
}

#[async_trait]
impl ExperimentReader for InMemoryStore {
    async fn get_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>> {
        Ok(self.inner.read().await.experiments.get(&id.to_string()).cloned())
    }

    async fn adherence_events(&self, id: ExperimentId) -> Result<Vec<AdherenceEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .adherence
            .iter()
            .filter(|e| e.experiment_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EngineStore for InMemoryStore {
    async fn save_baseline(&self, baseline: &Baseline) -> Result<()> {
        self.inner.write().await.baselines.insert(
            (baseline.user_id.clone(), baseline.metric_key.clone()),
            baseline.clone(),
        );
        Ok(())
    }

    async fn get_baseline(&self, user_id: &UserId, metric_key: &str) -> Result<Option<Baseline>> {
        Ok(self
            .inner
            .read()
            .await
            .baselines
            .get(&(user_id.clone(), metric_key.to_string()))
            .cloned())
    }

    async fn save_insight(&self, insight: &Insight) -> Result<()> {
        self.inner.write().await.insights.push(insight.clone());
        Ok(())
    }

    async fn recent_insights(&self, user_id: &UserId, since: DateTime<Utc>) -> Result<Vec<Insight>> {
        Ok(self
            .inner
            .read()
            .await
            .insights
            .iter()
            .filter(|i| &i.user_id == user_id && i.generated_at >= since)
            .cloned()
            .collect())
    }

    async fn save_attributions(&self, results: &[AttributionResult]) -> Result<()> {
        self.inner
            .write()
            .await
            .attributions
            .extend(results.iter().cloned());
        Ok(())
    }

    async fn save_evaluation(&self, evaluation: &EvaluationResult) -> Result<()> {
        self.inner.write().await.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn evaluation_history(
        &self,
        user_id: &UserId,
        metric_key: &str,
        limit: usize,
    ) -> Result<Vec<EvaluationResult>> {
        let inner = self.inner.read().await;
        let mut history: Vec<EvaluationResult> = inner
            .evaluations
            .iter()
            .filter(|e| &e.user_id == user_id && e.metric_key == metric_key)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; reverse puts newest first
        history.sort_by_key(|e| e.created_at);
        history.reverse();
        history.truncate(limit);
        Ok(history)
    }

    async fn save_signal(&self, signal: &DecisionSignal) -> Result<()> {
        self.inner.write().await.decision_signals.push(signal.clone());
        Ok(())
    }

    async fn save_decision(&self, decision: &DecisionRecord) -> Result<()> {
        self.inner.write().await.decisions.push(decision.clone());
        Ok(())
    }

    async fn get_memory(
        &self,
        user_id: &UserId,
        driver_key: &str,
        metric_key: &str,
    ) -> Result<Option<CausalMemory>> {
        let key = (user_id.clone(), driver_key.to_string(), metric_key.to_string());
        Ok(self.inner.read().await.memories.get(&key).cloned())
    }

    async fn save_memory(&self, memory: &CausalMemory) -> Result<()> {
        let key = (
            memory.user_id.clone(),
            memory.driver_key.clone(),
            memory.metric_key.clone(),
        );
        self.inner.write().await.memories.insert(key, memory.clone());
        Ok(())
    }

    async fn list_memories(
        &self,
        user_id: &UserId,
        status: Option<MemoryStatus>,
    ) -> Result<Vec<CausalMemory>> {
        let inner = self.inner.read().await;
        let mut memories: Vec<CausalMemory> = inner
            .memories
            .values()
            .filter(|m| &m.user_id == user_id && status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        memories.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(memories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalSource;
    use chrono::{Duration, TimeZone};

    // Verify traits are object-safe
    #[test]
    fn test_signal_reader_is_object_safe() {
        fn _takes_boxed(_: Box<dyn SignalReader>) {}
    }

    #[test]
    fn test_experiment_reader_is_object_safe() {
        fn _takes_boxed(_: Box<dyn ExperimentReader>) {}
    }

    #[test]
    fn test_engine_store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn EngineStore>) {}
    }

    fn signal(user: &str, metric: &str, hours: i64, value: f64) -> Signal {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours);
        Signal::new(UserId::from(user), metric, value, "minutes", ts, SignalSource::Wearable)
    }

    #[tokio::test]
    async fn get_values_filters_and_orders() {
        let store = InMemoryStore::new();
        store
            .add_signals([
                signal("u1", "sleep_duration", 30, 410.0),
                signal("u1", "sleep_duration", 6, 400.0),
                signal("u1", "steps", 6, 9000.0),
                signal("u2", "sleep_duration", 6, 300.0),
                signal("u1", "sleep_duration", 80, 420.0),
            ])
            .await;

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let points = store
            .get_values(&UserId::from("u1"), "sleep_duration", start, start + Duration::days(2))
            .await
            .unwrap();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![400.0, 410.0]);
    }

    #[tokio::test]
    async fn behaviors_are_windowed() {
        let store = InMemoryStore::new();
        let user = UserId::from("u1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        store.record_behavior(&user, day, "caffeine_pm", true).await;
        store
            .record_behavior(&user, day + Duration::days(10), "caffeine_pm", false)
            .await;

        let log = store
            .get_behaviors(&user, &DateWindow::trailing(day + Duration::days(2), 5))
            .await
            .unwrap();
        assert_eq!(log.flag(day, "caffeine_pm"), Some(true));
        assert_eq!(log.flag(day + Duration::days(10), "caffeine_pm"), None);
    }

    #[tokio::test]
    async fn baseline_is_replaced() {
        let store = InMemoryStore::new();
        let user = UserId::from("u1");
        let mut baseline = Baseline {
            user_id: user.clone(),
            metric_key: "steps".into(),
            mean: 8000.0,
            std: 1000.0,
            sample_count: 20,
            window_days: 30,
            computed_at: Utc::now(),
        };
        store.save_baseline(&baseline).await.unwrap();
        baseline.mean = 9000.0;
        store.save_baseline(&baseline).await.unwrap();

        let current = store.get_baseline(&user, "steps").await.unwrap().unwrap();
        assert_eq!(current.mean, 9000.0);
        assert_eq!(store.snapshot().await.baselines.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_roundtrip_keeps_signals() {
        let store = InMemoryStore::new();
        store.add_signal(signal("u1", "steps", 1, 5000.0)).await;
        let user = UserId::from("u1");
        store
            .record_behavior(&user, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), "alcohol_evening", true)
            .await;

        let json = serde_json::to_string(&store.snapshot().await).unwrap();
        let restored = InMemoryStore::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.users().await, vec![user]);
        assert_eq!(restored.snapshot().await.behaviors.len(), 1);
    }
}
