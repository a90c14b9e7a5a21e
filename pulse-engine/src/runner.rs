//! The daily loop: safety, baselines, detectors and governance for one user.
//!
//! Metrics are processed independently. A failure in one metric is logged
//! and recorded in the [`LoopReport`], and the remaining metrics still run.
//! Everything that survives guardrails, suppression and the daily cap is
//! persisted together with a level-1 decision signal.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::baseline::{Baseline, BaselineCalculator};
use crate::config::{EngineConfig, WindowConfig};
use crate::confidence::ConfidenceScorer;
use crate::detectors::{standard_detectors, DetectionInput, Detector};
use crate::error::{BaselineError, BaselineErrorKind, EngineError, Result};
use crate::governance::{
    ConfidenceLevel, InsightGuardrails, InsightSuppressor, SignalClassifier, SignalOrigin,
};
use crate::insight::{Insight, InsightFactory, InsightStatus};
use crate::registry::{MetricSpec, Registry};
use crate::safety::SafetyGate;
use crate::signal::{DailySeries, DataPoint, DateWindow};
use crate::store::{EngineStore, SignalReader};
use crate::types::{idempotency_key, UserId};

/// Job name used in loop idempotency keys
pub const LOOP_JOB_ID: &str = "run_loop";

/// A metric whose processing failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFailure {
    pub metric_key: String,
    pub error: String,
    /// Whether re-running later may succeed
    pub recoverable: bool,
}

/// An insight withheld because an equivalent one surfaced recently
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuppressedInsight {
    pub insight: Insight,
    pub reason: String,
}

/// Outcome of one loop run for one user
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub user_id: UserId,
    pub run_date: NaiveDate,
    pub idempotency_key: String,
    /// Surfaced and persisted insights, safety alerts first
    pub insights: Vec<Insight>,
    pub suppressed: Vec<SuppressedInsight>,
    /// Candidates below their metric's guardrail thresholds
    pub filtered: usize,
    /// Candidates over the daily cap
    pub capped: Vec<Insight>,
    pub baselines_updated: usize,
    /// Out-of-range values ignored across all metrics
    pub dropped_values: usize,
    pub failures: Vec<MetricFailure>,
}

impl LoopReport {
    pub fn safety_alerts(&self) -> impl Iterator<Item = &Insight> {
        self.insights.iter().filter(|i| i.is_safety_alert())
    }
}

/// What one metric contributed to a run
#[derive(Debug, Default)]
struct MetricOutcome {
    candidates: Vec<Insight>,
    baseline_updated: bool,
    dropped_values: usize,
}

/// Runs the loop against injected collaborators
pub struct LoopRunner {
    signals: Arc<dyn SignalReader>,
    store: Arc<dyn EngineStore>,
    registry: Arc<Registry>,
    windows: WindowConfig,
    baselines: BaselineCalculator,
    detectors: Vec<Box<dyn Detector>>,
    safety: SafetyGate,
    factory: InsightFactory,
    guardrails: InsightGuardrails,
    suppressor: InsightSuppressor,
    classifier: SignalClassifier,
}

impl LoopRunner {
    pub fn new(
        config: &EngineConfig,
        signals: Arc<dyn SignalReader>,
        store: Arc<dyn EngineStore>,
    ) -> Result<Self> {
        let registry = Arc::new(config.registry.clone());
        let factory = InsightFactory::new(
            ConfidenceScorer::with_weights(config.confidence.clone()),
            config.governance.rubric.clone(),
            config.governance.claim_governor()?,
        );
        Ok(Self {
            signals,
            store,
            safety: SafetyGate::with_config(registry.clone(), config.safety.clone()),
            registry,
            windows: config.windows.clone(),
            baselines: BaselineCalculator::with_config(config.baseline.clone()),
            detectors: standard_detectors(&config.detectors),
            factory,
            guardrails: InsightGuardrails::with_config(config.governance.guardrails.clone()),
            suppressor: InsightSuppressor::with_config(config.governance.suppression.clone()),
            classifier: config.governance.signal_classifier(),
        })
    }

    /// Baseline window: the `window_days` days before the change window
    fn baseline_window(&self, today: NaiveDate) -> DateWindow {
        let end = today - Duration::days(i64::from(self.windows.change_days));
        DateWindow::trailing(end, self.baselines.config().window_days)
    }

    /// Run every registry metric for `user_id` as of `today`
    pub async fn run(&self, user_id: &UserId, today: NaiveDate) -> Result<LoopReport> {
        let now = Utc::now();
        info!(user_id = %user_id, %today, "running insight loop");

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        let mut baselines_updated = 0;
        let mut dropped_values = 0;

        let metric_keys: Vec<String> = self.registry.metric_keys().map(str::to_string).collect();
        for metric_key in &metric_keys {
            match self.run_metric(user_id, metric_key, today, now).await {
                Ok(outcome) => {
                    candidates.extend(outcome.candidates);
                    baselines_updated += usize::from(outcome.baseline_updated);
                    dropped_values += outcome.dropped_values;
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        metric_key = %metric_key,
                        error = %e,
                        recoverable = e.is_recoverable(),
                        "metric skipped"
                    );
                    failures.push(MetricFailure {
                        metric_key: metric_key.clone(),
                        error: e.to_string(),
                        recoverable: e.is_recoverable(),
                    });
                }
            }
        }

        // Guardrails
        let before = candidates.len();
        let candidates = self.guardrails.filter(candidates);
        let filtered = before - candidates.len();
        let candidates = self.guardrails.escalate(candidates);

        // Suppression against what the user saw recently
        let lookback = Duration::days(i64::from(
            self.suppressor.config().min_days_between_repeats,
        ));
        let recent = self.store.recent_insights(user_id, now - lookback).await?;
        let mut surfaced = Vec::new();
        let mut suppressed = Vec::new();
        for mut insight in candidates {
            match self.suppressor.should_suppress(&insight, &recent, now) {
                Some(reason) => {
                    debug!(
                        metric_key = %insight.metric_key,
                        category = insight.category.as_str(),
                        %reason,
                        "insight suppressed"
                    );
                    let signal = self.suppressor.suppressed_signal(&insight, reason.clone(), now);
                    self.store.save_signal(&signal).await?;
                    insight.status = InsightStatus::Suppressed;
                    self.store.save_insight(&insight).await?;
                    suppressed.push(SuppressedInsight { insight, reason });
                }
                None => surfaced.push(insight),
            }
        }

        let (insights, capped) = self.suppressor.cap_daily(surfaced);
        for insight in &insights {
            self.store.save_insight(insight).await?;
            let signal = self.classifier.signal(
                user_id,
                SignalOrigin::Insight,
                insight.id.to_string(),
                &insight.metric_key,
                ConfidenceLevel::Observational,
                insight.confidence,
                1,
                insight.explanation.clone(),
            );
            self.store.save_signal(&signal).await?;
        }

        info!(
            user_id = %user_id,
            surfaced = insights.len(),
            suppressed = suppressed.len(),
            filtered,
            capped = capped.len(),
            failures = failures.len(),
            "insight loop complete"
        );

        Ok(LoopReport {
            user_id: user_id.clone(),
            run_date: today,
            idempotency_key: idempotency_key(LOOP_JOB_ID, today, user_id),
            insights,
            suppressed,
            filtered,
            capped,
            baselines_updated,
            dropped_values,
            failures,
        })
    }

    async fn run_metric(
        &self,
        user_id: &UserId,
        metric_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<MetricOutcome> {
        let spec = self.registry.get_metric_spec(metric_key)?;
        let baseline_window = self.baseline_window(today);
        let span = DateWindow::new(baseline_window.start, today);

        let Some((series, dropped_values)) = self
            .read_series(user_id, metric_key, spec, &span)
            .await?
        else {
            debug!(metric_key, "no data, skipping metric");
            return Ok(MetricOutcome::default());
        };
        let mut outcome = MetricOutcome {
            dropped_values,
            ..MetricOutcome::default()
        };

        // Red flags before anything else
        let recent = series.values_in(&DateWindow::trailing(today, self.windows.change_days));
        if let Some(alert) = self.safety.check(metric_key, &recent) {
            warn!(
                user_id = %user_id,
                metric_key,
                rule = %alert.rule_key,
                "safety alert raised"
            );
            outcome
                .candidates
                .push(self.factory.from_safety_alert(user_id, &alert, now));
            if self.safety.config().suppress_detectors_on_alert {
                return Ok(outcome);
            }
        }

        let policy = self.registry.get_policy(metric_key)?;
        let baseline = self
            .current_baseline(user_id, metric_key, &series, &baseline_window, &mut outcome)
            .await?;

        for detector in &self.detectors {
            let kind = detector.kind();
            if !policy.allows(kind) {
                continue;
            }
            let window_days = self.windows.days_for(kind);
            let values = series.values_in(&DateWindow::trailing(today, window_days));
            let input = DetectionInput {
                metric_key,
                values: &values,
                baseline: &baseline,
                policy,
                window_days,
            };
            if let Some(result) = detector.detect(&input) {
                debug!(
                    metric_key,
                    kind = kind.as_str(),
                    strength = result.strength().as_str(),
                    "detector fired"
                );
                outcome.candidates.push(self.factory.from_detection(
                    user_id,
                    &result,
                    &baseline,
                    window_days,
                    now,
                ));
            }
        }

        Ok(outcome)
    }

    /// Recompute and save one metric's baseline outside a full run
    ///
    /// Every failure is a typed [`EngineError::BaselineUnavailable`].
    pub async fn refresh_baseline(
        &self,
        user_id: &UserId,
        metric_key: &str,
        today: NaiveDate,
    ) -> Result<Baseline> {
        let spec = self.registry.get_metric_spec(metric_key).map_err(|e| {
            BaselineError::new(
                BaselineErrorKind::MetricNotFound,
                e.to_string(),
                user_id.as_str(),
                metric_key,
            )
        })?;
        let window = self.baseline_window(today);
        let series = self
            .read_series(user_id, metric_key, spec, &window)
            .await?
            .map(|(series, _)| series)
            .unwrap_or_default();
        let mut outcome = MetricOutcome::default();
        self.current_baseline(user_id, metric_key, &series, &window, &mut outcome)
            .await
    }

    /// In-range daily series over `window` and the count of dropped values
    ///
    /// `None` when the store has no points at all.
    async fn read_series(
        &self,
        user_id: &UserId,
        metric_key: &str,
        spec: &MetricSpec,
        window: &DateWindow,
    ) -> Result<Option<(DailySeries, usize)>> {
        let (start, end) = window.bounds();
        let points = self
            .signals
            .get_values(user_id, metric_key, start, end)
            .await
            .map_err(|e| BaselineError::from_store(user_id.as_str(), metric_key, &e))?;
        if points.is_empty() {
            return Ok(None);
        }

        let total = points.len();
        let valid: Vec<DataPoint> = points
            .into_iter()
            .filter(|p| spec.is_in_range(p.value))
            .collect();
        let dropped = total - valid.len();
        if dropped > 0 {
            warn!(metric_key, dropped, "ignoring out-of-range values");
        }
        Ok(Some((DailySeries::from_points(&valid), dropped)))
    }

    /// Recompute and save the baseline, falling back to the stored one
    async fn current_baseline(
        &self,
        user_id: &UserId,
        metric_key: &str,
        series: &DailySeries,
        window: &DateWindow,
        outcome: &mut MetricOutcome,
    ) -> Result<Baseline> {
        let store_failure =
            |e: EngineError| BaselineError::from_store(user_id.as_str(), metric_key, &e);
        let values = series.values_in(window);
        match self.baselines.compute(user_id, metric_key, &values) {
            Ok(baseline) => {
                self.store
                    .save_baseline(&baseline)
                    .await
                    .map_err(store_failure)?;
                outcome.baseline_updated = true;
                Ok(baseline)
            }
            Err(err) => match self
                .store
                .get_baseline(user_id, metric_key)
                .await
                .map_err(store_failure)?
            {
                Some(stored) => {
                    debug!(metric_key, reason = %err, "using stored baseline");
                    Ok(stored)
                }
                None => Err(EngineError::BaselineUnavailable(err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::InsightCategory;
    use crate::signal::{BehaviorLog, Signal, SignalSource};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    /// Signal source whose backend is down
    struct UnavailableSignals {
        table_missing: bool,
    }

    #[async_trait]
    impl SignalReader for UnavailableSignals {
        async fn get_values(
            &self,
            _user_id: &UserId,
            _metric_key: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<DataPoint>> {
            if self.table_missing {
                Err(EngineError::TableMissing("signals".into()))
            } else {
                Err(EngineError::Storage("connection refused".into()))
            }
        }

        async fn get_behaviors(
            &self,
            _user_id: &UserId,
            _window: &DateWindow,
        ) -> Result<BehaviorLog> {
            Ok(BehaviorLog::new())
        }
    }

    fn unavailable_runner(table_missing: bool) -> LoopRunner {
        LoopRunner::new(
            &EngineConfig::default(),
            Arc::new(UnavailableSignals { table_missing }),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap()
    }

    fn baseline_error(err: EngineError) -> BaselineError {
        match err {
            EngineError::BaselineUnavailable(e) => e,
            other => panic!("expected a baseline error, got {other:?}"),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 30).unwrap()
    }

    fn reading(user: &UserId, metric: &str, days_ago: i64, value: f64) -> Signal {
        let ts = (today() - Duration::days(days_ago))
            .and_hms_opt(8, 0, 0)
            .unwrap()
            .and_utc();
        Signal::new(user.clone(), metric, value, "", ts, SignalSource::Wearable)
    }

    fn runner(store: &Arc<InMemoryStore>) -> LoopRunner {
        LoopRunner::new(&EngineConfig::default(), store.clone(), store.clone()).unwrap()
    }

    #[test]
    fn baseline_window_precedes_change_window() {
        let store = Arc::new(InMemoryStore::new());
        let window = runner(&store).baseline_window(today());
        assert_eq!(window.end, today() - Duration::days(7));
        assert_eq!(window.days(), 30);
    }

    #[tokio::test]
    async fn empty_user_produces_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let report = runner(&store).run(&UserId::from("u1"), today()).await.unwrap();
        assert!(report.insights.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(report.idempotency_key, "run_loop:2024-09-30:u1");
    }

    #[tokio::test]
    async fn thin_history_is_a_recoverable_failure() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::from("u1");
        store
            .add_signals((0..3).map(|d| reading(&user, "hrv_rmssd", d, 55.0)))
            .await;

        let report = runner(&store).run(&user, today()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].metric_key, "hrv_rmssd");
        assert!(report.failures[0].recoverable);
    }

    #[tokio::test]
    async fn safety_alert_skips_detectors() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::from("u1");
        store
            .add_signals((0..7).map(|d| reading(&user, "resting_hr", d, 112.0)))
            .await;

        let report = runner(&store).run(&user, today()).await.unwrap();
        assert_eq!(report.insights.len(), 1);
        assert_eq!(report.insights[0].category, InsightCategory::SafetyAlert);
        assert_eq!(report.insights[0].confidence, 0.9);
        assert_eq!(report.baselines_updated, 0);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn refresh_baseline_saves_the_new_baseline() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::from("u1");
        store
            .add_signals((7..37).map(|d| reading(&user, "sleep_duration", d, 420.0)))
            .await;

        let baseline = runner(&store)
            .refresh_baseline(&user, "sleep_duration", today())
            .await
            .unwrap();
        assert_eq!(baseline.sample_count, 30);
        assert_eq!(baseline.mean, 420.0);
        let stored = store.get_baseline(&user, "sleep_duration").await.unwrap();
        assert_eq!(stored, Some(baseline));
    }

    #[tokio::test]
    async fn unknown_metric_baseline_is_not_recoverable() {
        let store = Arc::new(InMemoryStore::new());
        let err = runner(&store)
            .refresh_baseline(&UserId::from("u1"), "vo2max", today())
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
        let err = baseline_error(err);
        assert_eq!(err.kind, BaselineErrorKind::MetricNotFound);
        assert_eq!(err.metric_key, "vo2max");
    }

    #[tokio::test]
    async fn store_outage_is_a_recoverable_database_error() {
        let runner = unavailable_runner(false);
        let user = UserId::from("u1");

        let err = runner
            .refresh_baseline(&user, "sleep_duration", today())
            .await
            .unwrap_err();
        let err = baseline_error(err);
        assert_eq!(err.kind, BaselineErrorKind::DatabaseError);
        assert!(err.recoverable);
        assert!(err.message.contains("connection refused"));

        let report = runner.run(&user, today()).await.unwrap();
        assert!(!report.failures.is_empty());
        assert!(report.failures.iter().all(|f| f.recoverable));
        assert!(report.failures.iter().all(|f| f.error.contains("database_error")));
    }

    #[tokio::test]
    async fn missing_table_keeps_its_kind() {
        let err = unavailable_runner(true)
            .refresh_baseline(&UserId::from("u1"), "resting_hr", today())
            .await
            .unwrap_err();
        let err = baseline_error(err);
        assert_eq!(err.kind, BaselineErrorKind::TableMissing);
        assert!(err.recoverable);
    }
}
