//! End-to-end runs of the insight loop over the in-memory store

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use pulse_engine::detectors::{Direction, Strength};
use pulse_engine::insight::InsightEvidence;
use pulse_engine::{
    EngineConfig, InMemoryStore, InsightCategory, InsightStatus, LoopRunner, MetricDirection,
    MetricSpec, Signal, SignalSource, UserId,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()
}

fn reading(user: &UserId, metric: &str, days_ago: i64, value: f64) -> Signal {
    let ts = (today() - Duration::days(days_ago))
        .and_hms_opt(7, 30, 0)
        .unwrap()
        .and_utc();
    Signal::new(user.clone(), metric, value, "minutes", ts, SignalSource::Wearable)
}

/// Thirty baseline days around 400 minutes, then a week at 460
async fn seed_sleep_jump(store: &InMemoryStore, user: &UserId) {
    let baseline = (7..37).map(|d| reading(user, "sleep_duration", d, if d % 2 == 0 { 390.0 } else { 410.0 }));
    let recent = (0..7).map(|d| reading(user, "sleep_duration", d, 460.0));
    store.add_signals(baseline.chain(recent)).await;
}

fn runner(config: &EngineConfig, store: &Arc<InMemoryStore>) -> LoopRunner {
    LoopRunner::new(config, store.clone(), store.clone()).unwrap()
}

#[tokio::test]
async fn sleep_jump_surfaces_a_change() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u1");
    seed_sleep_jump(&store, &user).await;

    let report = runner(&EngineConfig::default(), &store)
        .run(&user, today())
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.baselines_updated, 1);
    let change = report
        .insights
        .iter()
        .find(|i| i.category == InsightCategory::Change)
        .expect("change insight");
    assert_eq!(change.metric_key, "sleep_duration");
    assert_eq!(change.status, InsightStatus::Detected);
    assert!(change.confidence > 0.9);
    match &change.evidence {
        InsightEvidence::Detector { result, baseline_mean, .. } => {
            assert_eq!(result.direction(), Direction::Up);
            assert_eq!(result.strength(), Strength::Strong);
            assert!((baseline_mean - 400.0).abs() < 1e-9);
        }
        other => panic!("unexpected evidence: {other:?}"),
    }

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.baselines.len(), 1);
    assert_eq!(snapshot.insights.len(), report.insights.len());
    assert_eq!(snapshot.decision_signals.len(), report.insights.len());
    assert!(snapshot.decision_signals.iter().all(|s| !s.suppressed));
}

#[tokio::test]
async fn rerun_on_the_same_day_is_suppressed() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u1");
    seed_sleep_jump(&store, &user).await;
    let runner = runner(&EngineConfig::default(), &store);

    let first = runner.run(&user, today()).await.unwrap();
    let second = runner.run(&user, today()).await.unwrap();

    assert!(!first.insights.is_empty());
    assert!(second.insights.is_empty());
    assert_eq!(second.suppressed.len(), first.insights.len());
    for withheld in &second.suppressed {
        assert_eq!(withheld.insight.status, InsightStatus::Suppressed);
        assert_eq!(
            withheld.reason,
            "Duplicate insight for same metric within 0 days (min: 7)"
        );
    }

    let suppressed_signals: Vec<_> = store
        .decision_signals(&user)
        .await
        .into_iter()
        .filter(|s| s.suppressed)
        .collect();
    assert_eq!(suppressed_signals.len(), second.suppressed.len());
    assert!(suppressed_signals.iter().all(|s| s.suppression_until.is_some()));
}

#[tokio::test]
async fn daily_cap_keeps_the_most_confident() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u1");
    seed_sleep_jump(&store, &user).await;

    let mut config = EngineConfig::default();
    config.governance.suppression.max_daily_insights = 1;
    let report = runner(&config, &store).run(&user, today()).await.unwrap();

    assert_eq!(report.insights.len(), 1);
    assert!(!report.capped.is_empty());
    assert!(report.capped.iter().all(|c| c.confidence <= report.insights[0].confidence));
}

#[tokio::test]
async fn metric_failures_are_isolated() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u1");
    seed_sleep_jump(&store, &user).await;
    store
        .add_signals((0..10).map(|d| reading(&user, "glucose", d, 95.0)))
        .await;

    let mut config = EngineConfig::default();
    config.registry.metrics.insert(
        "glucose".to_string(),
        MetricSpec {
            key: "glucose".into(),
            unit: "mg/dL".into(),
            min_value: Some(20.0),
            max_value: Some(600.0),
            direction: MetricDirection::Neutral,
            description: String::new(),
        },
    );
    let report = runner(&config, &store).run(&user, today()).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].metric_key, "glucose");
    assert_eq!(report.failures[0].error, "No policy defined for metric: glucose");
    assert!(!report.failures[0].recoverable);
    assert!(report.insights.iter().any(|i| i.metric_key == "sleep_duration"));
}

#[tokio::test]
async fn red_flag_and_out_of_range_values() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u1");
    store
        .add_signals((0..6).map(|d| reading(&user, "sleep_duration", d, 200.0)))
        .await;
    store
        .add_signal(reading(&user, "sleep_duration", 2, 1500.0))
        .await;

    let report = runner(&EngineConfig::default(), &store)
        .run(&user, today())
        .await
        .unwrap();

    assert_eq!(report.dropped_values, 1);
    let alerts: Vec<_> = report.safety_alerts().collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].metric_key, "sleep_duration");
    assert_eq!(alerts[0].confidence, 0.9);

    // Alerts are never suppressed
    let again = runner(&EngineConfig::default(), &store)
        .run(&user, today())
        .await
        .unwrap();
    assert_eq!(again.safety_alerts().count(), 1);
    assert!(again.suppressed.is_empty());
}
