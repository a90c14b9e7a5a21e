//! Experiment evaluation through the public API

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use pulse_engine::governance::ConfidenceLevel;
use pulse_engine::{
    DecisionAction, EngineConfig, EngineStore, Experiment, ExperimentId, ExperimentService,
    InMemoryStore, MemoryStatus, Signal, SignalSource, UserId, Verdict,
};

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + Duration::days(offset)
}

fn hrv(user: &UserId, offset: i64, value: f64) -> Signal {
    let ts = day(offset).and_hms_opt(6, 0, 0).unwrap().and_utc();
    Signal::new(user.clone(), "hrv_rmssd", value, "ms", ts, SignalSource::Wearable)
}

async fn seed(store: &InMemoryStore, user: &UserId) -> Experiment {
    store
        .add_signals(
            (-17..0)
                .map(|i| hrv(user, i, if i % 2 == 0 { 40.0 } else { 44.0 }))
                .chain((0..20).map(|i| hrv(user, i, if i % 2 == 0 { 50.0 } else { 54.0 }))),
        )
        .await;
    let experiment = Experiment {
        id: ExperimentId::new(),
        user_id: user.clone(),
        intervention_key: "omega3".into(),
        metric_key: "hrv_rmssd".into(),
        started_on: day(0),
        ended_on: Some(day(13)),
        confounder_keys: Vec::new(),
    };
    store.add_experiment(experiment.clone()).await;
    experiment
}

#[tokio::test]
async fn third_helpful_evaluation_is_reconfirmed() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u7");
    let experiment = seed(&store, &user).await;
    let service =
        ExperimentService::new(&EngineConfig::default(), store.clone(), store.clone(), store.clone())
            .unwrap();

    let mut levels = Vec::new();
    for _ in 0..3 {
        let report = service.evaluate(experiment.id, day(30)).await.unwrap();
        assert_eq!(report.evaluation.as_ref().unwrap().verdict, Verdict::Helpful);
        assert_eq!(report.decision().action, DecisionAction::Continue);
        levels.push(report.level().unwrap());
    }
    assert_eq!(
        levels,
        vec![
            ConfidenceLevel::Evaluated,
            ConfidenceLevel::Evaluated,
            ConfidenceLevel::Reconfirmed
        ]
    );

    let confirmed = store
        .list_memories(&user, Some(MemoryStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].driver_key, "omega3");
    assert_eq!(confirmed[0].evidence_count, 3);

    let history = store.evaluation_history(&user, "hrv_rmssd", 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(store.decisions(&user).await.len(), 3);
}

#[tokio::test]
async fn omega3_tests_its_long_lag() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("u7");
    let experiment = seed(&store, &user).await;
    let service =
        ExperimentService::new(&EngineConfig::default(), store.clone(), store.clone(), store.clone())
            .unwrap();

    let report = service.evaluate(experiment.id, day(30)).await.unwrap();
    // Driver registry allows lags up to 7 days; data runs out after day 19
    let lags: Vec<u32> = report.attributions.iter().map(|a| a.lag_days).collect();
    assert_eq!(lags, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert!(report.attributions.iter().all(|a| a.effect_size > 0.0));
}
