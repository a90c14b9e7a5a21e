//! Experiments and the service that evaluates them.
//!
//! One call to [`ExperimentService::evaluate`] is one unit of work: lagged
//! attribution, confounder interactions, baseline-vs-intervention
//! evaluation, hierarchy classification, the next-step decision and the
//! causal-memory update, persisted together.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attribution::{
    AttributionResult, InteractionAnalyzer, InteractionEffect, LaggedEffectEngine, LaggedInput,
};
use crate::config::EngineConfig;
use crate::confidence::ConfidenceScorer;
use crate::decision::{Decision, DecisionPolicy, DecisionRecord};
use crate::error::{EngineError, Result};
use crate::evaluation::{
    interaction_adjustment, AttributionEvaluator, AttributionVerdict, EvaluationCalculator,
    EvaluationInput, EvaluationResult, InteractionAdjustment,
};
use crate::governance::{ConfidenceLevel, DecisionSignal, SignalClassifier, SignalOrigin};
use crate::insight::{Insight, InsightFactory};
use crate::memory::{CausalMemory, CausalMemoryAccumulator, DriverRef, MemoryOutcome};
use crate::registry::{DriverType, Registry};
use crate::signal::{DailySeries, DataPoint, DateWindow};
use crate::store::{EngineStore, ExperimentReader, SignalReader};
use crate::types::{ExperimentId, UserId};

/// An n-of-1 experiment: one intervention against one target metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub user_id: UserId,
    /// Intervention or driver key, e.g. `magnesium_glycinate`
    pub intervention_key: String,
    pub metric_key: String,
    pub started_on: NaiveDate,
    /// Last planned day, inclusive; open-ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_on: Option<NaiveDate>,
    /// Behavior flags to test for interactions; every logged flag when empty
    #[serde(default)]
    pub confounder_keys: Vec<String>,
}

impl Experiment {
    /// `[started_on, min(ended_on or today, today)]`
    pub fn active_window(&self, today: NaiveDate) -> DateWindow {
        let last = self.ended_on.map_or(today, |end| end.min(today));
        DateWindow::new(self.started_on, last)
    }
}

/// One logged dose (or missed dose) of an experiment's intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceEvent {
    pub experiment_id: ExperimentId,
    pub timestamp: DateTime<Utc>,
    pub taken: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Everything produced by one experiment evaluation
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub experiment_id: ExperimentId,
    pub user_id: UserId,
    pub metric_key: String,
    /// Out-of-range values ignored before any statistics
    pub dropped_values: usize,
    pub attributions: Vec<AttributionResult>,
    /// Attributions annotated with a confounder split
    pub interactions: Vec<AttributionResult>,
    pub attribution_verdict: AttributionVerdict,
    pub interaction: InteractionAdjustment,
    pub insight: Insight,
    /// Absent when either evaluation window had no data
    pub evaluation: Option<EvaluationResult>,
    pub signal: Option<DecisionSignal>,
    pub decision: DecisionRecord,
    pub memory: Option<CausalMemory>,
    pub memory_outcome: Option<MemoryOutcome>,
}

impl ExperimentReport {
    pub fn level(&self) -> Option<ConfidenceLevel> {
        self.signal.as_ref().map(|s| s.level)
    }

    pub fn decision(&self) -> &Decision {
        &self.decision.decision
    }
}

/// Runs the experiment pipeline against injected collaborators
pub struct ExperimentService {
    signals: Arc<dyn SignalReader>,
    experiments: Arc<dyn ExperimentReader>,
    store: Arc<dyn EngineStore>,
    registry: Arc<Registry>,
    lagged: LaggedEffectEngine,
    interactions: InteractionAnalyzer,
    attribution_evaluator: AttributionEvaluator,
    calculator: EvaluationCalculator,
    classifier: SignalClassifier,
    decisions: DecisionPolicy,
    memory: CausalMemoryAccumulator,
    factory: InsightFactory,
    interaction_threshold: f64,
    history_limit: usize,
}

impl ExperimentService {
    pub fn new(
        config: &EngineConfig,
        signals: Arc<dyn SignalReader>,
        experiments: Arc<dyn ExperimentReader>,
        store: Arc<dyn EngineStore>,
    ) -> Result<Self> {
        let factory = InsightFactory::new(
            ConfidenceScorer::with_weights(config.confidence.clone()),
            config.governance.rubric.clone(),
            config.governance.claim_governor()?,
        );
        Ok(Self {
            signals,
            experiments,
            store,
            registry: Arc::new(config.registry.clone()),
            lagged: LaggedEffectEngine::with_config(config.attribution.clone()),
            interactions: InteractionAnalyzer::with_config(config.interaction.clone()),
            attribution_evaluator: AttributionEvaluator::with_config(config.evaluation.clone()),
            calculator: EvaluationCalculator::with_config(config.evaluation.clone()),
            classifier: config.governance.signal_classifier(),
            decisions: DecisionPolicy::with_config(config.decision.clone()),
            memory: CausalMemoryAccumulator::with_policy(config.memory.clone()),
            factory,
            interaction_threshold: config.evaluation.interaction_threshold,
            history_limit: config.governance.hierarchy.history_limit,
        })
    }

    /// Evaluate an experiment as of `today` and persist every result
    pub async fn evaluate(
        &self,
        experiment_id: ExperimentId,
        today: NaiveDate,
    ) -> Result<ExperimentReport> {
        let experiment = self
            .experiments
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;
        let user_id = &experiment.user_id;
        let metric_key = experiment.metric_key.as_str();
        let spec = self.registry.get_metric_spec(metric_key)?;
        let polarity = spec.direction;

        let (baseline_window, intervention_window) =
            self.calculator
                .windows(experiment.started_on, experiment.ended_on, today);
        if intervention_window.end < intervention_window.start {
            return Err(EngineError::NotEnoughData(format!(
                "experiment {experiment_id} starts after {today}"
            )));
        }

        // Attribution covers the whole experiment, evaluation only its first weeks
        let attribution_window = experiment.active_window(today);

        info!(
            experiment_id = %experiment_id,
            user_id = %user_id,
            intervention_key = %experiment.intervention_key,
            metric_key,
            "evaluating experiment"
        );

        let lagged_input = LaggedInput {
            user_id,
            experiment_id,
            intervention_key: &experiment.intervention_key,
            metric_key,
            polarity,
            start: attribution_window.start,
            end: attribution_window.end,
            max_lag_days: self
                .registry
                .get_driver(&experiment.intervention_key)
                .map(|d| d.max_lag_days),
        };
        let span = span(
            &self.lagged.required_window(&lagged_input),
            &self
                .calculator
                .required_window(&baseline_window, &intervention_window),
        );

        let (start, end) = span.bounds();
        let points = self
            .signals
            .get_values(user_id, metric_key, start, end)
            .await?;
        let total = points.len();
        let valid: Vec<DataPoint> = points
            .into_iter()
            .filter(|p| spec.is_in_range(p.value))
            .collect();
        let dropped_values = total - valid.len();
        if dropped_values > 0 {
            warn!(metric_key, dropped_values, "ignoring out-of-range values");
        }
        let series = DailySeries::from_points(&valid);

        // Attribution and interactions
        let attributions = self.lagged.run(&lagged_input, &series);
        let behaviors = self.signals.get_behaviors(user_id, &span).await?;
        let confounders: Vec<String> = if experiment.confounder_keys.is_empty() {
            behaviors.keys().into_iter().map(str::to_string).collect()
        } else {
            experiment.confounder_keys.clone()
        };
        let interactions: Vec<AttributionResult> = confounders
            .iter()
            .flat_map(|key| {
                self.interactions.run(
                    &attributions,
                    &series,
                    &attribution_window,
                    &behaviors,
                    key,
                    polarity,
                )
            })
            .collect();

        let attribution_verdict = self.attribution_evaluator.evaluate(&attributions);
        let best_lag = attribution_verdict.best.as_ref().map(|b| b.best_lag_days);
        let effects: Vec<InteractionEffect> = interactions
            .iter()
            .filter(|r| Some(r.lag_days) == best_lag)
            .filter_map(|r| r.interaction.clone())
            .collect();
        let interaction = interaction_adjustment(&effects, self.interaction_threshold);
        debug!(
            lags = attributions.len(),
            interactions = interactions.len(),
            verdict = attribution_verdict.verdict.as_str(),
            "attribution complete"
        );

        let now = Utc::now();
        let insight = self.factory.from_attributions(
            user_id,
            experiment_id,
            &experiment.intervention_key,
            metric_key,
            &attributions,
            now,
        );

        // Evaluation
        let adherence = self.experiments.adherence_events(experiment_id).await?;
        let evaluation = match self.calculator.evaluate(&EvaluationInput {
            user_id,
            experiment_id,
            metric_key,
            polarity,
            baseline_window,
            intervention_window,
            series: &series,
            adherence: &adherence,
        }) {
            Ok(evaluation) => Some(evaluation),
            Err(EngineError::NotEnoughData(reason)) => {
                warn!(experiment_id = %experiment_id, %reason, "evaluation skipped");
                None
            }
            Err(e) => return Err(e),
        };

        let signal = match &evaluation {
            Some(evaluation) => {
                let history = self
                    .store
                    .evaluation_history(user_id, metric_key, self.history_limit)
                    .await?;
                let level = self.classifier.classify_evaluation(evaluation, &history);
                let repeats = history
                    .iter()
                    .filter(|e| e.id != evaluation.id && e.verdict == evaluation.verdict)
                    .count();
                Some(self.classifier.signal(
                    user_id,
                    SignalOrigin::Evaluation,
                    evaluation.id.to_string(),
                    metric_key,
                    level,
                    evaluation.confidence,
                    u32::try_from(repeats + 1).unwrap_or(u32::MAX),
                    Some(evaluation.details.explanation.clone()),
                ))
            }
            None => None,
        };

        // Decision: the evaluation verdict when there is one
        let (verdict, confidence) = evaluation
            .as_ref()
            .map_or((attribution_verdict.verdict, attribution_verdict.confidence), |e| {
                (e.verdict, e.confidence)
            });
        let decision = self.decisions.decide(
            verdict,
            confidence,
            attribution_verdict.best.as_ref(),
            interaction.note.as_deref(),
        );
        let decision = DecisionRecord::new(
            user_id.clone(),
            experiment_id,
            evaluation.as_ref().map(|e| e.id),
            decision,
        );

        // Causal memory
        let memory_update = match &evaluation {
            Some(evaluation) => {
                let driver_type = self
                    .registry
                    .get_driver(&experiment.intervention_key)
                    .map_or_else(
                        || DriverType::infer(&experiment.intervention_key),
                        |d| d.driver_type,
                    );
                let existing = self
                    .store
                    .get_memory(user_id, &experiment.intervention_key, metric_key)
                    .await?;
                self.memory.apply(
                    existing,
                    DriverRef {
                        driver_key: &experiment.intervention_key,
                        driver_type,
                    },
                    evaluation,
                    now,
                )
            }
            None => None,
        };

        // Persist
        self.store.save_attributions(&attributions).await?;
        if !interactions.is_empty() {
            self.store.save_attributions(&interactions).await?;
        }
        self.store.save_insight(&insight).await?;
        if let Some(evaluation) = &evaluation {
            self.store.save_evaluation(evaluation).await?;
        }
        if let Some(signal) = &signal {
            self.store.save_signal(signal).await?;
        }
        self.store.save_decision(&decision).await?;
        if let Some((memory, _)) = &memory_update {
            self.store.save_memory(memory).await?;
        }

        let (memory, memory_outcome) = match memory_update {
            Some((memory, outcome)) => (Some(memory), Some(outcome)),
            None => (None, None),
        };

        info!(
            experiment_id = %experiment_id,
            verdict = verdict.as_str(),
            action = decision.decision.action.as_str(),
            level = ?signal.as_ref().map(|s| s.level),
            "experiment evaluated"
        );

        Ok(ExperimentReport {
            experiment_id,
            user_id: user_id.clone(),
            metric_key: metric_key.to_string(),
            dropped_values,
            attributions,
            interactions,
            attribution_verdict,
            interaction,
            insight,
            evaluation,
            signal,
            decision,
            memory,
            memory_outcome,
        })
    }
}

fn span(a: &DateWindow, b: &DateWindow) -> DateWindow {
    DateWindow::new(a.start.min(b.start), a.end.max(b.end))
}
