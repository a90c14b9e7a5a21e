//! Insight detection, attribution and confidence governance for personal
//! health signals.
//!
//! The engine works on daily batches for one user at a time:
//!
//! - **Loop** ([`LoopRunner`]): red-flag safety checks, rolling baselines,
//!   change/trend/instability detectors, guardrails and suppression.
//! - **Experiments** ([`ExperimentService`]): lagged attribution, confounder
//!   interactions, baseline-vs-intervention verdicts, the next-step
//!   [`Decision`] and the per-user [`CausalMemory`] ledger.
//! - **Governance** ([`governance`]): evidence grades, the 1-5 confidence
//!   hierarchy and the claim-language governor every surfaced text passes.
//!
//! Storage stays outside the engine behind the [`SignalReader`],
//! [`ExperimentReader`] and [`EngineStore`] traits; [`InMemoryStore`]
//! implements all three.

pub mod attribution;
pub mod baseline;
pub mod confidence;
pub mod config;
pub mod decision;
pub mod detectors;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod governance;
pub mod insight;
pub mod memory;
pub mod registry;
pub mod runner;
pub mod safety;
pub mod signal;
pub mod stats;
pub mod store;
pub mod types;

// Configuration and errors
pub use config::{EngineConfig, WindowConfig};
pub use error::{BaselineError, BaselineErrorKind, EngineError, Result};

// Entry points
pub use experiment::{AdherenceEvent, Experiment, ExperimentReport, ExperimentService};
pub use runner::{LoopReport, LoopRunner, MetricFailure, SuppressedInsight};

// Payloads
pub use baseline::{Baseline, BaselineCalculator};
pub use decision::{Decision, DecisionAction, DecisionPolicy, DecisionRecord};
pub use evaluation::{EvaluationResult, Verdict};
pub use insight::{Insight, InsightCategory, InsightFactory, InsightStatus};
pub use memory::{CausalMemory, CausalMemoryAccumulator, MemoryDirection, MemoryStatus};
pub use signal::{DailySeries, DataPoint, DateWindow, Signal, SignalSource};

// Registry
pub use registry::{MetricDirection, MetricSpec, Registry};

// Storage seams
pub use store::{EngineStore, ExperimentReader, InMemoryStore, SignalReader, StoreSnapshot};

// ID types
pub use types::{idempotency_key, DecisionId, EvaluationId, ExperimentId, InsightId, UserId};
