//! Lagged-effect attribution for intervention experiments.
//!
//! For each candidate lag the intervention window is compared to the
//! pre-intervention baseline with Cohen's d. An optional interaction pass
//! splits each lagged window by a day-level confounder to see whether the
//! effect depends on it.

mod interaction;
mod lagged;
mod types;

pub use interaction::{InteractionAnalyzer, InteractionConfig};
pub use lagged::{AttributionConfig, LaggedEffectEngine, LaggedInput};
pub use types::{
    pick_best, ranked, AttributionDetails, AttributionDirection, AttributionResult,
    InteractionEffect,
};

#[cfg(test)]
pub(crate) use types::fixtures;
