//! Experiment evaluation command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use clap::Args;
use pulse_engine::{ExperimentId, ExperimentReport, ExperimentService};
use tracing::info;
use uuid::Uuid;

use crate::config::ConfigLoader;
use crate::state;

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Experiment ID (UUID)
    pub experiment: String,

    /// JSON state file holding signals, experiments and engine history
    #[arg(long)]
    pub state: PathBuf,

    /// Evaluation date, YYYY-MM-DD (default: today, UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not write results back to the state file
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: EvaluateArgs, config_path: Option<&Path>) -> Result<()> {
    let id = parse_experiment_id(&args.experiment)?;
    let config = ConfigLoader::load(config_path)?;
    let store = Arc::new(state::load(&args.state)?);
    let service = ExperimentService::new(&config, store.clone(), store.clone(), store.clone())?;
    let today = args.date.unwrap_or_else(|| Utc::now().date_naive());

    let report = service.evaluate(id, today).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !args.dry_run {
        state::save(&store, &args.state).await?;
        info!(path = %args.state.display(), "State saved");
    }
    Ok(())
}

fn parse_experiment_id(raw: &str) -> Result<ExperimentId> {
    let uuid = Uuid::parse_str(raw.trim()).map_err(|e| anyhow!("Invalid experiment ID {raw}: {e}"))?;
    if uuid.is_nil() {
        bail!("Invalid experiment ID {raw}: nil UUID");
    }
    Ok(ExperimentId(uuid))
}

fn print_report(report: &ExperimentReport) {
    println!("Experiment {} ({})", report.experiment_id, report.metric_key);
    println!("  {}", report.insight.title);
    println!("  {}", report.insight.summary);
    println!();

    match &report.evaluation {
        Some(evaluation) => {
            println!("Evaluation:");
            println!("  Verdict:      {}", evaluation.verdict);
            println!(
                "  Baseline:     {:.2} ± {:.2}",
                evaluation.baseline_mean, evaluation.baseline_std
            );
            println!(
                "  Intervention: {:.2} ± {:.2}",
                evaluation.intervention_mean, evaluation.intervention_std
            );
            println!("  Effect size:  {:.2}", evaluation.effect_size);
            println!("  Coverage:     {:.0}%", evaluation.coverage * 100.0);
            println!("  Adherence:    {:.0}%", evaluation.adherence_rate * 100.0);
            println!("  Confidence:   {:.2}", evaluation.confidence);
        }
        None => println!("Evaluation: not enough data in the comparison windows"),
    }

    if let Some(level) = report.level() {
        println!("  Level:        {} ({})", level.as_u8(), level.name());
    }
    println!();

    let decision = report.decision();
    println!("Decision: {}", decision.action);
    println!("  {}", decision.reason);

    if let Some(memory) = &report.memory {
        println!();
        println!(
            "Memory: {} {} {} ({}, evidence {}, confidence {:.2})",
            memory.driver_key,
            memory.direction.as_str(),
            memory.metric_key,
            memory.status.as_str(),
            memory.evidence_count,
            memory.confidence
        );
    }
    if report.dropped_values > 0 {
        println!();
        println!("Ignored {} out-of-range values", report.dropped_values);
    }
}
