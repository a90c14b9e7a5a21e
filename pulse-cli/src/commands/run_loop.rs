//! Daily insight loop command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use pulse_engine::{LoopReport, LoopRunner, UserId};
use tracing::info;

use crate::config::ConfigLoader;
use crate::state;

#[derive(Args, Debug)]
pub struct LoopArgs {
    /// JSON state file holding signals and engine history
    #[arg(long)]
    pub state: PathBuf,

    /// Only run for this user (default: every user with signals)
    #[arg(long)]
    pub user: Option<String>,

    /// Run date, YYYY-MM-DD (default: today, UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Print reports as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Do not write results back to the state file
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: LoopArgs, config_path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let store = Arc::new(state::load(&args.state)?);
    let runner = LoopRunner::new(&config, store.clone(), store.clone())?;
    let today = args.date.unwrap_or_else(|| Utc::now().date_naive());

    let users = match args.user {
        Some(user) => vec![UserId::from(user)],
        None => store.users().await,
    };
    if users.is_empty() {
        bail!("No users found in {}", args.state.display());
    }

    let mut reports = Vec::with_capacity(users.len());
    for user in &users {
        reports.push(runner.run(user, today).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    if !args.dry_run {
        state::save(&store, &args.state).await?;
        info!(path = %args.state.display(), "State saved");
    }
    Ok(())
}

fn print_report(report: &LoopReport) {
    println!("{} on {} ({})", report.user_id, report.run_date, report.idempotency_key);

    if report.insights.is_empty() {
        println!("  No new insights.");
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Metric").fg(Color::Cyan),
                Cell::new("Category").fg(Color::Cyan),
                Cell::new("Confidence").fg(Color::Cyan),
                Cell::new("Summary").fg(Color::Cyan),
            ]);
        for insight in &report.insights {
            let category = Cell::new(insight.category.as_str());
            let category = if insight.is_safety_alert() {
                category.fg(Color::Red)
            } else {
                category
            };
            table.add_row(vec![
                Cell::new(&insight.metric_key),
                category,
                Cell::new(format!("{:.2}", insight.confidence)),
                Cell::new(&insight.summary),
            ]);
        }
        println!("{table}");
    }

    println!(
        "  baselines updated: {}, suppressed: {}, filtered: {}, capped: {}, dropped values: {}",
        report.baselines_updated,
        report.suppressed.len(),
        report.filtered,
        report.capped.len(),
        report.dropped_values
    );
    for failure in &report.failures {
        let hint = if failure.recoverable { " (retry later)" } else { "" };
        println!("  {} failed: {}{}", failure.metric_key, failure.error, hint);
    }
    println!();
}
