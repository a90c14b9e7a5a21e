//! Causal memory inspection

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use pulse_engine::{CausalMemory, EngineStore, MemoryStatus, UserId};

use crate::state;

#[derive(Args, Debug)]
pub struct MemoryArgs {
    #[command(subcommand)]
    pub command: MemoryCommands,
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommands {
    /// List what the engine has learned for a user
    List {
        /// JSON state file
        #[arg(long)]
        state: PathBuf,

        /// User ID
        #[arg(long)]
        user: String,

        /// Filter by status (tentative, confirmed, deprecated)
        #[arg(long)]
        status: Option<String>,
    },
}

pub async fn run(args: MemoryArgs) -> Result<()> {
    match args.command {
        MemoryCommands::List {
            state,
            user,
            status,
        } => list_memories(&state, &user, status.as_deref()).await,
    }
}

async fn list_memories(path: &std::path::Path, user: &str, status: Option<&str>) -> Result<()> {
    let status = status
        .map(|s| {
            MemoryStatus::parse(s).ok_or_else(|| {
                anyhow!("Invalid status: {s}. Use: tentative, confirmed, deprecated")
            })
        })
        .transpose()?;

    let store = state::load(path)?;
    let memories = store.list_memories(&UserId::from(user), status).await?;
    if memories.is_empty() {
        println!("No memories for {user}.");
        return Ok(());
    }
    println!("{}", memory_table(&memories));
    Ok(())
}

fn memory_table(memories: &[CausalMemory]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Driver").fg(Color::Cyan),
            Cell::new("Metric").fg(Color::Cyan),
            Cell::new("Direction").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Evidence").fg(Color::Cyan),
            Cell::new("Confidence").fg(Color::Cyan),
            Cell::new("Last confirmed").fg(Color::Cyan),
        ]);

    for memory in memories {
        let status = Cell::new(memory.status.as_str());
        let status = match memory.status {
            MemoryStatus::Confirmed => status.fg(Color::Green),
            MemoryStatus::Deprecated => status.fg(Color::DarkGrey),
            MemoryStatus::Tentative => status,
        };
        table.add_row(vec![
            Cell::new(&memory.driver_key),
            Cell::new(&memory.metric_key),
            Cell::new(memory.direction.as_str()),
            status,
            Cell::new(memory.evidence_count),
            Cell::new(format!("{:.2}", memory.confidence)),
            Cell::new(memory.last_confirmed_at.format("%Y-%m-%d")),
        ]);
    }
    table
}
