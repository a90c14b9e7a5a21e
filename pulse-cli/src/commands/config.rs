use std::path::Path;

use crate::config::ConfigLoader;
use anyhow::Result;
use clap::{Args, Subcommand};
use pulse_engine::EngineConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show the configuration file path
    Path,
    /// Print the default configuration as TOML
    Default,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(config_path),
        ConfigCommands::Path => show_path(config_path),
        ConfigCommands::Default => show_default(),
    }
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    println!("{}", config.to_toml_string()?);
    Ok(())
}

fn show_path(config_path: Option<&Path>) -> Result<()> {
    match config_path {
        Some(path) => println!("Config: {}", path.display()),
        None => match ConfigLoader::user_config_path() {
            Some(path) => {
                let state = if path.exists() { "" } else { " (not found, using defaults)" };
                println!("Config: {}{}", path.display(), state);
            }
            None => println!("Config: no user config directory, using defaults"),
        },
    }
    Ok(())
}

fn show_default() -> Result<()> {
    println!("{}", EngineConfig::default().to_toml_string()?);
    Ok(())
}
