// src/cli/commands.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rig Orchestrator CLI - GPU mining orchestration core
#[derive(Parser, Debug)]
#[command(name = "rig-orchestrator-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (run the orchestrator, rank coins, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the orchestrator application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Run the orchestrator daemon (telemetry, watchdog, auto-switch)
    Run(RunOptions),

    /// Rank the configured coins by estimated daily profit and exit
    Profit(ProfitOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for running the orchestrator daemon
#[derive(Parser, Debug)]
pub struct RunOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Start mining this coin immediately instead of waiting for the
    /// schedule or an operator command
    #[arg(long)]
    pub coin: Option<String>,
}

/// Options for the one-shot profitability ranking
#[derive(Parser, Debug)]
pub struct ProfitOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
