//! Adaptive Risk-Weighted Decision Engine
//!
//! Command-line front end for one decision step at a time:
//! - Evaluates a batch of candidates into admitted, resized or rejected plans
//! - Closes open positions whose target or stop was hit
//! - Runs or resets the adaptive parameter learner
//!
//! Scheduling (e.g. hourly cycles) is left to the caller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use adaptive_risk_engine::agent::{DecisionAgent, Quote};
use adaptive_risk_engine::config::AppConfig;
use adaptive_risk_engine::store::JsonFileStore;
use adaptive_risk_engine::telemetry::{init_logging, init_metrics};
use adaptive_risk_engine::utils::helpers::SystemClock;
use adaptive_risk_engine::utils::types::Candidate;

/// Adaptive risk-weighted trade decision engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one decision cycle over a JSON array of candidates
    Evaluate {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Check open positions against a JSON array of quotes
    Close {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Run the parameter learner now
    Learn,
    /// Print the current parameter set
    Params,
    /// Reset every parameter to its default
    ResetParams,
    /// Print open positions
    Positions,
    /// Print performance metrics over the trade history
    Performance,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => {
            let config = AppConfig::default();
            config.validate()?;
            config
        }
    };

    if let Some(level) = args.log_level {
        config.telemetry.log_level = level;
    }

    let _log_guard = init_logging(&config.telemetry)?;
    info!("Starting adaptive risk engine v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let store = Arc::new(JsonFileStore::new(config.storage.data_dir.clone()));
    let agent = DecisionAgent::new(config, store, Arc::new(SystemClock));
    agent.load().await;

    match args.command {
        Command::Evaluate { input } => {
            let candidates: Vec<Candidate> = read_json(&input)?;
            info!("Evaluating {} candidates", candidates.len());
            let report = agent.run_cycle(candidates).await;
            print_json(&report)?;
        }
        Command::Close { input } => {
            let quotes: Vec<Quote> = read_json(&input)?;
            let closed = agent.evaluate_positions(&quotes).await;
            info!("{} positions closed", closed.len());
            print_json(&closed)?;
        }
        Command::Learn => {
            let report = agent.learn_now().await.context("Learning run failed")?;
            print_json(&report)?;
        }
        Command::Params => {
            print_json(agent.parameters().as_ref())?;
        }
        Command::ResetParams => {
            agent.reset_parameters().await;
            print_json(agent.parameters().as_ref())?;
        }
        Command::Positions => {
            print_json(&agent.open_positions().await)?;
        }
        Command::Performance => {
            print_json(&agent.performance().await)?;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse input file: {:?}", path))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
