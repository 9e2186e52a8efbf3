//! arena-netcode - headless loopback runner for the netcode core
//!
//! Runs scripted clients against an authoritative server over simulated
//! lossy links and reports prediction accuracy and convergence.

mod config;
mod headless;

use anyhow::Result;
use clap::Parser;
use config::SessionConfig;
use headless::HeadlessConfig;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a loopback netcode session", long_about = None)]
struct Args {
    /// Session config (TOML); missing or malformed files fall back to defaults
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the number of ticks to run
    #[arg(long)]
    ticks: Option<u32>,
    /// Override the number of predicting clients
    #[arg(long)]
    clients: Option<usize>,
    /// Add a host client that shares the server's process
    #[arg(long)]
    host: bool,
    /// Override the link RNG seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override one-way link latency in ticks
    #[arg(long)]
    latency: Option<u32>,
    /// Override unreliable loss probability
    #[arg(long)]
    loss: Option<f64>,
    /// Write every traced entity transform as JSON lines
    #[arg(long)]
    trace: Option<PathBuf>,
    /// Write the run report as JSON
    #[arg(long)]
    metrics: Option<PathBuf>,
    /// Pace ticks at the configured tick rate
    #[arg(long)]
    realtime: bool,
    /// Exit with an error unless every client converged
    #[arg(long)]
    check: bool,
}

impl Args {
    fn apply(&self, session: &mut SessionConfig) {
        if let Some(ticks) = self.ticks {
            session.scenario.ticks = ticks;
            // Leave time for everyone to settle once input stops.
            session.scenario.input_ticks = session.scenario.input_ticks.min(ticks * 5 / 8);
        }
        if let Some(clients) = self.clients {
            session.scenario.clients = clients;
        }
        if self.host {
            session.scenario.with_host = true;
        }
        if let Some(seed) = self.seed {
            session.link.seed = seed;
        }
        if let Some(latency) = self.latency {
            session.link.latency_ticks = latency;
        }
        if let Some(loss) = self.loss {
            session.link.loss = loss;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting arena-netcode v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut session = SessionConfig::load_from_path(&args.config);
    args.apply(&mut session);
    session.verify()?;

    let report = headless::run(HeadlessConfig {
        session,
        trace: args.trace.clone(),
        metrics: args.metrics.clone(),
        realtime: args.realtime,
    })?;

    if let Some(prediction) = &report.prediction {
        info!(
            clients = prediction.clients,
            predictions = prediction.total_predictions,
            mismatches = prediction.mismatches,
            corrections = prediction.corrections,
            hard_snaps = prediction.hard_snaps,
            max_error = prediction.max_error_distance,
            "prediction summary"
        );
    }
    if let Some(network) = &report.network {
        info!(
            sent = network.messages_sent,
            dropped = network.messages_dropped,
            bytes = network.bytes_sent,
            "link summary"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    let converged = report
        .convergence
        .as_ref()
        .is_some_and(|convergence| convergence.converged);
    if !converged {
        warn!(digest = %report.test_execution.trace_digest, "clients did not converge");
        if args.check {
            anyhow::bail!("clients did not converge on the server state");
        }
    }
    Ok(())
}
