#![warn(missing_docs)]
//! Deterministic testing surfaces: a lossy link model, a loopback harness
//! that drives real server and client sessions over it, scripted scenarios,
//! JSONL traces with a determinism digest, and run metrics.

mod harness;
mod link;
mod metrics;
mod scenario;
mod trace;

pub use harness::*;
pub use link::*;
pub use metrics::*;
pub use scenario::*;
pub use trace::*;

use anyhow::Result;

/// Run `scenario` on `harness` and summarise the run.
pub fn run_report(
    name: &str,
    harness: &mut LoopbackHarness,
    scenario: &ScenarioConfig,
) -> Result<MetricsReport> {
    scenario.run(harness)?;
    Ok(summarize(name, harness))
}

/// Metrics of everything `harness` has run so far.
pub fn summarize(name: &str, harness: &LoopbackHarness) -> MetricsReport {
    let digest = harness.digest();
    MetricsReportBuilder::new(name)
        .network(harness.network_metrics())
        .prediction(harness.prediction_report())
        .convergence(harness.convergence())
        .execution(TestExecutionMetrics {
            ticks: u64::from(harness.current_tick().0.saturating_sub(1)),
            duration_seconds: 0.0,
            trace_records: digest.records(),
            trace_digest: digest.hex(),
        })
        .build()
}
