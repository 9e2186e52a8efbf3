use crate::config::SessionConfig;
use anyhow::{Context, Result};
use arena_core::FixedTimestep;
use arena_testkit::{summarize, JsonlSink, LoopbackHarness, MetricsReport, MetricsSink};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

pub struct HeadlessConfig {
    pub session: SessionConfig,
    pub trace: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
    /// Pace ticks against the wall clock instead of running flat out.
    pub realtime: bool,
}

pub fn run(cfg: HeadlessConfig) -> Result<MetricsReport> {
    let session = &cfg.session;
    let mut harness = LoopbackHarness::new(
        session.net.clone(),
        session.arena.sim_context(),
        session.link,
    )?;
    if let Some(path) = &cfg.trace {
        let sink = JsonlSink::create(path)
            .with_context(|| format!("Failed to open trace {}", path.display()))?;
        harness = harness.with_trace_sink(sink);
    }

    let scenario = &session.scenario;
    scenario.populate(&mut harness)?;
    info!(
        clients = harness.client_count(),
        ticks = scenario.ticks,
        latency = session.link.latency_ticks,
        loss = session.link.loss,
        "headless session started"
    );

    let started = Instant::now();
    let mut pacing = cfg
        .realtime
        .then(|| FixedTimestep::new(session.net.tick_rate_hz, session.net.max_ticks_per_frame));
    let mut last_frame = started;
    let mut step = 0;
    while step < scenario.ticks {
        let due = match &mut pacing {
            Some(timestep) => {
                std::thread::sleep(Duration::from_millis(1));
                let now = Instant::now();
                let due = timestep.accumulate((now - last_frame).as_secs_f32());
                last_frame = now;
                due
            }
            None => scenario.ticks - step,
        };
        for _ in 0..due.min(scenario.ticks - step) {
            scenario.drive(&mut harness, step);
            harness.step()?;
            step += 1;
        }
    }

    let mut report = summarize("headless", &harness);
    report.test_execution.duration_seconds = started.elapsed().as_secs_f64();
    if let Some(path) = &cfg.metrics {
        MetricsSink::create(path)?.write(&report)?;
        info!("metrics written to {}", path.display());
    }
    Ok(report)
}
