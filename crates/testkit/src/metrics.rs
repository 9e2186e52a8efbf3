//! Standardized metrics collection and reporting for CI integration.
//!
//! A [`MetricsReport`] summarises one harness run: link traffic, prediction
//! accuracy of every predicting client, whether the clients converged on
//! the server's state, and the trace digest. Reports are exported as JSON.

use anyhow::{Context, Result};
use arena_net::PredictionMetrics;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Top-level metrics report of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Run identifier
    pub test_name: String,

    /// Overall result
    pub result: TestResult,

    /// Link traffic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkMetrics>,

    /// Prediction accuracy summed over predicting clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionReport>,

    /// Client/server agreement at the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceMetrics>,

    /// Execution metrics
    pub test_execution: TestExecutionMetrics,
}

/// Overall run result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Every client converged
    Pass,
    /// Some client ended away from the server state
    Fail,
    /// Nothing was simulated
    Skip,
}

/// Traffic over every simulated link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Datagrams handed to links
    pub messages_sent: u64,

    /// Datagrams delivered
    pub messages_received: u64,

    /// Datagrams lost
    pub messages_dropped: u64,

    /// Bytes handed to links
    pub bytes_sent: u64,

    /// Frames that failed to decode on arrival
    pub rejected_frames: u64,
}

/// Prediction counters summed over clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    /// Clients that predict (hosts do not)
    pub clients: usize,

    /// Predicted ticks
    pub total_predictions: u64,

    /// State messages that matched
    pub confirmations: u64,

    /// State messages that disagreed
    pub mismatches: u64,

    /// Rewind-and-replay passes
    pub corrections: u64,

    /// Corrections that snapped
    pub hard_snaps: u64,

    /// Re-simulated ticks
    pub replayed_ticks: u64,

    /// Ticks skipped during replay
    pub skipped_ticks: u64,

    /// Stale or future state messages
    pub rejected_messages: u64,

    /// Largest mismatch distance seen by any client
    pub max_error_distance: f64,
}

impl PredictionReport {
    /// Add one client's counters.
    pub fn absorb(&mut self, metrics: &PredictionMetrics) {
        self.clients += 1;
        self.total_predictions += metrics.total_predictions;
        self.confirmations += metrics.confirmations;
        self.mismatches += metrics.mismatches;
        self.corrections += metrics.corrections;
        self.hard_snaps += metrics.hard_snaps;
        self.replayed_ticks += metrics.replayed_ticks;
        self.skipped_ticks += metrics.skipped_ticks;
        self.rejected_messages += metrics.rejected_messages;
        self.max_error_distance = self
            .max_error_distance
            .max(f64::from(metrics.max_error_distance));
    }
}

/// End-of-run agreement between clients and server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMetrics {
    /// Largest distance between a client's simulated entity and the server's
    pub final_position_error: f64,

    /// Largest visual offset still being smoothed
    pub final_offset: f64,

    /// Both of the above are under their tolerance
    pub converged: bool,
}

/// Execution metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionMetrics {
    /// Harness ticks run
    pub ticks: u64,

    /// Wall-clock duration (seconds)
    pub duration_seconds: f64,

    /// Trace records folded into the digest
    pub trace_records: u64,

    /// Hex digest of the trace
    pub trace_digest: String,
}

/// Builder for constructing metrics reports
pub struct MetricsReportBuilder {
    report: MetricsReport,
}

impl MetricsReportBuilder {
    /// Create a new builder with run name
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            report: MetricsReport {
                test_name: test_name.into(),
                result: TestResult::Skip,
                network: None,
                prediction: None,
                convergence: None,
                test_execution: TestExecutionMetrics::default(),
            },
        }
    }

    /// Set result
    pub fn result(mut self, result: TestResult) -> Self {
        self.report.result = result;
        self
    }

    /// Set network metrics
    pub fn network(mut self, metrics: NetworkMetrics) -> Self {
        self.report.network = Some(metrics);
        self
    }

    /// Set prediction metrics
    pub fn prediction(mut self, metrics: PredictionReport) -> Self {
        self.report.prediction = Some(metrics);
        self
    }

    /// Set convergence metrics; also decides the result
    pub fn convergence(mut self, metrics: ConvergenceMetrics) -> Self {
        self.report.result = if metrics.converged {
            TestResult::Pass
        } else {
            TestResult::Fail
        };
        self.report.convergence = Some(metrics);
        self
    }

    /// Set execution metrics
    pub fn execution(mut self, metrics: TestExecutionMetrics) -> Self {
        self.report.test_execution = metrics;
        self
    }

    /// Build the metrics report
    pub fn build(self) -> MetricsReport {
        self.report
    }
}

/// Sink for writing metrics reports to JSON files
pub struct MetricsSink {
    path: std::path::PathBuf,
}

impl MetricsSink {
    /// Create a new metrics sink at the specified path
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        Ok(Self { path })
    }

    /// Write metrics report to file
    pub fn write(&self, report: &MetricsReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
