//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a completion report was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Fresh report applied, marker cleared.
    Applied,
    /// Late report replaced a watchdog timeout.
    TimeoutOverwrite,
    /// Stale or duplicate report ignored.
    StaleDropped,
    /// Report kept in the local result buffer.
    Buffered,
    /// Report handed to the center.
    Forwarded,
}

impl ReportOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::TimeoutOverwrite => "timeout_overwrite",
            Self::StaleDropped => "stale_dropped",
            Self::Buffered => "buffered",
            Self::Forwarded => "forwarded",
        }
    }
}

const REPORT_OUTCOMES: [ReportOutcome; 5] = [
    ReportOutcome::Applied,
    ReportOutcome::TimeoutOverwrite,
    ReportOutcome::StaleDropped,
    ReportOutcome::Buffered,
    ReportOutcome::Forwarded,
];

/// Process-wide counters.
#[derive(Default)]
pub struct Metrics {
    reports: [AtomicU64; 5],
    replay_persisted: AtomicU64,
    replay_local_only: AtomicU64,
    replay_failed: AtomicU64,
}

impl Metrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a handled completion report.
    pub fn record_report(&self, outcome: ReportOutcome) {
        let idx = REPORT_OUTCOMES
            .iter()
            .position(|o| *o == outcome)
            .unwrap_or_default();
        self.reports[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Count the results of one replay.
    pub fn record_replay(&self, persisted: usize, local_only: usize, failed: usize) {
        self.replay_persisted
            .fetch_add(persisted as u64, Ordering::Relaxed);
        self.replay_local_only
            .fetch_add(local_only as u64, Ordering::Relaxed);
        self.replay_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Number of reports handled with `outcome`.
    pub fn reports(&self, outcome: ReportOutcome) -> u64 {
        REPORT_OUTCOMES
            .iter()
            .position(|o| *o == outcome)
            .map_or(0, |idx| self.reports[idx].load(Ordering::Relaxed))
    }

    /// Format every metric as Prometheus text.
    pub fn render(&self, buffer_len: usize) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "# HELP fleetrun_reports_total Completion reports by outcome"
        )
        .ok();
        writeln!(output, "# TYPE fleetrun_reports_total counter").ok();
        for (outcome, count) in REPORT_OUTCOMES.iter().zip(&self.reports) {
            writeln!(
                output,
                "fleetrun_reports_total{{outcome=\"{}\"}} {}",
                outcome.label(),
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP fleetrun_replay_results_total Buffered results handled by replay"
        )
        .ok();
        writeln!(output, "# TYPE fleetrun_replay_results_total counter").ok();
        let replay = [
            ("persisted", &self.replay_persisted),
            ("local_only", &self.replay_local_only),
            ("failed", &self.replay_failed),
        ];
        for (label, count) in replay {
            writeln!(
                output,
                "fleetrun_replay_results_total{{outcome=\"{label}\"}} {}",
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP fleetrun_result_buffer_len Results waiting for replay"
        )
        .ok();
        writeln!(output, "# TYPE fleetrun_result_buffer_len gauge").ok();
        writeln!(output, "fleetrun_result_buffer_len {buffer_len}").ok();

        output
    }
}
