//! Prometheus metrics for a taskhal device.
//!
//! Each device owns its own [`Registry`]; nothing is registered globally, so
//! several devices (or tests) never share counters.
//!
//! # Metrics
//!
//! ## Counters
//! - `taskhal_tasks_executed_total{kind, outcome}` - Task-graph nodes run by the executor
//! - `taskhal_fragments_retired_total{queue, outcome}` - Fragments that reached their retire task
//! - `taskhal_host_waits_total{mode, outcome}` - Blocking host waits on semaphores
//!
//! ## Gauges
//! - `taskhal_fragments_in_flight` - Fragments submitted but not yet retired
//!
//! ## Histograms
//! - `taskhal_fragment_duration_seconds{queue}` - Submission to retirement latency

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use taskhal_core::QueueId;

/// Histogram buckets for fragment latency (in seconds).
const FRAGMENT_DURATION_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Outcome label of an executed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The payload ran and succeeded.
    Succeeded,
    /// The payload returned an error.
    Failed,
    /// The payload panicked.
    Panicked,
    /// The fragment had already failed; the payload did not run.
    Skipped,
}

impl TaskOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::Skipped => "skipped",
        }
    }
}

/// Device metrics registry.
pub struct Metrics {
    registry: Registry,
    /// Tasks executed by payload kind and outcome.
    pub tasks_executed: IntCounterVec,
    /// Fragments retired by queue and outcome.
    pub fragments_retired: IntCounterVec,
    /// Host waits by mode and outcome.
    pub host_waits: IntCounterVec,
    /// Fragments currently in flight.
    pub fragments_in_flight: IntGauge,
    /// Fragment latency by queue.
    pub fragment_duration: HistogramVec,
}

impl Metrics {
    /// Create a registry with every taskhal metric registered.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_executed = IntCounterVec::new(
            Opts::new("tasks_executed_total", "Task-graph nodes run by the executor")
                .namespace("taskhal"),
            &["kind", "outcome"],
        )?;

        let fragments_retired = IntCounterVec::new(
            Opts::new("fragments_retired_total", "Fragments that reached retirement")
                .namespace("taskhal"),
            &["queue", "outcome"],
        )?;

        let host_waits = IntCounterVec::new(
            Opts::new("host_waits_total", "Blocking host waits on semaphores").namespace("taskhal"),
            &["mode", "outcome"],
        )?;

        let fragments_in_flight = IntGauge::with_opts(
            Opts::new("fragments_in_flight", "Fragments submitted but not yet retired")
                .namespace("taskhal"),
        )?;

        let fragment_duration = HistogramVec::new(
            HistogramOpts::new(
                "fragment_duration_seconds",
                "Time from submission to retirement in seconds",
            )
            .namespace("taskhal")
            .buckets(FRAGMENT_DURATION_BUCKETS.to_vec()),
            &["queue"],
        )?;

        registry.register(Box::new(tasks_executed.clone()))?;
        registry.register(Box::new(fragments_retired.clone()))?;
        registry.register(Box::new(host_waits.clone()))?;
        registry.register(Box::new(fragments_in_flight.clone()))?;
        registry.register(Box::new(fragment_duration.clone()))?;

        Ok(Self {
            registry,
            tasks_executed,
            fragments_retired,
            host_waits,
            fragments_in_flight,
            fragment_duration,
        })
    }

    /// Record one executed task.
    pub fn record_task(&self, kind: &str, outcome: TaskOutcome) {
        self.tasks_executed
            .with_label_values(&[kind, outcome.as_str()])
            .inc();
    }

    /// Record a submitted fragment.
    pub fn record_fragment_submitted(&self) {
        self.fragments_in_flight.inc();
    }

    /// Record a retired fragment.
    pub fn record_fragment_retired(&self, queue_id: QueueId, succeeded: bool, seconds: f64) {
        let queue = queue_id.to_string();
        let outcome = if succeeded { "succeeded" } else { "failed" };
        self.fragments_retired
            .with_label_values(&[queue.as_str(), outcome])
            .inc();
        self.fragment_duration
            .with_label_values(&[queue.as_str()])
            .observe(seconds);
        self.fragments_in_flight.dec();
    }

    /// Record a finished host wait.
    pub fn record_host_wait(&self, mode: &str, outcome: &str) {
        self.host_waits.with_label_values(&[mode, outcome]).inc();
    }

    /// The underlying registry, for exporting alongside other metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("fragments_in_flight", &self.fragments_in_flight.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_task("dispatch", TaskOutcome::Succeeded);
        assert_eq!(
            a.tasks_executed
                .with_label_values(&["dispatch", "succeeded"])
                .get(),
            1
        );
        assert_eq!(
            b.tasks_executed
                .with_label_values(&["dispatch", "succeeded"])
                .get(),
            0
        );
    }

    #[test]
    fn fragment_lifecycle_is_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_fragment_submitted();
        assert_eq!(metrics.fragments_in_flight.get(), 1);
        metrics.record_fragment_retired(QueueId::new(0), false, 0.002);
        assert_eq!(metrics.fragments_in_flight.get(), 0);

        let output = metrics.encode().unwrap();
        assert!(output.contains("taskhal_fragments_retired_total"));
        assert!(output.contains("queue=\"queue_0\""));
        assert!(output.contains("taskhal_fragment_duration_seconds"));
    }
}
