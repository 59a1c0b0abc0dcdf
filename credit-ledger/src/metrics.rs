//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `credit_ledger_ops_total{op}` - Successful operations by kind
//! - `credit_ledger_conflicts_total` - Operations lost to write conflicts
//! - `credit_ledger_insufficient_total` - Reserves/transfers short on balance
//! - `credit_ledger_entries_total` - Journal entries appended
//! - `credit_ledger_op_duration_seconds` - Operation latency histogram

use crate::Error;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Successful operations, labeled by operation name
    pub ops_total: IntCounterVec,

    /// Operations that exhausted their conflict retries
    pub conflicts_total: IntCounter,

    /// Reserves and transfers rejected for insufficient balance
    pub insufficient_total: IntCounter,

    /// Journal entries appended
    pub entries_total: IntCounter,

    /// Operation latency histogram
    pub op_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ops_total = IntCounterVec::new(
            Opts::new("credit_ledger_ops_total", "Successful ledger operations"),
            &["op"],
        )?;
        registry.register(Box::new(ops_total.clone()))?;

        let conflicts_total = IntCounter::with_opts(Opts::new(
            "credit_ledger_conflicts_total",
            "Operations that exhausted their conflict retries",
        ))?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let insufficient_total = IntCounter::with_opts(Opts::new(
            "credit_ledger_insufficient_total",
            "Operations rejected for insufficient balance",
        ))?;
        registry.register(Box::new(insufficient_total.clone()))?;

        let entries_total = IntCounter::with_opts(Opts::new(
            "credit_ledger_entries_total",
            "Journal entries appended",
        ))?;
        registry.register(Box::new(entries_total.clone()))?;

        let op_duration = Histogram::with_opts(
            HistogramOpts::new(
                "credit_ledger_op_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
            ]),
        )?;
        registry.register(Box::new(op_duration.clone()))?;

        Ok(Self {
            ops_total,
            conflicts_total,
            insufficient_total,
            entries_total,
            op_duration,
            registry,
        })
    }

    /// Record one completed operation attempt
    pub fn observe<T>(&self, op: &str, seconds: f64, result: &crate::Result<T>) {
        self.op_duration.observe(seconds);
        match result {
            Ok(_) => self.ops_total.with_label_values(&[op]).inc(),
            Err(Error::Conflict(_)) => self.conflicts_total.inc(),
            Err(Error::InsufficientBalance { .. }) => self.insufficient_total.inc(),
            Err(_) => {}
        }
    }

    /// Record appended journal entries
    pub fn record_entries(&self, count: u64) {
        self.entries_total.inc_by(count);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
