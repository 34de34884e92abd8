//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `parameter_sync_passes_total` - Total number of reconciliation passes
//! - `parameter_sync_pass_errors_total{severity}` - Failed passes, `expected` or `unexpected`
//! - `parameter_sync_pass_duration_seconds` - Duration of reconciliation passes
//! - `parameter_sync_documents_total{outcome}` - Rendered documents by apply outcome
//! - `parameter_sync_projects_rendered_total` - Projects rendered
//! - `parameter_sync_wakeups_total{reason}` - Scheduler wakeups by cause

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PASSES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "parameter_sync_passes_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create PASSES_TOTAL metric - this should never happen")
});

static PASS_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "parameter_sync_pass_errors_total",
            "Total number of failed reconciliation passes by severity",
        ),
        &["severity"],
    )
    .expect("Failed to create PASS_ERRORS_TOTAL metric - this should never happen")
});

static PASS_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "parameter_sync_pass_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create PASS_DURATION metric - this should never happen")
});

static DOCUMENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "parameter_sync_documents_total",
            "Total number of rendered documents by apply outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create DOCUMENTS_TOTAL metric - this should never happen")
});

static PROJECTS_RENDERED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "parameter_sync_projects_rendered_total",
        "Total number of projects rendered",
    )
    .expect("Failed to create PROJECTS_RENDERED_TOTAL metric - this should never happen")
});

static WAKEUPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "parameter_sync_wakeups_total",
            "Total number of scheduler wakeups by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create WAKEUPS_TOTAL metric - this should never happen")
});

/// Register every metric with [`REGISTRY`]. Fails if called twice.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_DURATION.clone()))?;
    REGISTRY.register(Box::new(DOCUMENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROJECTS_RENDERED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WAKEUPS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_passes() {
    PASSES_TOTAL.inc();
}

pub fn increment_pass_errors(severity: &str) {
    PASS_ERRORS_TOTAL.with_label_values(&[severity]).inc();
}

pub fn observe_pass_duration(duration: f64) {
    PASS_DURATION.observe(duration);
}

pub fn increment_documents(outcome: &str) {
    DOCUMENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_projects_rendered() {
    PROJECTS_RENDERED_TOTAL.inc();
}

pub fn increment_wakeups(reason: &str) {
    WAKEUPS_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_passes() {
        let before = PASSES_TOTAL.get();
        increment_passes();
        assert!(PASSES_TOTAL.get() > before);
    }

    #[test]
    fn test_labelled_counters() {
        let before = DOCUMENTS_TOTAL.with_label_values(&["created"]).get();
        increment_documents("created");
        assert!(DOCUMENTS_TOTAL.with_label_values(&["created"]).get() > before);

        let before = PASS_ERRORS_TOTAL.with_label_values(&["expected"]).get();
        increment_pass_errors("expected");
        assert!(PASS_ERRORS_TOTAL.with_label_values(&["expected"]).get() > before);
    }
}
