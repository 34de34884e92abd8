//! # Observability
//!
//! Prometheus metrics for the reconciliation loop. Logging goes through
//! `tracing` and is configured by the binary.

pub mod metrics;

#[cfg(test)]
pub(crate) mod log_capture;
