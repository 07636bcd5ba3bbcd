//! Module handles telemetry for the batch submitter: tracing output and
//! Prometheus metrics.

/// Logging module
pub mod logging;

/// Metrics module
pub mod metrics;
