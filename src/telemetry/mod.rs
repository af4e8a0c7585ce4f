//! Telemetry and observability subsystem.
//!
//! Provides queue metrics and helpers for installing a `tracing`
//! subscriber. Latency histograms are only collected with the
//! `telemetry` feature; counters are always kept.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_file};
pub use metrics::{MetricsSnapshot, QueueMetrics};
