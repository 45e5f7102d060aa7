//! Telemetry
//!
//! Observability components for token services.
//!
//! Metrics are collected through [`TokenMetrics`]; logging goes through the
//! `tracing` crate directly.

pub mod metrics;

pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, TokenMetrics,
};
