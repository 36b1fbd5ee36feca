// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! asap-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod metrics;
mod subscriber;

pub use metrics::{
    JsonExporter, MetricsCollector, MetricsSummary, PrometheusExporter, RequestMetrics,
    RequestOutcome, TelemetryExporter, TelemetrySpan,
};
pub use subscriber::{init_tracing, TelemetryError};
