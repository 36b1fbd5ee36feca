//! Per-request metrics collection and export.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Outcome of a single handled request, for metrics purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// The request completed successfully.
    Ok,
    /// The request failed with a JSON-RPC or transport error.
    Error,
}

/// Metrics captured for a single handled envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMetrics {
    /// JSON-RPC method name (e.g. `asap.send`).
    pub method: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Outcome of the request.
    pub outcome: RequestOutcome,
    /// Serialized request size in bytes.
    pub bytes_in: u64,
    /// Serialized response size in bytes.
    pub bytes_out: u64,
}

/// Aggregated statistics across multiple requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of requests recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Total inbound bytes across all requests.
    pub total_bytes_in: u64,
    /// Total outbound bytes across all requests.
    pub total_bytes_out: u64,
    /// Error rate (errors / total requests).
    pub error_rate: f64,
    /// Per-method request counts (deterministic ordering).
    pub method_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            total_bytes_in: 0,
            total_bytes_out: 0,
            error_rate: 0.0,
            method_counts: BTreeMap::new(),
        }
    }
}

/// Compute a percentile value from a **sorted** slice.
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

/// Thread-safe collector for request metrics.
///
/// Wrap in an `Arc` to share across handler tasks (the inner storage is
/// already behind a `Mutex`).
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<RequestMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Record a completed request's metrics.
    pub fn record(&self, metrics: RequestMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Return all recorded request metrics.
    pub fn requests(&self) -> Vec<RequestMetrics> {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.clone()
    }

    /// Number of requests recorded so far.
    pub fn len(&self) -> usize {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.len()
    }

    /// Whether the collector has no recorded requests.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded requests.
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let total_bytes_in: u64 = data.iter().map(|r| r.bytes_in).sum();
        let total_bytes_out: u64 = data.iter().map(|r| r.bytes_out).sum();

        let errors = data.iter().filter(|r| r.outcome == RequestOutcome::Error).count();
        let error_rate = errors as f64 / count as f64;

        let mut method_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *method_counts.entry(r.method.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            total_bytes_in,
            total_bytes_out,
            error_rate,
            method_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.clear();
    }
}

/// A structured span for tracing integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySpan {
    /// Span name / operation.
    pub name: String,
    /// Arbitrary key-value attributes (deterministic ordering).
    pub attributes: BTreeMap<String, String>,
}

impl TelemetrySpan {
    /// Create a new span with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: BTreeMap::new() }
    }

    /// Insert an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit the span via `tracing::info!`.
    pub fn emit(&self) {
        info!(span_name = %self.name, attributes = ?self.attributes, "telemetry_span");
    }
}

/// Trait for exporting collected metrics.
pub trait TelemetryExporter: Send + Sync {
    /// Export the given summary. Returns the serialized output on success.
    fn export(&self, summary: &MetricsSummary) -> Result<String, String>;
}

/// Exports metrics as pretty-printed JSON to a string.
#[derive(Debug, Default)]
pub struct JsonExporter;

impl TelemetryExporter for JsonExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        serde_json::to_string_pretty(summary).map_err(|e| e.to_string())
    }
}

/// Exports metrics in Prometheus text exposition format, for
/// `GET /asap/metrics`.
#[derive(Debug, Default)]
pub struct PrometheusExporter;

impl TelemetryExporter for PrometheusExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        let mut out = String::new();

        out.push_str("# HELP asap_requests_total Total requests handled.\n");
        out.push_str("# TYPE asap_requests_total counter\n");
        out.push_str(&format!("asap_requests_total {}\n", summary.count));

        out.push_str("# HELP asap_requests_by_method Requests handled, by JSON-RPC method.\n");
        out.push_str("# TYPE asap_requests_by_method counter\n");
        for (method, count) in &summary.method_counts {
            out.push_str(&format!(
                "asap_requests_by_method{{method=\"{method}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP asap_request_duration_ms_mean Mean request duration in milliseconds.\n");
        out.push_str("# TYPE asap_request_duration_ms_mean gauge\n");
        out.push_str(&format!(
            "asap_request_duration_ms_mean {}\n",
            summary.mean_duration_ms
        ));

        out.push_str("# HELP asap_request_duration_ms_p50 Median request duration in milliseconds.\n");
        out.push_str("# TYPE asap_request_duration_ms_p50 gauge\n");
        out.push_str(&format!("asap_request_duration_ms_p50 {}\n", summary.p50_duration_ms));

        out.push_str("# HELP asap_request_duration_ms_p99 p99 request duration in milliseconds.\n");
        out.push_str("# TYPE asap_request_duration_ms_p99 gauge\n");
        out.push_str(&format!("asap_request_duration_ms_p99 {}\n", summary.p99_duration_ms));

        out.push_str("# HELP asap_bytes_in_total Total inbound request bytes.\n");
        out.push_str("# TYPE asap_bytes_in_total counter\n");
        out.push_str(&format!("asap_bytes_in_total {}\n", summary.total_bytes_in));

        out.push_str("# HELP asap_bytes_out_total Total outbound response bytes.\n");
        out.push_str("# TYPE asap_bytes_out_total counter\n");
        out.push_str(&format!("asap_bytes_out_total {}\n", summary.total_bytes_out));

        out.push_str("# HELP asap_error_rate Fraction of requests that ended in an error.\n");
        out.push_str("# TYPE asap_error_rate gauge\n");
        out.push_str(&format!("asap_error_rate {}\n", summary.error_rate));

        Ok(out)
    }
}
