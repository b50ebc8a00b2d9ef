//! Prometheus Metrics Definitions
//!
//! Defines all switchboard metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Backend chat call latency buckets (seconds). Completions are slow.
const BACKEND_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<SwitchboardMetrics>> = Lazy::new(SwitchboardMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static SwitchboardMetrics> {
    METRICS.as_ref().ok()
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all switchboard metrics.
#[derive(Clone)]
pub struct SwitchboardMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Config refresh attempts - labels: outcome (updated/unchanged/failed/skipped)
    pub config_refresh_total: CounterVec,

    /// Version of the published config snapshot
    pub config_snapshot_version: Gauge,

    /// Flag evaluations - labels: flag, variant, reason
    pub variant_assignments_total: CounterVec,

    /// Chat requests by outcome - labels: variant, status
    pub chat_requests_total: CounterVec,

    /// Backend call duration histogram - labels: variant
    pub backend_call_duration_seconds: HistogramVec,

    /// Live agent handles in the registry
    pub agent_handles: Gauge,

    /// Metric events handed to sinks - labels: event
    pub telemetry_events_total: CounterVec,

    /// Failed telemetry deliveries - labels: sink
    pub telemetry_publish_failures_total: CounterVec,
}

impl SwitchboardMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "switchboard_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "switchboard_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            config_refresh_total: register_counter_vec!(
                "switchboard_config_refresh_total",
                "Configuration refresh attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("config_refresh_total", e))?,

            config_snapshot_version: register_gauge!(
                "switchboard_config_snapshot_version",
                "Version of the currently published configuration snapshot"
            )
            .map_err(|e| registration_error("config_snapshot_version", e))?,

            variant_assignments_total: register_counter_vec!(
                "switchboard_variant_assignments_total",
                "Flag evaluations by resolved variant",
                &["flag", "variant", "reason"]
            )
            .map_err(|e| registration_error("variant_assignments_total", e))?,

            chat_requests_total: register_counter_vec!(
                "switchboard_chat_requests_total",
                "Chat requests by variant and outcome",
                &["variant", "status"]
            )
            .map_err(|e| registration_error("chat_requests_total", e))?,

            backend_call_duration_seconds: register_histogram_vec!(
                "switchboard_backend_call_duration_seconds",
                "Backend chat call duration in seconds",
                &["variant"],
                BACKEND_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("backend_call_duration_seconds", e))?,

            agent_handles: register_gauge!(
                "switchboard_agent_handles",
                "Live backend client handles held by the agent registry"
            )
            .map_err(|e| registration_error("agent_handles", e))?,

            telemetry_events_total: register_counter_vec!(
                "switchboard_telemetry_events_total",
                "Metric events published",
                &["event"]
            )
            .map_err(|e| registration_error("telemetry_events_total", e))?,

            telemetry_publish_failures_total: register_counter_vec!(
                "switchboard_telemetry_publish_failures_total",
                "Metric events a sink failed to deliver",
                &["sink"]
            )
            .map_err(|e| registration_error("telemetry_publish_failures_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a config refresh attempt and the version now published.
    pub fn record_refresh(&self, outcome: &str, version: u64) {
        self.config_refresh_total.with_label_values(&[outcome]).inc();
        self.config_snapshot_version.set(version as f64);
    }

    pub fn record_variant_assignment(&self, flag: &str, variant: &str, reason: &str) {
        self.variant_assignments_total
            .with_label_values(&[flag, variant, reason])
            .inc();
    }

    /// Record a finished chat request; `backend_secs` is set when the backend was called.
    pub fn record_chat(&self, variant: &str, success: bool, backend_secs: Option<f64>) {
        let status = if success { "success" } else { "error" };
        self.chat_requests_total
            .with_label_values(&[variant, status])
            .inc();
        if let Some(secs) = backend_secs {
            self.backend_call_duration_seconds
                .with_label_values(&[variant])
                .observe(secs);
        }
    }

    pub fn set_agent_handles(&self, count: usize) {
        self.agent_handles.set(count as f64);
    }

    pub fn record_telemetry_event(&self, event: &str) {
        self.telemetry_events_total.with_label_values(&[event]).inc();
    }

    pub fn record_telemetry_failure(&self, sink: &str) {
        self.telemetry_publish_failures_total
            .with_label_values(&[sink])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (
            status = 200,
            description = "Prometheus metrics in text format",
            content_type = "text/plain"
        ),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the container so series exist before the first scrape.
    let _ = metrics();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    fn registered() -> Result<&'static SwitchboardMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = registered()?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        assert!(super::metrics().is_some());
        Ok(())
    }

    #[test]
    fn test_record_refresh_sets_version() -> Result<(), String> {
        let metrics = registered()?;
        let before = metrics
            .config_refresh_total
            .with_label_values(&["failed"])
            .get();
        metrics.record_refresh("failed", 42);
        assert!(metrics.config_refresh_total.with_label_values(&["failed"]).get() >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_record_chat() -> Result<(), String> {
        let metrics = registered()?;
        metrics.record_chat("newAgent", true, Some(0.8));
        metrics.record_chat("default", false, None);
        metrics.record_variant_assignment("Agent", "newAgent", "user_targeted");
        Ok(())
    }

    #[test]
    fn test_telemetry_counters() -> Result<(), String> {
        let metrics = registered()?;
        metrics.record_telemetry_event("agent_metrics");
        metrics.record_telemetry_failure("http");
        metrics.set_agent_handles(3);
        Ok(())
    }
}
