//! Switchboard Telemetry - Observability Infrastructure
//!
//! OpenTelemetry tracing, Prometheus metrics, and the metric-event sinks
//! that receive per-request telemetry.

pub mod metrics;
pub mod middleware;
pub mod sinks;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, SwitchboardMetrics, METRICS};
pub use middleware::{normalize_path, observability_middleware};
pub use sinks::{FanoutSink, HttpTelemetrySink, LogTelemetrySink};
pub use tracer::{init_tracer, TelemetryConfig, TracerGuard};
