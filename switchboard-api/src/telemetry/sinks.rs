//! Metric event sinks.
//!
//! Every sink is fire-and-forget: `publish` returns immediately and any
//! delivery failure is logged and counted, never returned.

use std::sync::Arc;
use std::time::Duration;

use switchboard_core::{ConfigError, MetricEvent, SwitchboardResult, TelemetrySink};

use super::metrics::metrics;

/// Writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetrySink;

impl TelemetrySink for LogTelemetrySink {
    fn publish(&self, event: MetricEvent) {
        if let Some(metrics) = metrics() {
            metrics.record_telemetry_event(&event.name);
        }
        match serde_json::to_string(&event.properties) {
            Ok(properties) => tracing::info!(
                target: "switchboard::telemetry",
                event = %event.name,
                subject_id = %event.subject_id,
                properties = %properties,
                "Metric event"
            ),
            Err(e) => {
                tracing::warn!(event = %event.name, error = %e, "Failed to encode metric event")
            }
        }
    }
}

/// POSTs each event as JSON to a collector.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetrySink {
    const NAME: &'static str = "http";

    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SwitchboardResult<Self> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "telemetry_endpoint".to_string(),
                value: endpoint.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn deliver(client: reqwest::Client, endpoint: String, event: MetricEvent) {
    let result = client
        .post(&endpoint)
        .header("User-Agent", "switchboard-telemetry/1.0")
        .json(&event)
        .send()
        .await;

    let failure = match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(event = %event.name, "Metric event delivered");
            return;
        }
        Ok(response) => format!("collector returned {}", response.status()),
        Err(e) => e.to_string(),
    };

    tracing::warn!(
        event = %event.name,
        endpoint = %endpoint,
        error = %failure,
        "Metric event delivery failed"
    );
    if let Some(metrics) = metrics() {
        metrics.record_telemetry_failure(HttpTelemetrySink::NAME);
    }
}

impl TelemetrySink for HttpTelemetrySink {
    fn publish(&self, event: MetricEvent) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(deliver(self.client.clone(), self.endpoint.clone(), event));
            }
            Err(_) => {
                tracing::warn!(event = %event.name, "No runtime to deliver metric event");
                if let Some(metrics) = metrics() {
                    metrics.record_telemetry_failure(Self::NAME);
                }
            }
        }
    }
}

/// Hands every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutSink {
    fn publish(&self, event: MetricEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
