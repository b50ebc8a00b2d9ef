//! Fire-and-forget metric events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event emitted once per completed chat request.
pub const AGENT_METRICS_EVENT: &str = "agent_metrics";
/// Event emitted for every flag evaluation on the request path.
pub const FEATURE_EVALUATION_EVENT: &str = "feature_evaluation";

/// A property value: text or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

/// Telemetry record for the external collector. Never persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub name: String,
    pub subject_id: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl MetricEvent {
    pub fn new(name: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_id: subject_id.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// Destination for [`MetricEvent`]s.
///
/// Publishing is best-effort: implementations log and swallow their own
/// failures and must not block the caller on I/O.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, event: MetricEvent);
}
