//! Typed agent configuration derived from a variant payload.
//!
//! Variant configurations arrive as opaque string maps. They are turned into
//! an [`AgentConfig`] exactly once, and everything downstream works with the
//! typed form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{compute_content_hash, AgentError};

/// Configuration keys recognised in a variant payload.
pub mod keys {
    pub const ENDPOINT: &str = "endpoint";
    pub const AGENT_ID: &str = "agent_id";
    pub const ASSISTANT_ID: &str = "assistant_id";
    pub const MODEL: &str = "model";
    pub const TEMPERATURE: &str = "temperature";
    pub const MAX_COMPLETION_TOKENS: &str = "max_completion_tokens";
    pub const SYSTEM_PROMPT: &str = "system_prompt";
    pub const API_VERSION: &str = "api_version";
}

/// Snapshot setting consulted when a variant carries no endpoint.
pub const AI_ENDPOINT_SETTING: &str = "ai_endpoint";

pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 800;

/// What the backend call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AgentTarget {
    /// A pre-provisioned assistant/agent identifier.
    Assistant(String),
    /// A bare model or deployment name.
    Model(String),
}

impl AgentTarget {
    /// The identifier sent to the backend.
    pub fn id(&self) -> &str {
        match self {
            Self::Assistant(id) | Self::Model(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Assistant(_) => "assistant",
            Self::Model(_) => "model",
        }
    }
}

impl fmt::Display for AgentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Identity of a live backend client: endpoint plus target.
///
/// Sampling parameters are deliberately absent so two variants that differ
/// only in temperature share one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentKey {
    pub endpoint: String,
    pub target: AgentTarget,
}

impl AgentKey {
    pub fn new(endpoint: impl Into<String>, target: AgentTarget) -> Self {
        Self {
            endpoint: normalize_endpoint(&endpoint.into()),
            target,
        }
    }

    /// The assistant id or model name this key addresses.
    pub fn target_id(&self) -> &str {
        self.target.id()
    }

    /// Stable hex digest of the key, suitable for logs and metric labels.
    pub fn digest(&self) -> String {
        let material = format!("{}\n{}", self.endpoint, self.target);
        hex::encode(compute_content_hash(material.as_bytes()))
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.target, self.endpoint)
    }
}

/// Fallback values applied when a variant payload leaves a field unset.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefaults {
    pub endpoint: Option<String>,
    pub api_version: String,
    pub temperature: f32,
    pub max_completion_tokens: u32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
        }
    }
}

impl AgentDefaults {
    /// Prefer a snapshot-provided endpoint over the static one.
    pub fn with_snapshot_endpoint(&self, snapshot_endpoint: Option<&str>) -> Self {
        let endpoint = snapshot_endpoint
            .filter(|e| !e.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.endpoint.clone());
        Self {
            endpoint,
            ..self.clone()
        }
    }
}

/// Normalised agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub endpoint: String,
    pub target: AgentTarget,
    pub temperature: f32,
    pub max_completion_tokens: u32,
    pub system_prompt: Option<String>,
    pub api_version: String,
}

impl AgentConfig {
    /// Normalise a variant payload.
    ///
    /// `agent_id` (or its alias `assistant_id`) wins over `model`.
    pub fn from_variant(
        variant: &str,
        configuration: &BTreeMap<String, String>,
        defaults: &AgentDefaults,
    ) -> Result<Self, AgentError> {
        let lookup = |key: &str| {
            configuration
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let invalid = |reason: String| AgentError::InvalidConfiguration {
            variant: variant.to_string(),
            reason,
        };

        let target = match (
            lookup(keys::AGENT_ID).or_else(|| lookup(keys::ASSISTANT_ID)),
            lookup(keys::MODEL),
        ) {
            (Some(id), _) => AgentTarget::Assistant(id.to_string()),
            (None, Some(model)) => AgentTarget::Model(model.to_string()),
            (None, None) => {
                return Err(invalid(
                    "configuration names neither an agent_id nor a model".to_string(),
                ))
            }
        };

        let endpoint = lookup(keys::ENDPOINT)
            .map(str::to_string)
            .or_else(|| defaults.endpoint.clone())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| invalid("no endpoint configured".to_string()))?;

        let temperature = match lookup(keys::TEMPERATURE) {
            Some(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|t| t.is_finite() && (0.0..=2.0).contains(t))
                .ok_or_else(|| invalid(format!("temperature '{}' is not in [0, 2]", raw)))?,
            None => defaults.temperature,
        };

        let max_completion_tokens = match lookup(keys::MAX_COMPLETION_TOKENS) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|t| *t > 0)
                .ok_or_else(|| {
                    invalid(format!("max_completion_tokens '{}' is not a positive integer", raw))
                })?,
            None => defaults.max_completion_tokens,
        };

        Ok(Self {
            endpoint: normalize_endpoint(&endpoint),
            target,
            temperature,
            max_completion_tokens,
            system_prompt: lookup(keys::SYSTEM_PROMPT).map(str::to_string),
            api_version: lookup(keys::API_VERSION)
                .map(str::to_string)
                .unwrap_or_else(|| defaults.api_version.clone()),
        })
    }

    /// Configuration for the statically configured fallback agent.
    pub fn fallback(
        agent_id: Option<&str>,
        model: Option<&str>,
        defaults: &AgentDefaults,
    ) -> Result<Self, AgentError> {
        let mut configuration = BTreeMap::new();
        if let Some(id) = agent_id {
            configuration.insert(keys::AGENT_ID.to_string(), id.to_string());
        }
        if let Some(model) = model {
            configuration.insert(keys::MODEL.to_string(), model.to_string());
        }
        Self::from_variant("default", &configuration, defaults)
    }

    pub fn key(&self) -> AgentKey {
        AgentKey::new(self.endpoint.clone(), self.target.clone())
    }

    /// Name reported back to callers.
    pub fn display_name(&self) -> &str {
        self.target.id()
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}
