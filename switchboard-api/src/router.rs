//! Per-request orchestration of a chat call.
//!
//! A request moves through
//! `Received -> ConfigReady -> IdentityResolved -> VariantResolved ->
//! AgentReady -> Completed`, or to `Failed` from any stage. Nothing is
//! retried here.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use switchboard_config::{ConfigStore, RefreshOutcome};
use switchboard_core::{
    AgentConfig, AgentDefaults, AgentKey, CallerContext, ChatMessage, ChatRequest, ChatResponse,
    ChatRole, ConfigError, ConfigSnapshot, LlmError, MetricEvent, SnapshotVersion,
    SwitchboardResult, TargetingIdentity, TelemetrySink, ValidationError, AGENT_METRICS_EVENT,
    AI_ENDPOINT_SETTING, FEATURE_EVALUATION_EVENT,
};
use switchboard_flags::{
    DefaultTargetingResolver, EvaluationReason, TargetingResolver, VariantEvaluator,
};
use switchboard_llm::AgentRegistry;

use crate::config::GatewayConfig;
use crate::telemetry::metrics;

/// Variant name reported when the statically configured agent is used.
pub const FALLBACK_VARIANT: &str = "default";

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    ConfigReady,
    IdentityResolved,
    VariantResolved,
    AgentReady,
    Completed,
    Failed,
}

impl RequestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ConfigReady => "config_ready",
            Self::IdentityResolved => "identity_resolved",
            Self::VariantResolved => "variant_resolved",
            Self::AgentReady => "agent_ready",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// CSAT POLICY
// ============================================================================

/// Synthetic satisfaction score ranges keyed by variant name.
///
/// The score is a simulated quality signal, not measured feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct CsatPolicy {
    ranges: BTreeMap<String, (f64, f64)>,
    default_range: (f64, f64),
}

impl Default for CsatPolicy {
    fn default() -> Self {
        Self {
            ranges: BTreeMap::from([("newAgent".to_string(), (2.5, 5.0))]),
            default_range: (1.0, 3.0),
        }
    }
}

impl CsatPolicy {
    /// A policy with no per-variant ranges.
    pub fn uniform(low: f64, high: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            ranges: BTreeMap::new(),
            default_range: checked_range("default", low, high)?,
        })
    }

    pub fn with_range(
        mut self,
        variant: impl Into<String>,
        low: f64,
        high: f64,
    ) -> Result<Self, ValidationError> {
        let variant = variant.into();
        let range = checked_range(&variant, low, high)?;
        self.ranges.insert(variant, range);
        Ok(self)
    }

    pub fn range_for(&self, variant: &str) -> (f64, f64) {
        self.ranges
            .get(variant)
            .copied()
            .unwrap_or(self.default_range)
    }

    /// Uniform sample from the variant's range, rounded to two decimals.
    pub fn sample(&self, variant: &str) -> f64 {
        let (low, high) = self.range_for(variant);
        let raw = rand::rng().random_range(low..=high);
        ((raw * 100.0).round() / 100.0).clamp(low, high)
    }
}

fn checked_range(variant: &str, low: f64, high: f64) -> Result<(f64, f64), ValidationError> {
    if low.is_finite() && high.is_finite() && low <= high {
        Ok((low, high))
    } else {
        Err(ValidationError::InvalidValue {
            field: format!("csat_range.{}", variant),
            reason: format!("[{}, {}] is not a valid range", low, high),
        })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Static routing settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Flag whose variant selects the agent.
    pub agent_flag: String,
    pub default_agent_id: Option<String>,
    pub default_model: Option<String>,
    pub agent_defaults: AgentDefaults,
    pub backend_timeout: Duration,
    /// Check for a due refresh at the top of each request.
    pub refresh_on_demand: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            agent_flag: "Agent".to_string(),
            default_agent_id: None,
            default_model: None,
            agent_defaults: AgentDefaults::default(),
            backend_timeout: Duration::from_secs(60),
            refresh_on_demand: true,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            agent_flag: config.agent_flag.clone(),
            default_agent_id: config.default_agent_id.clone(),
            default_model: config.default_model.clone(),
            agent_defaults: config.agent_defaults(),
            backend_timeout: config.backend_timeout,
            refresh_on_demand: config.refresh_mode.on_demand(),
        }
    }
}

/// The agent a caller resolves to, without calling it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSelection {
    pub variant: String,
    pub reason: EvaluationReason,
    pub config_version: SnapshotVersion,
    /// `None` when no variant applies and no fallback agent exists.
    pub agent: Option<AgentConfig>,
}

impl AgentSelection {
    pub fn is_fallback(&self) -> bool {
        self.variant == FALLBACK_VARIANT
    }
}

/// A completed chat request.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: ChatResponse,
    pub identity: TargetingIdentity,
    pub variant: String,
    pub agent_key: AgentKey,
}

/// Tracks how far a request got, for failure logs and metrics.
struct RequestTrace {
    stage: RequestStage,
    variant: Option<String>,
}

impl RequestTrace {
    fn advance(&mut self, stage: RequestStage) {
        debug!(stage = stage.as_str(), "Request stage");
        self.stage = stage;
    }
}

/// Orchestrates the config store, targeting, evaluation, registry and
/// backend for each chat request.
pub struct RequestRouter {
    store: ConfigStore,
    registry: Arc<AgentRegistry>,
    sink: Arc<dyn TelemetrySink>,
    resolver: Arc<dyn TargetingResolver>,
    evaluator: VariantEvaluator,
    csat: CsatPolicy,
    settings: RouterSettings,
}

impl RequestRouter {
    pub fn new(
        store: ConfigStore,
        registry: Arc<AgentRegistry>,
        sink: Arc<dyn TelemetrySink>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            resolver: Arc::new(DefaultTargetingResolver),
            evaluator: VariantEvaluator::new(),
            csat: CsatPolicy::default(),
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TargetingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_csat_policy(mut self, csat: CsatPolicy) -> Self {
        self.csat = csat;
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Resolve the caller's identity.
    pub fn resolve_identity(&self, caller: &CallerContext) -> TargetingIdentity {
        self.resolver.resolve(caller)
    }

    /// Which agent `identity` would be routed to under `snapshot`.
    ///
    /// A variant whose payload cannot be normalised is an error; a missing
    /// variant with no fallback is reported as `agent: None`.
    pub fn select_agent(
        &self,
        snapshot: &ConfigSnapshot,
        identity: &TargetingIdentity,
    ) -> SwitchboardResult<AgentSelection> {
        let flag = self.settings.agent_flag.as_str();
        let evaluation = self.evaluator.evaluate_detailed(flag, snapshot, identity);
        let defaults = self
            .settings
            .agent_defaults
            .with_snapshot_endpoint(snapshot.setting(AI_ENDPOINT_SETTING));

        let (variant, agent) = match evaluation.variant {
            Some(variant) => (
                variant.name.clone(),
                Some(AgentConfig::from_variant(
                    &variant.name,
                    &variant.configuration,
                    &defaults,
                )?),
            ),
            None => {
                let agent = match (
                    self.settings.default_agent_id.as_deref(),
                    self.settings.default_model.as_deref(),
                ) {
                    (None, None) => None,
                    (agent_id, model) => Some(AgentConfig::fallback(agent_id, model, &defaults)?),
                };
                (FALLBACK_VARIANT.to_string(), agent)
            }
        };

        Ok(AgentSelection {
            variant,
            reason: evaluation.reason,
            config_version: evaluation.config_version,
            agent,
        })
    }

    /// Refresh if due, using the on-demand path.
    async fn refresh_if_due(&self) {
        let outcome = self.store.refresh_if_due_with_outcome(Instant::now()).await;
        self.record_refresh(outcome);
    }

    /// Count a refresh attempt. Skipped checks are not counted.
    pub fn record_refresh(&self, outcome: RefreshOutcome) {
        if outcome == RefreshOutcome::Skipped {
            return;
        }
        if let Some(metrics) = metrics() {
            metrics.record_refresh(outcome.as_str(), self.store.current().version());
        }
    }

    /// Handle one `POST /api/chat`.
    ///
    /// Validation happens before anything else, so a rejected request
    /// emits no telemetry.
    pub async fn handle_chat(
        &self,
        caller: &CallerContext,
        request: ChatRequest,
    ) -> SwitchboardResult<ChatOutcome> {
        request.validate()?;

        let mut trace = RequestTrace {
            stage: RequestStage::Received,
            variant: None,
        };
        let result = self.run(caller, request, &mut trace).await;

        if let Err(e) = &result {
            let variant = trace.variant.as_deref().unwrap_or("unresolved");
            warn!(
                stage = trace.stage.as_str(),
                variant,
                error = %e,
                "Chat request failed"
            );
            if let Some(metrics) = metrics() {
                metrics.record_chat(variant, false, None);
            }
            trace.advance(RequestStage::Failed);
        }
        result
    }

    async fn run(
        &self,
        caller: &CallerContext,
        request: ChatRequest,
        trace: &mut RequestTrace,
    ) -> SwitchboardResult<ChatOutcome> {
        if self.settings.refresh_on_demand {
            self.refresh_if_due().await;
        }
        let snapshot = self.store.current();
        trace.advance(RequestStage::ConfigReady);

        let identity = self.resolve_identity(caller);
        trace.advance(RequestStage::IdentityResolved);

        let selection = self.select_agent(&snapshot, &identity)?;
        trace.variant = Some(selection.variant.clone());
        self.publish_evaluation(&identity, &selection);
        let agent = selection.agent.ok_or_else(|| ConfigError::Unavailable {
            reason: format!(
                "flag '{}' resolved no variant ({}) and no default agent is configured",
                self.settings.agent_flag, selection.reason
            ),
        })?;
        trace.advance(RequestStage::VariantResolved);

        let handle = self.registry.get_or_create(&agent).await?;
        if let Some(metrics) = metrics() {
            metrics.set_agent_handles(self.registry.len());
        }
        trace.advance(RequestStage::AgentReady);

        let started = Instant::now();
        let timeout = self.settings.backend_timeout;
        let reply = match tokio::time::timeout(
            timeout,
            handle.send(&agent, &request.message, &request.history),
        )
        .await
        {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(LlmError::Timeout {
                    provider: handle.provider().to_string(),
                    after_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        };
        let backend_secs = started.elapsed().as_secs_f64();

        let mut history = request.history;
        history.push(ChatMessage::now(ChatRole::User, request.message));
        history.push(ChatMessage::now(ChatRole::Assistant, reply.text.clone()));

        let csat = self.csat.sample(&selection.variant);
        self.sink.publish(
            MetricEvent::new(AGENT_METRICS_EVENT, identity.user_id())
                .with("agent_name", selection.variant.as_str())
                .with("csat", csat),
        );
        if let Some(metrics) = metrics() {
            metrics.record_chat(&selection.variant, true, Some(backend_secs));
        }
        trace.advance(RequestStage::Completed);

        info!(
            variant = %selection.variant,
            agent_key = %handle.key(),
            agent = %reply.agent_name,
            version = selection.config_version,
            backend_ms = (backend_secs * 1000.0) as u64,
            "Chat request completed"
        );

        Ok(ChatOutcome {
            response: ChatResponse {
                message: reply.text,
                history,
            },
            identity,
            variant: selection.variant,
            agent_key: handle.key().clone(),
        })
    }

    fn publish_evaluation(&self, identity: &TargetingIdentity, selection: &AgentSelection) {
        let flag = self.settings.agent_flag.as_str();
        if let Some(metrics) = metrics() {
            metrics.record_variant_assignment(flag, &selection.variant, selection.reason.as_str());
        }
        self.sink.publish(
            MetricEvent::new(FEATURE_EVALUATION_EVENT, identity.user_id())
                .with("feature_name", flag)
                .with("variant", selection.variant.as_str())
                .with("reason", selection.reason.as_str())
                .with("config_version", selection.config_version),
        );
    }
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("source", &self.store.source_name())
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}
