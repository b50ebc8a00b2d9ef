//! Switchboard Test Utilities
//!
//! Centralized test infrastructure for the Switchboard workspace:
//! - Fixtures for the agent flag and its snapshots
//! - A scripted config source and a recording telemetry sink
//! - Proptest generators for identities, allocations and chat turns
//! - Custom assertions for Switchboard-specific validation

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use switchboard_config::{ConfigSource, ConfigStore, FetchOutcome, StoreOptions};
pub use switchboard_core::{
    Allocation, CallerContext, ChatMessage, ChatRequest, ChatRole, ConfigError, ConfigSnapshot,
    FlagDefinition, LlmError, MetricEvent, SnapshotVersion, SwitchboardError, SwitchboardResult,
    TelemetrySink, ValidationError, VariantDefinition, AGENT_METRICS_EVENT, AI_ENDPOINT_SETTING,
    FEATURE_EVALUATION_EVENT,
};
pub use switchboard_llm::{AgentRegistry, MockChatBackend, MockConnector};

// ============================================================================
// SCRIPTED CONFIG SOURCE
// ============================================================================

/// One scripted response of a [`ScriptedConfigSource`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Serve this snapshot (unchanged if it does not advance past `since`).
    Snapshot(ConfigSnapshot),
    Unchanged,
    Fail(String),
    /// Never answer; exercises the store's fetch timeout.
    Hang,
}

/// Config source that replays a fixed script, then reports `Unchanged`.
#[derive(Debug, Default)]
pub struct ScriptedConfigSource {
    script: Mutex<VecDeque<Step>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl ScriptedConfigSource {
    pub const NAME: &'static str = "scripted";

    pub fn new<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Step>,
    {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Delay every fetch, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, step: Step) {
        self.lock().push_back(step);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Step>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ConfigSource for ScriptedConfigSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self, since: Option<SnapshotVersion>) -> SwitchboardResult<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = self.lock().pop_front();
        match step {
            Some(Step::Snapshot(snapshot)) => match since {
                Some(since) if snapshot.version() <= since => Ok(FetchOutcome::Unchanged),
                _ => Ok(FetchOutcome::Updated(snapshot)),
            },
            Some(Step::Unchanged) | None => Ok(FetchOutcome::Unchanged),
            Some(Step::Fail(reason)) => Err(ConfigError::FetchFailed {
                source_name: Self::NAME.to_string(),
                reason,
            }
            .into()),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(FetchOutcome::Unchanged)
            }
        }
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Telemetry sink that keeps every event for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.lock().clone()
    }

    /// Events with the given name, in publish order.
    pub fn named(&self, name: &str) -> Vec<MetricEvent> {
        self.lock()
            .iter()
            .filter(|event| event.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&self, event: MetricEvent) {
        self.lock().push(event);
    }
}

/// Registry backed by a [`MockConnector`], plus the connector for inspection.
pub fn mock_registry() -> (Arc<AgentRegistry>, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new());
    (Arc::new(AgentRegistry::new(connector.clone())), connector)
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    pub const AGENT_FLAG: &str = "Agent";
    pub const TEST_ENDPOINT: &str = "https://agents.test.example";
    pub const DEFAULT_AGENT_ID: &str = "asst_default";
    pub const NEW_AGENT_ID: &str = "asst_123";
    pub const OLD_AGENT_ID: &str = "asst_1";
    /// Listed in the exact-match allocation of [`agent_flag`].
    pub const TARGETED_USER: &str = "user-42";

    /// A variant pointing at an agent id.
    pub fn agent_variant(name: &str, agent_id: &str) -> VariantDefinition {
        VariantDefinition::new(
            name,
            BTreeMap::from([("agent_id".to_string(), agent_id.to_string())]),
        )
    }

    /// The agent flag: `user-42` pinned to `newAgent`, everyone else on
    /// `oldAgent`.
    pub fn agent_flag(enabled: bool) -> FlagDefinition {
        FlagDefinition {
            name: AGENT_FLAG.to_string(),
            enabled,
            variants: vec![
                agent_variant("oldAgent", OLD_AGENT_ID),
                agent_variant("newAgent", NEW_AGENT_ID),
            ],
            allocation: vec![
                Allocation::users("newAgent", [TARGETED_USER]),
                Allocation::weight("oldAgent", 1.0),
            ],
        }
    }

    /// A 50/50 split with no exact matches.
    pub fn split_flag() -> FlagDefinition {
        FlagDefinition {
            name: AGENT_FLAG.to_string(),
            enabled: true,
            variants: vec![
                agent_variant("oldAgent", OLD_AGENT_ID),
                agent_variant("newAgent", NEW_AGENT_ID),
            ],
            allocation: vec![
                Allocation::weight("oldAgent", 0.5),
                Allocation::weight("newAgent", 0.5),
            ],
        }
    }

    pub fn settings() -> BTreeMap<String, String> {
        BTreeMap::from([(AI_ENDPOINT_SETTING.to_string(), TEST_ENDPOINT.to_string())])
    }

    pub fn snapshot_with(version: SnapshotVersion, flags: Vec<FlagDefinition>) -> ConfigSnapshot {
        ConfigSnapshot::new(version, settings(), flags).expect("fixture snapshot is valid")
    }

    /// Snapshot holding [`agent_flag`].
    pub fn agent_snapshot(version: SnapshotVersion, enabled: bool) -> ConfigSnapshot {
        snapshot_with(version, vec![agent_flag(enabled)])
    }

    /// The wire document for [`agent_snapshot`]`(version, true)`.
    pub fn agent_document(version: SnapshotVersion) -> serde_json::Value {
        serde_json::json!({
            "version": version,
            "settings": { AI_ENDPOINT_SETTING: TEST_ENDPOINT },
            "feature_flags": [{
                "id": AGENT_FLAG,
                "enabled": true,
                "variants": [
                    { "name": "oldAgent", "configuration": OLD_AGENT_ID },
                    { "name": "newAgent", "configuration": { "agent_id": NEW_AGENT_ID } }
                ],
                "allocation": [
                    { "variant": "newAgent", "users": [TARGETED_USER] },
                    { "variant": "oldAgent", "weight": 1.0 }
                ]
            }]
        })
    }

    /// A store already holding `snapshot`, fed by `source` afterwards.
    pub fn store_with(
        source: Arc<dyn ConfigSource>,
        snapshot: ConfigSnapshot,
        options: StoreOptions,
    ) -> ConfigStore {
        ConfigStore::with_snapshot(source, snapshot, options)
    }

    /// Chat request carrying a prior exchange.
    pub fn request_with_history(message: &str) -> ChatRequest {
        let mut request = ChatRequest::new(message);
        request.history = vec![
            ChatMessage::new(ChatRole::User, "hello"),
            ChatMessage::new(ChatRole::Assistant, MockChatBackend::reply_for("hello")),
        ];
        request
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Switchboard types.

    use super::*;
    use proptest::prelude::*;

    /// Plausible authenticated user ids.
    pub fn arb_user_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.-]{0,23}".prop_map(|id| format!("user-{}", id))
    }

    pub fn arb_flag_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,15}"
    }

    /// Between 1 and `max` weights whose sum never exceeds 1.0.
    pub fn arb_weights(max: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0u32..=1000, 1..=max.max(1)).prop_map(|raw| {
            let total: u32 = raw.iter().sum();
            let scale = f64::from(total.max(1000));
            raw.into_iter().map(|w| f64::from(w) / scale).collect()
        })
    }

    /// An enabled flag with one weighted allocation per variant.
    pub fn arb_weighted_flag(name: String) -> impl Strategy<Value = FlagDefinition> {
        arb_weights(4).prop_map(move |weights| {
            let variants: Vec<VariantDefinition> = (0..weights.len())
                .map(|i| fixtures::agent_variant(&format!("variant{}", i), &format!("asst_{}", i)))
                .collect();
            let allocation = variants
                .iter()
                .zip(&weights)
                .map(|(variant, weight)| Allocation::weight(variant.name.clone(), *weight))
                .collect();
            FlagDefinition {
                name: name.clone(),
                enabled: true,
                variants,
                allocation,
            }
        })
    }

    pub fn arb_chat_role() -> impl Strategy<Value = ChatRole> {
        prop_oneof![Just(ChatRole::User), Just(ChatRole::Assistant), Just(ChatRole::System)]
    }

    /// A non-blank chat message.
    pub fn arb_message() -> impl Strategy<Value = String> {
        "[A-Za-z0-9?!.,' ]{0,64}[A-Za-z0-9?!]"
    }

    pub fn arb_history(max: usize) -> impl Strategy<Value = Vec<ChatMessage>> {
        prop::collection::vec(
            (arb_chat_role(), arb_message()).prop_map(|(role, text)| ChatMessage::new(role, text)),
            0..=max,
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Switchboard-specific validation.

    use super::*;

    /// Assert that the result is `ConfigError::Unavailable`.
    #[track_caller]
    pub fn assert_config_unavailable<T: std::fmt::Debug>(result: &SwitchboardResult<T>) {
        match result {
            Err(SwitchboardError::Config(ConfigError::Unavailable { .. })) => {}
            other => panic!("Expected Unavailable config error, got: {:?}", other),
        }
    }

    /// Assert that the result is `ValidationError::EmptyMessage`.
    #[track_caller]
    pub fn assert_empty_message<T: std::fmt::Debug>(result: &SwitchboardResult<T>) {
        match result {
            Err(SwitchboardError::Validation(ValidationError::EmptyMessage)) => {}
            other => panic!("Expected EmptyMessage, got: {:?}", other),
        }
    }

    /// Assert that the result is a backend call error.
    #[track_caller]
    pub fn assert_llm_error<T: std::fmt::Debug>(result: &SwitchboardResult<T>) {
        match result {
            Err(SwitchboardError::Llm(_)) => {}
            other => panic!("Expected Llm error, got: {:?}", other),
        }
    }

    /// Assert that a string property of `event` has the expected value.
    #[track_caller]
    pub fn assert_event_str(event: &MetricEvent, key: &str, expected: &str) {
        let actual = event.property(key).and_then(|value| value.as_str());
        assert_eq!(
            actual,
            Some(expected),
            "property '{}' of '{}' event",
            key,
            event.name
        );
    }

    /// Assert that the event's `csat` lies in `[low, high]` with two decimals.
    #[track_caller]
    pub fn assert_csat_within(event: &MetricEvent, low: f64, high: f64) {
        let csat = event
            .property("csat")
            .and_then(|value| value.as_f64())
            .unwrap_or_else(|| panic!("'{}' event has no numeric csat", event.name));
        assert!(
            (low..=high).contains(&csat),
            "csat {} outside [{}, {}]",
            csat,
            low,
            high
        );
        let cents = csat * 100.0;
        assert!(
            (cents - cents.round()).abs() < 1e-6,
            "csat {} has more than two decimals",
            csat
        );
    }

    /// Assert that exactly `expected` events named `name` were recorded.
    #[track_caller]
    pub fn assert_event_count(sink: &RecordingSink, name: &str, expected: usize) {
        let actual = sink.named(name).len();
        assert_eq!(actual, expected, "number of '{}' events", name);
    }
}
