//! Switchboard LLM - Backend Abstraction Layer
//!
//! Provider-agnostic traits for chat backends, the registry that keeps one
//! live client per agent key, and an OpenAI-compatible provider.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use switchboard_core::{
    AgentConfig, AgentError, ChatMessage, ChatReply, LlmError, SwitchboardResult,
};

pub mod providers;
pub mod registry;

pub use providers::{OpenAIChatBackend, OpenAIClient, OpenAIConnector};
pub use registry::{AgentHandle, AgentRegistry};

// ============================================================================
// BACKEND TRAITS
// ============================================================================

/// An opaque chat completion backend.
///
/// One instance is a reusable connection; the per-call [`AgentConfig`]
/// carries the target and sampling parameters.
///
/// # Example
/// ```ignore
/// struct EchoBackend;
///
/// #[async_trait]
/// impl ChatBackend for EchoBackend {
///     fn provider(&self) -> &str { "echo" }
///
///     async fn send(&self, agent: &AgentConfig, message: &str, _history: &[ChatMessage])
///         -> SwitchboardResult<ChatReply> {
///         Ok(ChatReply {
///             text: message.to_string(),
///             agent_name: agent.display_name().to_string(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name for logs and metric labels.
    fn provider(&self) -> &str;

    /// Send one user message with prior history.
    ///
    /// # Returns
    /// * `Ok(ChatReply)` - Reply text plus the agent display name
    /// * `Err(SwitchboardError::Llm)` - If the call fails
    async fn send(
        &self,
        agent: &AgentConfig,
        message: &str,
        history: &[ChatMessage],
    ) -> SwitchboardResult<ChatReply>;
}

/// Opens backend connections for agent configurations.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, agent: &AgentConfig) -> SwitchboardResult<Arc<dyn ChatBackend>>;
}

// ============================================================================
// MOCK PROVIDERS (for testing)
// ============================================================================

/// Mock chat backend for testing.
/// Replies deterministically based on the message.
#[derive(Debug, Default)]
pub struct MockChatBackend {
    reply_delay: Duration,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Make subsequent calls fail with a 503.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The reply text produced for `message`.
    pub fn reply_for(message: &str) -> String {
        format!("echo: {}", message)
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        agent: &AgentConfig,
        message: &str,
        _history: &[ChatMessage],
    ) -> SwitchboardResult<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.reply_delay.is_zero() {
            tokio::time::sleep(self.reply_delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::RequestFailed {
                provider: "mock".to_string(),
                status: 503,
                message: "mock backend unavailable".to_string(),
            }
            .into());
        }
        Ok(ChatReply {
            text: Self::reply_for(message),
            agent_name: agent.display_name().to_string(),
        })
    }
}

/// Mock connector for testing.
/// Hands out one shared [`MockChatBackend`] and counts connects.
#[derive(Debug, Default)]
pub struct MockConnector {
    backend: Arc<MockChatBackend>,
    connect_delay: Duration,
    fail: AtomicBool,
    connections: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<MockChatBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Make subsequent connects fail.
    pub fn fail_connects(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> Arc<MockChatBackend> {
        Arc::clone(&self.backend)
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self, agent: &AgentConfig) -> SwitchboardResult<Arc<dyn ChatBackend>> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgentError::CreationFailed {
                key: agent.key().to_string(),
                reason: "mock connector refused".to_string(),
            }
            .into());
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use switchboard_core::{AgentDefaults, ChatRole, SwitchboardError};

    fn agent() -> AgentConfig {
        let configuration = BTreeMap::from([
            ("endpoint".to_string(), "https://ai.example".to_string()),
            ("agent_id".to_string(), "asst_1".to_string()),
        ]);
        AgentConfig::from_variant("v", &configuration, &AgentDefaults::default()).unwrap()
    }

    #[tokio::test]
    async fn test_mock_backend_echoes() {
        let backend = MockChatBackend::new();
        let history = vec![ChatMessage::new(ChatRole::User, "earlier")];
        let reply = backend.send(&agent(), "hello", &history).await.unwrap();
        assert_eq!(reply.text, "echo: hello");
        assert_eq!(reply.agent_name, "asst_1");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_failure() {
        let backend = MockChatBackend::new();
        backend.fail_sends(true);
        let err = backend.send(&agent(), "hello", &[]).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::Llm(LlmError::RequestFailed { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_mock_connector_shares_backend() {
        let connector = MockConnector::new();
        let a = connector.connect(&agent()).await.unwrap();
        let b = connector.connect(&agent()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connections(), 2);
    }

    #[tokio::test]
    async fn test_mock_connector_failure() {
        let connector = MockConnector::new();
        connector.fail_connects(true);
        assert!(connector.connect(&agent()).await.is_err());
        assert_eq!(connector.connections(), 0);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use switchboard_core::AgentDefaults;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_registry_keys_ignore_sampling(
            id in "asst_[a-z0-9]{1,8}",
            t1 in 0.0f32..2.0,
            t2 in 0.0f32..2.0,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let connector = Arc::new(MockConnector::new());
                let registry = AgentRegistry::new(connector.clone());
                let defaults = AgentDefaults {
                    endpoint: Some("https://ai.example".to_string()),
                    ..AgentDefaults::default()
                };
                for t in [t1, t2] {
                    let configuration = BTreeMap::from([
                        ("agent_id".to_string(), id.clone()),
                        ("temperature".to_string(), t.to_string()),
                    ]);
                    let agent = AgentConfig::from_variant("v", &configuration, &defaults).unwrap();
                    registry.get_or_create(&agent).await.unwrap();
                }
                assert_eq!(connector.connections(), 1);
                assert_eq!(registry.len(), 1);
            });
        }
    }
}
