//! Chat backend over the OpenAI-compatible completions API

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::{BackendConnector, ChatBackend};
use switchboard_core::{
    AgentConfig, ChatMessage, ChatReply, ChatRole, SwitchboardResult,
};

/// Sends chat turns through an [`OpenAIClient`].
#[derive(Debug)]
pub struct OpenAIChatBackend {
    client: OpenAIClient,
}

impl OpenAIChatBackend {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }

    fn build_request(
        &self,
        agent: &AgentConfig,
        message: &str,
        history: &[ChatMessage],
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = &agent.system_prompt {
            messages.push(Message::new(ChatRole::System.as_str(), prompt.clone()));
        }
        messages.extend(
            history
                .iter()
                .map(|turn| Message::new(turn.role.as_str(), turn.content.clone())),
        );
        messages.push(Message::new(ChatRole::User.as_str(), message));

        // Azure routes on the deployment path and ignores this field.
        CompletionRequest {
            model: Some(agent.target.id().to_string()),
            messages,
            max_tokens: agent.max_completion_tokens,
            temperature: agent.temperature,
            top_p: 1.0,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAIChatBackend {
    fn provider(&self) -> &str {
        self.client.flavor().provider_name()
    }

    async fn send(
        &self,
        agent: &AgentConfig,
        message: &str,
        history: &[ChatMessage],
    ) -> SwitchboardResult<ChatReply> {
        let request = self.build_request(agent, message, history);
        let url = self
            .client
            .completions_url(agent.target.id(), &agent.api_version);
        let response: CompletionResponse = self.client.request(&url, &request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| invalid_response(self.provider(), "No choices in response"))?;

        Ok(ChatReply {
            text,
            agent_name: agent.display_name().to_string(),
        })
    }
}

/// Opens one [`OpenAIChatBackend`] per agent key.
pub struct OpenAIConnector {
    api_key: Option<SecretString>,
    request_timeout: Duration,
}

impl OpenAIConnector {
    pub fn new(api_key: Option<SecretString>, request_timeout: Duration) -> Self {
        Self {
            api_key,
            request_timeout,
        }
    }
}

#[async_trait]
impl BackendConnector for OpenAIConnector {
    async fn connect(&self, agent: &AgentConfig) -> SwitchboardResult<Arc<dyn ChatBackend>> {
        let client = OpenAIClient::new(
            agent.endpoint.clone(),
            self.api_key.clone(),
            self.request_timeout,
        )?;
        Ok(Arc::new(OpenAIChatBackend::new(client)))
    }
}

impl std::fmt::Debug for OpenAIConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConnector")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use switchboard_core::AgentDefaults;

    fn agent(pairs: &[(&str, &str)]) -> AgentConfig {
        let configuration: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_variant("v", &configuration, &AgentDefaults::default()).unwrap()
    }

    fn backend() -> OpenAIChatBackend {
        OpenAIChatBackend::new(
            OpenAIClient::new("https://api.openai.com/v1", None, Duration::from_secs(1)).unwrap(),
        )
    }

    #[test]
    fn test_request_orders_system_history_user() {
        let agent = agent(&[
            ("endpoint", "https://api.openai.com/v1"),
            ("model", "gpt-4o-mini"),
            ("system_prompt", "be brief"),
            ("temperature", "0.2"),
        ]);
        let history = vec![
            ChatMessage::new(ChatRole::User, "hi"),
            ChatMessage::new(ChatRole::Assistant, "hello"),
        ];
        let request = backend().build_request(&agent, "how are you?", &history);

        let roles: Vec<_> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(
            request.messages.last().unwrap().content.as_deref(),
            Some("how are you?")
        );
        assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.top_p, 1.0);
    }

    #[test]
    fn test_request_without_system_prompt() {
        let agent = agent(&[("endpoint", "https://x.example"), ("agent_id", "asst_1")]);
        let request = backend().build_request(&agent, "q", &[]);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.model.as_deref(), Some("asst_1"));
    }

    #[tokio::test]
    async fn test_connector_builds_backend_for_endpoint() {
        let connector = OpenAIConnector::new(None, Duration::from_secs(1));
        let agent = agent(&[("endpoint", "https://res.openai.azure.com"), ("agent_id", "a")]);
        let backend = connector.connect(&agent).await.unwrap();
        assert_eq!(backend.provider(), "azure-openai");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_failure() {
        let agent = agent(&[("endpoint", "http://127.0.0.1:1"), ("model", "m")]);
        let backend = OpenAIChatBackend::new(
            OpenAIClient::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap(),
        );
        let err = backend.send(&agent, "hi", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            switchboard_core::SwitchboardError::Llm(
                switchboard_core::LlmError::RequestFailed { .. }
            )
        ));
    }
}
