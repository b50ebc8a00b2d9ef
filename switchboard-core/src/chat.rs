//! Chat payloads exchanged with callers and backends.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::ValidationError;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// RFC 3339 timestamp. Caller-supplied turns may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// A turn stamped with the current time.
    pub fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Inbound `POST /api/chat` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    /// Reject messages that are empty after trimming.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(())
    }
}

/// Outbound `POST /api/chat` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChatResponse {
    pub message: String,
    pub history: Vec<ChatMessage>,
}

/// What a backend returns for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub agent_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_history_defaults_to_empty() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.history.is_empty());
    }

    #[test]
    fn test_request_accepts_history_without_timestamps() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message":"next","history":[
                {"role":"user","content":"a"},
                {"role":"assistant","content":"b","timestamp":"2024-01-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(req.history.len(), 2);
        assert_eq!(req.history[0].timestamp, None);
        assert_eq!(req.history[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_validate_rejects_blank_message() {
        assert_eq!(
            ChatRequest::new("   ").validate(),
            Err(ValidationError::EmptyMessage)
        );
        assert_eq!(ChatRequest::new("").validate(), Err(ValidationError::EmptyMessage));
        assert!(ChatRequest::new("hello").validate().is_ok());
    }

    #[test]
    fn test_now_stamps_message() {
        let msg = ChatMessage::now(ChatRole::User, "hi");
        let stamp = msg.timestamp.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::new(ChatRole::Assistant, "x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
