//! Switchboard Core - Data Types
//!
//! Pure data structures and the error taxonomy shared by every other crate.
//! Nothing in here performs I/O.

use sha2::{Digest, Sha256};

pub mod agent;
pub mod chat;
pub mod error;
pub mod snapshot;
pub mod targeting;
pub mod telemetry;

pub use agent::{
    keys as agent_keys, AgentConfig, AgentDefaults, AgentKey, AgentTarget, AI_ENDPOINT_SETTING,
    DEFAULT_API_VERSION,
};
pub use chat::{ChatMessage, ChatReply, ChatRequest, ChatResponse, ChatRole};
pub use error::{
    AgentError, ConfigError, LlmError, SwitchboardError, SwitchboardResult, ValidationError,
};
pub use snapshot::{
    Allocation, AllocationTarget, ConfigSnapshot, FlagDefinition, SnapshotVersion,
    VariantDefinition, WEIGHT_EPSILON,
};
pub use targeting::{CallerContext, IdentitySource, SessionId, TargetingIdentity};
pub use telemetry::{
    MetricEvent, PropertyValue, TelemetrySink, AGENT_METRICS_EVENT, FEATURE_EVALUATION_EVENT,
};

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let hash = compute_content_hash(b"user-42\nAgent");
        assert_eq!(hash, compute_content_hash(b"user-42\nAgent"));
        assert_ne!(hash, compute_content_hash(b"user-43\nAgent"));
    }

    #[test]
    fn test_content_hash_known_vector() {
        assert_eq!(
            hex::encode(compute_content_hash(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_agent_key_digest_depends_only_on_key(
            endpoint in "https://[a-z]{1,12}\\.example",
            id in "[a-z0-9_]{1,16}",
        ) {
            let a = AgentKey::new(endpoint.clone(), AgentTarget::Assistant(id.clone()));
            let b = AgentKey::new(format!("{}/", endpoint), AgentTarget::Assistant(id));
            prop_assert_eq!(a.digest(), b.digest());
            prop_assert_eq!(a.digest().len(), 64);
        }

        #[test]
        fn prop_blank_messages_never_validate(ws in "[ \\t\\n]{0,8}") {
            prop_assert!(ChatRequest::new(ws).validate().is_err());
        }
    }
}
