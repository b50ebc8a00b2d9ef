//! Caller context and targeting identity types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{SwitchboardResult, ValidationError};

/// Where a targeting identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Supplied by an outer authentication layer.
    Authenticated,
    /// Reused from an existing session.
    Session,
    /// Freshly minted for a caller without a session.
    Minted,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Session => "session",
            Self::Minted => "minted",
        }
    }
}

/// Stable per-caller key used for deterministic variant assignment.
///
/// `user_id` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetingIdentity {
    user_id: String,
    groups: BTreeSet<String>,
    source: IdentitySource,
}

impl TargetingIdentity {
    pub fn new(
        user_id: impl Into<String>,
        groups: BTreeSet<String>,
        source: IdentitySource,
    ) -> SwitchboardResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "user_id".to_string(),
                reason: "targeting identity requires a non-empty user id".to_string(),
            }
            .into());
        }
        Ok(Self {
            user_id,
            groups,
            source,
        })
    }

    /// Identity for a session id. Session ids are uuids and never empty.
    pub fn for_session(session: SessionId, source: IdentitySource) -> Self {
        Self {
            user_id: session.to_string(),
            groups: BTreeSet::new(),
            source,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    /// True when the identity was minted for this request.
    pub fn is_new_session(&self) -> bool {
        self.source == IdentitySource::Minted
    }
}

/// 128-bit session identifier for anonymous callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mint a random (v4) session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session id presented by a caller. Anything that is not a uuid
    /// is rejected so callers cannot pick colliding ids.
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = Uuid::parse_str(raw.trim()).ok()?;
        if parsed.is_nil() {
            return None;
        }
        Some(Self(parsed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the web layer knows about the caller of a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// Authenticated user id, when an auth layer vouched for the caller.
    pub authenticated_user: Option<String>,
    /// Group memberships attached by the auth layer.
    pub groups: BTreeSet<String>,
    /// Raw session id presented by the caller (cookie), if any.
    pub session_id: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            authenticated_user: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}
