//! Caller extraction for the chat routes.
//!
//! Builds a [`CallerContext`] from what an outer layer has established
//! about the request: an [`AuthenticatedUser`] extension, if any, and the
//! `switchboard_session` cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use std::collections::BTreeSet;
use std::convert::Infallible;

use switchboard_core::{CallerContext, TargetingIdentity};

/// Name of the anonymous session cookie.
pub const SESSION_COOKIE: &str = "switchboard_session";

/// Identity established by an outer authentication layer.
///
/// Inserted as a request extension; this crate never authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub groups: BTreeSet<String>,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

/// Extractor yielding the caller's [`CallerContext`]. Never rejects.
#[derive(Debug, Clone)]
pub struct Caller(pub CallerContext);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut caller = CallerContext::anonymous();
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            caller = CallerContext::authenticated(user.user_id.clone())
                .with_groups(user.groups.iter().cloned());
        }
        if let Some(session) = read_cookie(&parts.headers, SESSION_COOKIE) {
            caller = caller.with_session(session);
        }
        Ok(Caller(caller))
    }
}

/// First value of cookie `name` across all `Cookie` headers.
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value handing a freshly minted session back to the caller.
///
/// `None` unless the identity was minted on this request.
pub fn session_cookie(identity: &TargetingIdentity) -> Option<HeaderValue> {
    if !identity.is_new_session() {
        return None;
    }
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE,
        identity.user_id()
    ))
    .ok()
}
