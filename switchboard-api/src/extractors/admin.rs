//! Bearer-token gate for operational routes.
//!
//! The expected token comes from `SWITCHBOARD_ADMIN_TOKEN`. Without one the
//! gated routes answer 403 for everybody.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

use switchboard_core::compute_content_hash;

use crate::error::ApiError;

/// The configured admin token, if any.
#[derive(Clone, Default)]
pub struct AdminToken(Option<Arc<SecretString>>);

impl AdminToken {
    pub fn new(token: Option<SecretString>) -> Self {
        Self(token.map(Arc::new))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    /// Compares digests so the check does not short-circuit on a shared
    /// prefix of the raw tokens.
    fn matches(expected: &SecretString, presented: &str) -> bool {
        compute_content_hash(expected.expose_secret().as_bytes())
            == compute_content_hash(presented.as_bytes())
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.is_configured() { "[REDACTED]" } else { "None" };
        f.debug_tuple("AdminToken").field(&shown).finish()
    }
}

/// Proof that the request carried the admin bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[async_trait]
impl<S> FromRequestParts<S> for AdminAccess
where
    AdminToken: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AdminToken(expected) = AdminToken::from_ref(state);
        let Some(expected) = expected else {
            tracing::warn!(
                path = %parts.uri.path(),
                "Admin route called without an admin token configured"
            );
            return Err(ApiError::forbidden("Manual refresh is disabled"));
        };

        let auth_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::unauthorized("Authentication required: provide an Authorization header")
            })?;
        let token = auth_value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::unauthorized("Authorization header must use Bearer scheme")
        })?;

        if !AdminToken::matches(&expected, token.trim()) {
            tracing::warn!(path = %parts.uri.path(), "Rejected admin request with a bad token");
            return Err(ApiError::unauthorized("Invalid admin token"));
        }
        Ok(AdminAccess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::post("/api/config/refresh");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn check(token: Option<&str>, authorization: Option<&str>) -> Result<(), ApiError> {
        let state = AdminToken::new(token.map(SecretString::from));
        AdminAccess::from_request_parts(&mut parts(authorization), &state)
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn test_matching_token_is_admitted() {
        assert!(check(Some("s3cret"), Some("Bearer s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejections() {
        let cases = [
            (None, Some("Bearer s3cret"), StatusCode::FORBIDDEN),
            (Some("s3cret"), None, StatusCode::UNAUTHORIZED),
            (Some("s3cret"), Some("Basic czNjcmV0"), StatusCode::UNAUTHORIZED),
            (Some("s3cret"), Some("Bearer s3cre"), StatusCode::UNAUTHORIZED),
        ];
        for (token, header, status) in cases {
            let err = check(token, header).await.unwrap_err();
            assert_eq!(err.status_code(), status, "{:?} / {:?}", token, header);
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AdminToken::new(Some(SecretString::from("s3cret")));
        assert_eq!(format!("{:?}", token), r#"AdminToken("[REDACTED]")"#);
        assert_eq!(format!("{:?}", AdminToken::default()), r#"AdminToken("None")"#);
    }
}
