//! HTTP configuration source.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{outcome_since, ConfigSource, FetchOutcome};
use crate::document::decode_snapshot;
use switchboard_core::{ConfigError, SnapshotVersion, SwitchboardResult};

const SOURCE_NAME: &str = "http";
const MAX_LOGGED_BODY: usize = 512;

/// Polls a remote endpoint with `GET <endpoint>?since=<version>`.
pub struct HttpConfigSource {
    client: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl HttpConfigSource {
    /// Create a source for `endpoint`.
    ///
    /// `request_timeout` bounds a single HTTP exchange; the store applies
    /// its own timeout on top.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<SecretString>,
        request_timeout: Duration,
    ) -> SwitchboardResult<Self> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "config_endpoint".to_string(),
                value: endpoint.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn failed(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::FetchFailed {
            source_name: SOURCE_NAME.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, since: Option<SnapshotVersion>) -> SwitchboardResult<FetchOutcome> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(version) = since {
            request = request.query(&[("since", version)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::Unchanged);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_LOGGED_BODY).collect();
            return Err(self
                .failed(format!("unexpected status {}: {}", status.as_u16(), body))
                .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.failed(format!("failed to read body: {}", e)))?;
        let snapshot = decode_snapshot(&bytes)?;
        Ok(outcome_since(snapshot, since))
    }
}

impl std::fmt::Debug for HttpConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigSource")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
