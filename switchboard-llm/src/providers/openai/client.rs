//! OpenAI / Azure OpenAI HTTP client

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use switchboard_core::{AgentError, SwitchboardResult};

/// Wire dialect spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `/openai/deployments/{deployment}/chat/completions?api-version=...`
    /// authenticated with an `api-key` header.
    Azure,
    /// `/chat/completions` with the model in the body and a bearer token.
    OpenAI,
}

impl ApiFlavor {
    /// Infer the dialect from the endpoint host.
    pub fn detect(endpoint: &str) -> Self {
        let lower = endpoint.to_ascii_lowercase();
        if lower.contains(".openai.azure.com")
            || lower.contains(".cognitiveservices.azure.com")
            || lower.contains(".services.ai.azure.com")
        {
            Self::Azure
        } else {
            Self::OpenAI
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Azure => "azure-openai",
            Self::OpenAI => "openai",
        }
    }
}

/// A connection to one endpoint. Reused across calls and targets.
pub struct OpenAIClient {
    client: Client,
    api_key: Option<SecretString>,
    endpoint: String,
    flavor: ApiFlavor,
}

impl OpenAIClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> SwitchboardResult<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::CreationFailed {
                key: endpoint.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            flavor: ApiFlavor::detect(&endpoint),
            client,
            api_key,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    /// Chat completions URL for a deployment or model.
    pub fn completions_url(&self, target: &str, api_version: &str) -> String {
        match self.flavor {
            ApiFlavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, target, api_version
            ),
            ApiFlavor::OpenAI => format!("{}/chat/completions", self.endpoint),
        }
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        url: &str,
        body: &Req,
    ) -> SwitchboardResult<Res> {
        let provider = self.flavor.provider_name();
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = match self.flavor {
                ApiFlavor::Azure => request.header("api-key", key.expose_secret()),
                ApiFlavor::OpenAI => request.bearer_auth(key.expose_secret()),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_failed(provider, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| invalid_response(provider, format!("Failed to parse response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => error_text,
            };

            Err(match status {
                StatusCode::TOO_MANY_REQUESTS => rate_limited(provider, retry_after_ms),
                _ => request_failed(provider, status.as_u16(), error_msg),
            })
        }
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after-ms")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .or_else(|| {
            headers
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
                .map(|seconds| (seconds * 1000.0) as u64)
        })
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("endpoint", &self.endpoint)
            .field("flavor", &self.flavor)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_flavor_detection() {
        assert_eq!(
            ApiFlavor::detect("https://my-res.openai.azure.com"),
            ApiFlavor::Azure
        );
        assert_eq!(
            ApiFlavor::detect("https://proj.services.ai.azure.com/"),
            ApiFlavor::Azure
        );
        assert_eq!(
            ApiFlavor::detect("https://api.openai.com/v1"),
            ApiFlavor::OpenAI
        );
    }

    #[test]
    fn test_completions_url() {
        let azure = OpenAIClient::new(
            "https://my-res.openai.azure.com/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            azure.completions_url("asst_123", "2024-12-01-preview"),
            concat!(
                "https://my-res.openai.azure.com/openai/deployments/asst_123",
                "/chat/completions?api-version=2024-12-01-preview"
            )
        );

        let openai =
            OpenAIClient::new("https://api.openai.com/v1", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            openai.completions_url("gpt-4o", "ignored"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(1500));
        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(parse_retry_after_ms(&headers), Some(250));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = OpenAIClient::new(
            "https://api.openai.com/v1",
            Some(SecretString::from("sk-very-secret")),
            Duration::from_secs(1),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-very-secret"));
    }
}
