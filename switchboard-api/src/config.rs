//! Gateway Configuration Module
//!
//! Startup configuration read once from `SWITCHBOARD_*` environment
//! variables. Malformed values abort startup instead of silently falling
//! back to defaults.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchboard_config::{ConfigSource, FileConfigSource, HttpConfigSource, StoreOptions};
use switchboard_core::{AgentDefaults, ConfigError, SwitchboardResult, DEFAULT_API_VERSION};

const ENV_PREFIX: &str = "SWITCHBOARD_";

/// When the configuration store refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// At the top of each chat request.
    OnDemand,
    /// On a background interval.
    Background,
    /// Both of the above, sharing one single-flight path.
    Both,
}

impl RefreshMode {
    pub fn on_demand(&self) -> bool {
        matches!(self, Self::OnDemand | Self::Both)
    }

    pub fn background(&self) -> bool {
        matches!(self, Self::Background | Self::Both)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on-demand" | "on_demand" | "ondemand" => Some(Self::OnDemand),
            "background" => Some(Self::Background),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

// ============================================================================
// GATEWAY CONFIGURATION
// ============================================================================

/// Everything the gateway needs at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // ========================================================================
    // Remote configuration
    // ========================================================================
    /// `http(s)://` or `file://` address of the config document.
    pub config_endpoint: String,
    pub config_token: Option<SecretString>,
    pub refresh_interval: Duration,
    pub refresh_mode: RefreshMode,
    pub fetch_timeout: Duration,
    pub retry_backoff: Duration,

    // ========================================================================
    // Agent routing
    // ========================================================================
    /// Flag that selects the agent variant.
    pub agent_flag: String,
    pub default_agent_id: Option<String>,
    pub default_model: Option<String>,
    pub ai_endpoint: Option<String>,
    pub ai_api_key: Option<SecretString>,
    pub ai_api_version: String,
    pub backend_timeout: Duration,

    // ========================================================================
    // Telemetry
    // ========================================================================
    pub telemetry_endpoint: Option<String>,

    // ========================================================================
    // HTTP server
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,
    pub bind_host: String,
    pub port: u16,
    pub environment: String,
    /// Bearer token for `POST /api/config/refresh`. Unset disables the route.
    pub admin_token: Option<SecretString>,
}

impl GatewayConfig {
    /// Build from the process environment.
    ///
    /// Environment variables:
    /// - `SWITCHBOARD_CONFIG_ENDPOINT` (required)
    /// - `SWITCHBOARD_CONFIG_TOKEN`
    /// - `SWITCHBOARD_REFRESH_INTERVAL_SECS` (default: 30)
    /// - `SWITCHBOARD_REFRESH_MODE`: on-demand | background | both (default: on-demand)
    /// - `SWITCHBOARD_FETCH_TIMEOUT_MS` (default: 5000)
    /// - `SWITCHBOARD_REFRESH_RETRY_BACKOFF_SECS` (default: 5)
    /// - `SWITCHBOARD_AGENT_FLAG` (default: Agent)
    /// - `SWITCHBOARD_DEFAULT_AGENT_ID`, `SWITCHBOARD_DEFAULT_MODEL`
    /// - `SWITCHBOARD_AI_ENDPOINT`, `SWITCHBOARD_AI_API_KEY`
    /// - `SWITCHBOARD_AI_API_VERSION` (default: 2024-12-01-preview)
    /// - `SWITCHBOARD_BACKEND_TIMEOUT_MS` (default: 60000)
    /// - `SWITCHBOARD_TELEMETRY_ENDPOINT`
    /// - `SWITCHBOARD_CORS_ORIGINS`: comma-separated (empty = allow all)
    /// - `SWITCHBOARD_CORS_MAX_AGE_SECS` (default: 86400)
    /// - `SWITCHBOARD_API_BIND` (default: 0.0.0.0)
    /// - `PORT` or `SWITCHBOARD_API_PORT` (default: 3000)
    /// - `SWITCHBOARD_ENVIRONMENT` (default: development)
    /// - `SWITCHBOARD_ADMIN_TOKEN`: bearer token for manual refresh (unset = disabled)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str, default: u64| -> Result<u64, ConfigError> {
            match var(name) {
                Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    field: format!("{}{}", ENV_PREFIX, name),
                    value: raw,
                    reason: "expected a non-negative integer".to_string(),
                }),
                None => Ok(default),
            }
        };

        let config_endpoint = var("CONFIG_ENDPOINT").ok_or_else(|| ConfigError::MissingRequired {
            field: format!("{}CONFIG_ENDPOINT", ENV_PREFIX),
        })?;

        let refresh_mode = match var("REFRESH_MODE") {
            Some(raw) => RefreshMode::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{}REFRESH_MODE", ENV_PREFIX),
                value: raw,
                reason: "expected on-demand, background or both".to_string(),
            })?,
            None => RefreshMode::OnDemand,
        };

        let port_raw = lookup("PORT")
            .or_else(|| var("API_PORT"))
            .unwrap_or_else(|| "3000".to_string());
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                value: port_raw.clone(),
                reason: "expected a port number".to_string(),
            })?;

        let cors_origins = var("CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config_endpoint,
            config_token: var("CONFIG_TOKEN").map(SecretString::from),
            refresh_interval: Duration::from_secs(number("REFRESH_INTERVAL_SECS", 30)?),
            refresh_mode,
            fetch_timeout: Duration::from_millis(number("FETCH_TIMEOUT_MS", 5000)?),
            retry_backoff: Duration::from_secs(number("REFRESH_RETRY_BACKOFF_SECS", 5)?),
            agent_flag: var("AGENT_FLAG").unwrap_or_else(|| "Agent".to_string()),
            default_agent_id: var("DEFAULT_AGENT_ID"),
            default_model: var("DEFAULT_MODEL"),
            ai_endpoint: var("AI_ENDPOINT"),
            ai_api_key: var("AI_API_KEY").map(SecretString::from),
            ai_api_version: var("AI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            backend_timeout: Duration::from_millis(number("BACKEND_TIMEOUT_MS", 60_000)?),
            telemetry_endpoint: var("TELEMETRY_ENDPOINT"),
            cors_origins,
            cors_max_age_secs: number("CORS_MAX_AGE_SECS", 86_400)?,
            bind_host: var("API_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            admin_token: var("ADMIN_TOKEN").map(SecretString::from),
        })
    }

    /// Reject combinations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String, reason: &str| ConfigError::InvalidValue {
            field: format!("{}{}", ENV_PREFIX, field),
            value,
            reason: reason.to_string(),
        };

        if !is_supported_config_url(&self.config_endpoint) {
            return Err(invalid(
                "CONFIG_ENDPOINT",
                self.config_endpoint.clone(),
                "expected an http(s):// or file:// address",
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(invalid("REFRESH_INTERVAL_SECS", "0".to_string(), "must be positive"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(invalid("FETCH_TIMEOUT_MS", "0".to_string(), "must be positive"));
        }
        if self.backend_timeout.is_zero() {
            return Err(invalid("BACKEND_TIMEOUT_MS", "0".to_string(), "must be positive"));
        }
        if let Some(endpoint) = &self.telemetry_endpoint {
            if !is_http_url(endpoint) {
                return Err(invalid(
                    "TELEMETRY_ENDPOINT",
                    endpoint.clone(),
                    "expected an http(s):// address",
                ));
            }
        }
        if self.is_production() && self.cors_origins.is_empty() {
            return Err(invalid(
                "CORS_ORIGINS",
                String::new(),
                "must be set in production",
            ));
        }
        if self.default_agent_id.is_none() && self.default_model.is_none() {
            tracing::warn!(
                "No SWITCHBOARD_DEFAULT_AGENT_ID or SWITCHBOARD_DEFAULT_MODEL set; \
                 requests outside the flag allocation will fail"
            );
        }
        Ok(())
    }

    /// The remote config source named by `config_endpoint`.
    pub fn config_source(&self) -> SwitchboardResult<Arc<dyn ConfigSource>> {
        if let Some(file) = FileConfigSource::from_url(&self.config_endpoint) {
            return Ok(Arc::new(file));
        }
        if is_http_url(&self.config_endpoint) {
            let source = HttpConfigSource::new(
                self.config_endpoint.clone(),
                self.config_token.clone(),
                self.fetch_timeout,
            )?;
            return Ok(Arc::new(source));
        }
        Err(ConfigError::InvalidValue {
            field: format!("{}CONFIG_ENDPOINT", ENV_PREFIX),
            value: self.config_endpoint.clone(),
            reason: "unsupported scheme".to_string(),
        }
        .into())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new()
            .with_refresh_interval(self.refresh_interval)
            .with_fetch_timeout(self.fetch_timeout)
            .with_retry_backoff(self.retry_backoff)
    }

    /// Defaults applied to every variant payload.
    pub fn agent_defaults(&self) -> AgentDefaults {
        AgentDefaults {
            endpoint: self.ai_endpoint.clone(),
            api_version: self.ai_api_version.clone(),
            ..AgentDefaults::default()
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: format!("{}API_BIND", ENV_PREFIX),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn is_supported_config_url(url: &str) -> bool {
    is_http_url(url) || FileConfigSource::from_url(url).is_some()
}
