//! Health Check Endpoints
//!
//! Provides Kubernetes-compatible health check endpoints:
//! - /health/ping - Simple liveness check
//! - /health/ready - Configuration freshness check
//! - /health/live - Process alive check
//!
//! No authentication required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use switchboard_config::{ConfigStore, StoreStatus};
use switchboard_core::SnapshotVersion;

use crate::state::AppState;

/// A snapshot older than this many refresh intervals marks the service degraded.
pub const STALE_AFTER_INTERVALS: u32 = 10;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub config: ConfigHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigHealth {
    pub status: HealthStatus,
    pub source: String,
    pub snapshot_version: SnapshotVersion,
    pub last_success_age_seconds: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ConfigHealth {
    fn from_status(source: &str, status: StoreStatus) -> Self {
        let stale_after = status
            .refresh_interval
            .checked_mul(STALE_AFTER_INTERVALS)
            .unwrap_or(Duration::MAX);
        let health = if status.last_success_age > stale_after {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status: health,
            source: source.to_string(),
            snapshot_version: status.version,
            last_success_age_seconds: status.last_success_age.as_secs(),
            consecutive_failures: status.consecutive_failures,
            last_error: status.last_error,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
)]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (configuration freshness)
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Configuration is stale", body = HealthResponse),
    ),
)]
pub async fn readiness(
    State(store): State<ConfigStore>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let config = ConfigHealth::from_status(store.source_name(), store.status());
    let overall_status = config.status;

    if overall_status == HealthStatus::Degraded {
        tracing::warn!(
            last_success_age_seconds = config.last_success_age_seconds,
            consecutive_failures = config.consecutive_failures,
            "Configuration snapshot is stale"
        );
    }

    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(age: Duration, interval: Duration) -> StoreStatus {
        StoreStatus {
            version: 4,
            last_success_age: age,
            consecutive_failures: 2,
            last_error: Some("fetch timed out".to_string()),
            refresh_interval: interval,
        }
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            message: None,
            details: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "degraded" }));
    }

    #[test]
    fn test_fresh_snapshot_is_healthy() {
        let fresh = status(Duration::from_secs(60), Duration::from_secs(30));
        let health = ConfigHealth::from_status("http", fresh);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.snapshot_version, 4);
        assert_eq!(health.consecutive_failures, 2);
    }

    #[test]
    fn test_stale_snapshot_is_degraded() {
        let interval = Duration::from_secs(30);
        let at_limit = ConfigHealth::from_status("http", status(interval * 10, interval));
        assert_eq!(at_limit.status, HealthStatus::Healthy);

        let past = status(interval * 10 + Duration::from_secs(1), interval);
        let past_limit = ConfigHealth::from_status("http", past);
        assert_eq!(past_limit.status, HealthStatus::Degraded);
        assert_eq!(past_limit.last_error.as_deref(), Some("fetch timed out"));
    }
}
