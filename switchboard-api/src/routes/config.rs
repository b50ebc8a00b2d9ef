//! Configuration Management Routes
//!
//! `POST /api/config/refresh` forces a refresh of the configuration
//! snapshot, ignoring the refresh interval but not the failure backoff.
//! Requires the admin bearer token.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use switchboard_core::SnapshotVersion;

use crate::error::ErrorBody;
use crate::extractors::AdminAccess;
use crate::router::RequestRouter;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RefreshResponse {
    /// True only when a newer snapshot was published.
    pub refreshed: bool,
    /// Version in effect after the attempt.
    pub version: SnapshotVersion,
    /// `updated`, `unchanged`, `failed` or `skipped` (backoff running).
    pub outcome: String,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/config/refresh - Refresh the configuration snapshot now
#[utoipa::path(
    post,
    path = "/api/config/refresh",
    tag = "Config",
    responses(
        (status = 200, description = "Refresh attempted", body = RefreshResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorBody),
        (status = 403, description = "No admin token configured", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
)]
pub async fn refresh_config(
    _admin: AdminAccess,
    State(router): State<Arc<RequestRouter>>,
) -> Json<RefreshResponse> {
    let outcome = router.store().force_refresh().await;
    router.record_refresh(outcome);
    let version = router.store().current().version();

    tracing::info!(outcome = outcome.as_str(), version, "Manual configuration refresh");

    Json(RefreshResponse {
        refreshed: outcome.is_updated(),
        version,
        outcome: outcome.as_str().to_string(),
    })
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/refresh", post(refresh_config))
}
