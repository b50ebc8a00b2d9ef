//! Agent selection lookup.
//!
//! `GET /api/chat/model` reports which agent the caller would be routed to.
//! It never calls the backend and emits no telemetry.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use switchboard_core::SnapshotVersion;

use crate::error::{ApiResult, ErrorBody};
use crate::extractors::{session_cookie, Caller};
use crate::router::RequestRouter;
use crate::state::AppState;

/// The agent selected for a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelInfo {
    /// Variant name, or `default` for the fallback agent.
    pub variant: String,
    /// Agent id or model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// False when no variant applies and no fallback agent exists.
    pub configured: bool,
    pub config_version: SnapshotVersion,
}

/// GET /api/chat/model - Describe the caller's agent
#[utoipa::path(
    get,
    path = "/api/chat/model",
    tag = "Chat",
    responses(
        (status = 200, description = "Selected agent", body = ModelInfo),
        (status = 500, description = "Variant configuration is invalid", body = ErrorBody),
    ),
)]
pub async fn current_model(
    State(router): State<Arc<RequestRouter>>,
    Caller(caller): Caller,
) -> ApiResult<Response> {
    let snapshot = router.store().current();
    let identity = router.resolve_identity(&caller);
    let selection = router.select_agent(&snapshot, &identity)?;

    let info = ModelInfo {
        configured: selection.agent.is_some(),
        agent: selection
            .agent
            .as_ref()
            .map(|agent| agent.display_name().to_string()),
        endpoint: selection.agent.map(|agent| agent.endpoint),
        variant: selection.variant,
        config_version: selection.config_version,
    };

    let mut response = Json(info).into_response();
    if let Some(cookie) = session_cookie(&identity) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/chat/model", get(current_model))
}
