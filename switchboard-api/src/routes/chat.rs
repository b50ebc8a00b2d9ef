//! Chat REST API Routes
//!
//! `POST /api/chat` routes one message to the agent selected for the
//! caller and returns the reply with the extended history.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use switchboard_core::{ChatRequest, ChatResponse};

use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::extractors::{session_cookie, Caller};
use crate::router::RequestRouter;
use crate::state::AppState;

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/chat - Send a message to the caller's agent
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "Chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Agent reply with extended history", body = ChatResponse),
        (status = 400, description = "Empty message or malformed body", body = ErrorBody),
        (
            status = 500,
            description = "Configuration unavailable or processing error",
            body = ErrorBody
        ),
    ),
)]
pub async fn chat(
    State(router): State<Arc<RequestRouter>>,
    Caller(caller): Caller,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected chat body");
        ApiError::invalid_body()
    })?;

    let outcome = router.handle_chat(&caller, request).await?;

    let mut response = Json(outcome.response).into_response();
    if let Some(cookie) = session_cookie(&outcome.identity) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the chat router, mounted under `/api`.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}
