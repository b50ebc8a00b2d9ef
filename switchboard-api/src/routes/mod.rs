//! REST API Route Handlers
//!
//! - `POST /api/chat`, `GET /api/chat/model`
//! - `POST /api/config/refresh`
//! - `/health/*`, `/metrics`, `/openapi.json`

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::GatewayConfig;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod chat;
pub mod config;
pub mod health;
pub mod model;

pub use chat::chat;
pub use config::RefreshResponse;
pub use health::{HealthResponse, HealthStatus};
pub use model::ModelInfo;

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from GatewayConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &GatewayConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        // The session cookie must survive cross-origin calls.
        cors.allow_origin(origins).allow_credentials(true)
    }
}

/// Create the complete gateway router.
///
/// Health, metrics and the OpenAPI document sit beside the `/api` routes;
/// every route passes through the observability middleware and CORS.
pub fn create_api_router(state: AppState, config: &GatewayConfig) -> Router {
    let api_routes = Router::new()
        .merge(chat::create_router())
        .merge(model::create_router())
        .nest("/config", config::create_router());

    let router = Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state);

    router
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
}
