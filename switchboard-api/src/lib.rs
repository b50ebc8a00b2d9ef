//! Switchboard API - HTTP Gateway
//!
//! Exposes `POST /api/chat` and its companion routes over Axum. Each
//! request is routed to the backend agent that the remotely managed agent
//! flag selects for the caller.

pub mod config;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod openapi;
pub mod router;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{GatewayConfig, RefreshMode};
pub use error::{ApiError, ApiResult, ErrorBody, ErrorCode};
pub use extractors::{AdminAccess, AdminToken, AuthenticatedUser, Caller, SESSION_COOKIE};
pub use openapi::ApiDoc;
pub use router::{
    AgentSelection, ChatOutcome, CsatPolicy, RequestRouter, RequestStage, RouterSettings,
    FALLBACK_VARIANT,
};
pub use routes::create_api_router;
pub use state::AppState;
