//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use secrecy::SecretString;
use switchboard_config::ConfigStore;

use crate::extractors::AdminToken;
use crate::router::RequestRouter;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    /// Same store the router reads; exposed for health and refresh routes.
    pub store: ConfigStore,
    pub start_time: Instant,
    /// Gate for `POST /api/config/refresh`.
    pub admin_token: AdminToken,
}

impl AppState {
    pub fn new(router: RequestRouter) -> Self {
        let store = router.store().clone();
        Self {
            router: Arc::new(router),
            store,
            start_time: Instant::now(),
            admin_token: AdminToken::default(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<SecretString>) -> Self {
        self.admin_token = AdminToken::new(token);
        self
    }
}

crate::impl_from_ref!(Arc<RequestRouter>, router);
crate::impl_from_ref!(ConfigStore, store);
crate::impl_from_ref!(Instant, start_time);
crate::impl_from_ref!(AdminToken, admin_token);
