//! In-process gateway harness driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use switchboard_api::{
    create_api_router, AppState, AuthenticatedUser, GatewayConfig, RequestRouter, RouterSettings,
};
use switchboard_config::{ConfigStore, InMemoryConfigSource, StoreOptions};
use switchboard_core::ConfigSnapshot;
use switchboard_test_utils::fixtures::{DEFAULT_AGENT_ID, TEST_ENDPOINT};
use switchboard_test_utils::{mock_registry, MockConnector, RecordingSink};

/// Admin bearer token configured by [`gateway_config`].
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestGateway {
    pub app: Router,
    pub state: AppState,
    pub source: Arc<InMemoryConfigSource>,
    pub sink: Arc<RecordingSink>,
    pub connector: Arc<MockConnector>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }

    /// `name=value` part of the `Set-Cookie` header.
    pub fn cookie_pair(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|c| c.split(';').next())
            .map(str::to_string)
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig::from_lookup(|key| match key {
        "SWITCHBOARD_CONFIG_ENDPOINT" => Some("file:///etc/switchboard/flags.json".to_string()),
        "SWITCHBOARD_DEFAULT_AGENT_ID" => Some(DEFAULT_AGENT_ID.to_string()),
        "SWITCHBOARD_AI_ENDPOINT" => Some(TEST_ENDPOINT.to_string()),
        "SWITCHBOARD_ADMIN_TOKEN" => Some(ADMIN_TOKEN.to_string()),
        _ => None,
    })
    .expect("test gateway config is valid")
}

pub fn gateway(snapshot: ConfigSnapshot) -> TestGateway {
    gateway_with(
        snapshot,
        RouterSettings::from_config(&gateway_config()),
        StoreOptions::new(),
    )
}

pub fn gateway_with(
    snapshot: ConfigSnapshot,
    settings: RouterSettings,
    options: StoreOptions,
) -> TestGateway {
    let source = Arc::new(InMemoryConfigSource::new(snapshot.clone()));
    let store = ConfigStore::with_snapshot(source.clone(), snapshot, options);
    let (registry, connector) = mock_registry();
    let sink = RecordingSink::new();
    let router = RequestRouter::new(store, registry, sink.clone(), settings);
    let config = gateway_config();
    let state = AppState::new(router).with_admin_token(config.admin_token.clone());
    let app = create_api_router(state.clone(), &config);
    TestGateway {
        app,
        state,
        source,
        sink,
        connector,
    }
}

impl TestGateway {
    /// Same gateway with manual refresh disabled.
    pub fn without_admin_token(mut self) -> Self {
        self.state = self.state.with_admin_token(None);
        self.app = create_api_router(self.state.clone(), &gateway_config());
        self
    }

    pub async fn call(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("valid request")
}

/// Attach an identity the way an outer auth layer would.
pub fn as_user(mut request: Request<Body>, user_id: &str) -> Request<Body> {
    request
        .extensions_mut()
        .insert(AuthenticatedUser::new(user_id));
    request
}

pub fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().expect("valid authorization header"),
    );
    request
}

pub fn with_cookie(mut request: Request<Body>, pair: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        pair.parse().expect("valid cookie header"),
    );
    request
}
