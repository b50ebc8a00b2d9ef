//! Switchboard Gateway Entry Point
//!
//! Reads configuration, loads the initial snapshot (startup fails without
//! one), and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use switchboard_config::ConfigStore;
use switchboard_core::TelemetrySink;
use switchboard_llm::{AgentRegistry, OpenAIConnector};
use tokio::sync::watch;

use switchboard_api::telemetry::{
    init_tracer, FanoutSink, HttpTelemetrySink, LogTelemetrySink, TelemetryConfig,
};
use switchboard_api::{
    create_api_router, ApiError, ApiResult, AppState, GatewayConfig, RequestRouter,
    RouterSettings,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    let tracer = init_tracer(&telemetry_config)?;

    let config = GatewayConfig::from_env()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| ApiError::internal_error(format!("Invalid configuration: {}", e)))?;

    let source = config
        .config_source()
        .map_err(|e| ApiError::internal_error(format!("Invalid config source: {}", e)))?;
    let store = ConfigStore::load(source, config.store_options())
        .await
        .map_err(|e| ApiError::internal_error(format!("Configuration unavailable: {}", e)))?;

    let sink = build_sink(&config)?;
    let connector = Arc::new(OpenAIConnector::new(
        config.ai_api_key.clone(),
        config.backend_timeout,
    ));
    let registry = Arc::new(AgentRegistry::new(connector));

    let router = RequestRouter::new(
        store.clone(),
        registry,
        sink,
        RouterSettings::from_config(&config),
    );
    let state = AppState::new(router).with_admin_token(config.admin_token.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_loop = if config.refresh_mode.background() {
        let router = Arc::clone(&state.router);
        Some(store.spawn_refresh_loop(shutdown_rx, move |outcome| {
            router.record_refresh(outcome)
        }))
    } else {
        None
    };

    let app: Router = create_api_router(state, &config);

    let addr = config
        .bind_addr()
        .map_err(|e| ApiError::internal_error(format!("Invalid bind address: {}", e)))?;
    tracing::info!(
        %addr,
        source = store.source_name(),
        version = store.current().version(),
        refresh_mode = ?config.refresh_mode,
        manual_refresh = config.admin_token.is_some(),
        "Starting Switchboard gateway"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresh_loop {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Refresh loop ended abnormally");
        }
    }

    tracer.shutdown();
    Ok(())
}

fn build_sink(config: &GatewayConfig) -> ApiResult<Arc<dyn TelemetrySink>> {
    let mut sink = FanoutSink::new().with(Arc::new(LogTelemetrySink));
    if let Some(endpoint) = &config.telemetry_endpoint {
        let http = HttpTelemetrySink::new(endpoint.clone(), config.fetch_timeout)
            .map_err(|e| ApiError::internal_error(format!("Invalid telemetry sink: {}", e)))?;
        tracing::info!(endpoint = %endpoint, "Publishing metric events over HTTP");
        sink = sink.with(Arc::new(http));
    }
    Ok(Arc::new(sink))
}
