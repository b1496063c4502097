use axum::{routing::get, Json, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::info;

use tosspay_reconciler::api::callbacks::{handle_toss_callback, CallbackState};
use tosspay_reconciler::config::AppConfig;
use tosspay_reconciler::health::check_health;
use tosspay_reconciler::ledger::PgPaymentStore;
use tosspay_reconciler::logging::{init_tracing, mask_secret};
use tosspay_reconciler::middleware::{request_logging_middleware, UuidRequestId};
use tosspay_reconciler::payments::toss::TossClient;
use tosspay_reconciler::services::callback_processor::CallbackProcessor;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    config.validate()?;

    info!(
        base_url = %config.provider.base_url,
        secret_key = %mask_secret(&config.provider.secret_key),
        "Provider client configured"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect(&config.database.url)
        .await?;
    info!("Database pool established");

    let store = Arc::new(PgPaymentStore::new(pool.clone()));
    let provider = Arc::new(TossClient::new(config.provider.clone())?);
    let processor = Arc::new(CallbackProcessor::new(store, provider));

    let callback_state = Arc::new(CallbackState {
        processor,
        redirects: config.redirects.clone(),
    });

    let health_pool = pool.clone();
    let app = Router::new()
        .route("/", get(|| async { "tosspay-reconciler" }))
        .route(
            "/health",
            get(move || {
                let pool = health_pool.clone();
                async move { Json(check_health(Some(&pool)).await) }
            }),
        )
        .route("/callbacks/toss", get(handle_toss_callback))
        .with_state(callback_state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
