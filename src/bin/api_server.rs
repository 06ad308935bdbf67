// src/bin/api_server.rs

use softgate::infra::config;
use softgate::transport;
use softgate::DatabaseService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let connection = config::connection_config()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(connection.log_verbosity().filter_directive())),
        )
        .with_target(false)
        .init();

    // --- Policy ---
    let policy = Arc::new(config::field_policy());
    tracing::info!(
        soft_delete_models = ?policy.soft_delete_models().collect::<Vec<_>>(),
        temporal_fields = ?policy.temporal_fields().collect::<Vec<_>>(),
        "field policy loaded"
    );

    // --- Database (fatal when every attempt fails) ---
    tracing::info!(db = %connection.redacted_url(), "connecting to database");
    let db_service = match DatabaseService::connect(connection, policy).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "failed to start application");
            return Err(e.into());
        }
    };

    // --- API server ---
    let app_state = transport::http::AppState { pipeline: db_service.pipeline().clone() };
    let app = transport::http::create_router(app_state);
    let addr = config::listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "api server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, closing database pool");
            db_service.close().await;
        }
    }

    Ok(())
}
