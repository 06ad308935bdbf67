use crate::transport::http::handlers::{execute, health};
use axum::routing::{get, post};
use axum::Router;

pub fn create_router(app_state: crate::transport::http::types::AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/execute", post(execute::execute_handler))
        .with_state(app_state)
}
