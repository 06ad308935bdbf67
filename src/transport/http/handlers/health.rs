use crate::transport::http::types::{ApiResponse, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.ping().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(serde_json::json!({ "status": "ok" })))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(serde_json::json!({ "status": "unhealthy" })),
                error: Some(format!("DB ping failed: {}", e)),
            }),
        )
            .into_response(),
    }
}
