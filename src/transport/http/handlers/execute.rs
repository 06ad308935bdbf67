use crate::domain::operation::OperationRequest;
use crate::transport::http::handlers::common::query_error_response;
use crate::transport::http::types::{ApiResponse, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// `POST /api/execute` with an operation request body.
pub async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<OperationRequest>,
) -> impl IntoResponse {
    let model = request.model_name.clone();
    let action = request.action.clone();

    match state.pipeline.execute(request).await {
        Ok(result) => match result.to_json() {
            Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failed(format!("Failed to encode result: {}", e))),
            )
                .into_response(),
        },
        Err(e) => {
            tracing::warn!(%model, %action, error = %e, "operation failed");
            query_error_response(&e).into_response()
        }
    }
}
