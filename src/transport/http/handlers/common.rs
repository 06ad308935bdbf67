use crate::error::QueryError;
use crate::transport::http::types::ApiResponse;
use axum::http::StatusCode;
use axum::Json;

/// Requests rejected before reaching the database are the caller's fault; anything
/// the database reports is a 500 carrying the driver's message.
pub fn query_error_response(err: &QueryError) -> (StatusCode, Json<ApiResponse>) {
    let status = if err.is_request_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::failed(err.to_string())))
}
