use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = status_and_code(&self);

        // Log the error before it gets converted into a status response.
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        match self {
            AppError::ValidationError { message, details } => {
                error_resp(status, code, &message, details.map(|d| json!(d)))
            }
            // Internal details stay in the log.
            AppError::Database(_) | AppError::Internal(_) => {
                error_resp(status, code, "Internal server error", None)
            }
            AppError::InvalidSignature(_) => error_resp(status, code, "Invalid signature", None),
            other => error_resp(status, code, &other.to_string(), None),
        }
    }
}

pub(crate) fn status_and_code(error: &AppError) -> (StatusCode, ErrorCode) {
    match error {
        AppError::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized),
        AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
        AppError::ValidationError { .. } => (StatusCode::BAD_REQUEST, ErrorCode::ValidationError),
        AppError::Conflict(_) => (StatusCode::BAD_REQUEST, ErrorCode::Conflict),
        AppError::InvalidSignature(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidSignature),
        AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, ErrorCode::RateLimited),
        AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError),
        AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
    }
}

pub(crate) fn error_resp(
    status: StatusCode,
    code: ErrorCode,
    message: &str,
    details: Option<serde_json::Value>,
) -> Response {
    let body = match details {
        Some(details) => json!({ "error": message, "code": code.as_str(), "details": details }),
        None => json!({ "error": message, "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
