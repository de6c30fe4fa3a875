//! HTTP mapping of [`AppError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::utils::error::AppError;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) | AppError::InsufficientCredits(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) | AppError::Database(_) | AppError::Sqlite(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[api] {}: {}", status.as_u16(), self);
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
