use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body exceeds size limit")]
    PayloadTooLarge,

    #[error("backend misconfigured: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::Forbidden(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = match &self {
            AppError::Unauthorized => "unauthorized".to_string(),
            AppError::Forbidden(reason) => format!("access denied: {}", reason),
            AppError::BadRequest(reason) => reason.clone(),
            AppError::PayloadTooLarge => "request body exceeds size limit".to_string(),
            AppError::Config(e) => {
                tracing::error!("Backend configuration error: {}", e);
                e.clone()
            }
            AppError::Upstream(e) => {
                tracing::warn!("Upstream error: {}", e);
                "upstream request failed".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
        };

        (status, Json(json!({ "status": false, "error": msg }))).into_response()
    }
}
