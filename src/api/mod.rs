use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::AppState;

pub mod handlers;

/// Build the `/api/v1` router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth", get(handlers::auth_redirect))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/openai/models", get(handlers::list_openai_models))
        .route("/azure/models", get(handlers::list_azure_models))
        .fallback(fallback_404)
}

async fn fallback_404() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": false, "error": "not found" })),
    )
        .into_response()
}
