use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::DEFAULT_TOKEN_TTL_HOURS;
use crate::errors::AppError;
use crate::identity::IdentityExchange;
use crate::models::token::AccessToken;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

/// Success envelope shared by every `/api/v1` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { status: true, data }
    }
}

#[derive(Deserialize)]
pub struct AuthQuery {
    pub redirect: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

fn identity(state: &AppState) -> Result<&Arc<dyn IdentityExchange>, AppError> {
    state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::Config("OIDC is not configured".into()))
}

// ── Login ────────────────────────────────────────────────────

/// GET /api/v1/auth: send the browser to the identity provider.
pub async fn auth_redirect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthQuery>,
) -> Result<Response, AppError> {
    let exchange = identity(&state)?;
    let csrf_state = Uuid::new_v4().to_string();
    let redirect = params.redirect.as_deref().filter(|r| !r.is_empty());

    let url = exchange
        .authorize_url(&csrf_state, redirect)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// GET /api/v1/auth/callback: exchange the code, check the email domain,
/// and mint a temporary access token. Nothing is minted on any failure.
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackQuery>,
) -> Result<Json<ApiResponse<AccessToken>>, AppError> {
    let exchange = identity(&state)?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing code".into()))?;

    let identity = exchange.exchange(&code).await.map_err(|e| {
        tracing::warn!(error = %e, "authorization code exchange failed");
        AppError::Unauthorized
    })?;

    if !identity.email_domain_allowed(&state.config.oidc.allowed_domains) {
        tracing::warn!(email = %identity.email, "login from disallowed email domain");
        return Err(AppError::Forbidden("email domain not allowed".into()));
    }

    let token = state
        .credentials
        .issue(Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
        .await;
    if token.token.is_empty() {
        return Err(AppError::Internal(anyhow::anyhow!("token generation failed")));
    }

    tracing::info!(subject = %identity.subject, expires_at = %token.expires_at, "issued access token");
    Ok(Json(ApiResponse::ok(token)))
}

// ── Model listings ───────────────────────────────────────────

/// GET /api/v1/openai/models
pub async fn list_openai_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let backend = state
        .openai
        .as_ref()
        .map_err(|e| AppError::Config(format!("openai backend: {}", e)))?;
    let models = backend.list_available_models(state.upstream.http()).await;
    Ok(Json(ApiResponse::ok(models)))
}

/// GET /api/v1/azure/models
pub async fn list_azure_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let backend = state
        .azure
        .as_ref()
        .map_err(|e| AppError::Config(format!("azure backend: {}", e)))?;
    Ok(Json(ApiResponse::ok(backend.list_models())))
}
