//! Access gate for the provider routes.
//!
//! OFF unless the operator sets `HTTP_ENABLE_AUTH=true`. While off, every
//! request reaches the provider with the gateway's credentials attached.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use crate::credentials::CredentialManager;
use crate::errors::AppError;

#[derive(Clone)]
pub struct AccessGate {
    enabled: bool,
    credentials: Arc<CredentialManager>,
}

impl AccessGate {
    pub fn new(enabled: bool, credentials: Arc<CredentialManager>) -> Self {
        Self { enabled, credentials }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// `Authorization: Bearer <token>` or a bare `Authorization: <token>`.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim_start();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Log-safe form of a token: first and last four characters.
pub fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        "****".to_string()
    }
}

pub async fn require_access_token(
    State(gate): State<AccessGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !gate.enabled {
        return Ok(next.run(req).await);
    }

    match extract_token(req.headers()).map(str::to_owned) {
        Some(token) if gate.credentials.validate(&token).await => Ok(next.run(req).await),
        Some(token) => {
            tracing::warn!(token = %mask(&token), path = %req.uri().path(), "rejected access token");
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "missing access token");
            Err(AppError::Unauthorized)
        }
    }
}
