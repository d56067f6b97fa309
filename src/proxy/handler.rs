use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;

use super::{transform, upstream};
use crate::errors::AppError;
use crate::AppState;

const OPENAI_PREFIX: &str = "/openai";
const AZURE_PREFIX: &str = "/azure";

/// `ANY /openai/*`: passthrough with the request body streamed upstream.
#[tracing::instrument(skip_all, fields(backend = "openai", method = %req.method(), path = %req.uri().path()))]
pub async fn openai_proxy(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, AppError> {
    let backend = state
        .openai
        .as_ref()
        .map_err(|e| AppError::Config(format!("openai backend: {}", e)))?;

    let (parts, body) = req.into_parts();
    let path = transform::strip_route_prefix(parts.uri.path(), OPENAI_PREFIX);
    let body = reqwest::Body::wrap_stream(body.into_data_stream());

    let outbound = backend.build_request(parts.method.clone(), path, parts.uri.query(), &parts.headers, body)?;
    let resp = state.upstream.send(outbound).await?;
    Ok(upstream::relay_response(resp))
}

/// `ANY /azure/*`: the body is buffered so the model can be read from it.
#[tracing::instrument(skip_all, fields(backend = "azure", %method, path = %uri.path()))]
pub async fn azure_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let body = body.map_err(body_rejection)?;
    let backend = state
        .azure
        .as_ref()
        .map_err(|e| AppError::Config(format!("azure backend: {}", e)))?;

    let path = transform::strip_route_prefix(uri.path(), AZURE_PREFIX);
    let outbound = backend.build_request(method, path, uri.query(), &headers, body)?;
    let resp = state.upstream.send(outbound).await?;
    Ok(upstream::relay_response(resp))
}

fn body_rejection(rejection: BytesRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(rejection.body_text())
    }
}
