//! Provider routing: request translation for the two backends and the
//! handlers that forward through them.

pub mod azure;
pub mod handler;
pub mod openai;
pub mod transform;
pub mod upstream;

use axum::http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

/// A request ready to be sent to a provider.
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
}

/// Why a backend could not be built from its configuration. Requests routed
/// to such a backend fail with a server error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendConfigError {
    #[error("endpoint is required")]
    MissingEndpoint,

    #[error("api key is required")]
    MissingApiKey,

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}
