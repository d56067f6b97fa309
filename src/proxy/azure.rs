//! Deployment-addressed backend.
//!
//! Clients speak the ordinary chat/completion protocol; the gateway picks a
//! deployment from the `model` in the body and rewrites the request into
//! `{endpoint}/openai/deployments/{deployment}/{rest}?api-version={version}`.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use url::Url;

use super::transform;
use super::{BackendConfigError, OutboundRequest};
use crate::config::AzureConfig;
use crate::errors::AppError;

pub const DEFAULT_API_VERSION: &str = "2023-05-15";

const API_KEY_HEADER: &str = "api-key";

#[derive(Debug, Clone)]
pub struct AzureProxy {
    endpoint: Url,
    api_key: String,
    api_version: String,
    default_model: String,
    model_mappings: HashMap<String, String>,
}

impl AzureProxy {
    pub fn new(config: AzureConfig) -> Result<Self, BackendConfigError> {
        if config.endpoint.is_empty() {
            return Err(BackendConfigError::MissingEndpoint);
        }
        if config.api_key.is_empty() {
            return Err(BackendConfigError::MissingApiKey);
        }
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| BackendConfigError::InvalidUrl(config.endpoint.clone()))?;

        let api_version = if config.api_version.is_empty() {
            DEFAULT_API_VERSION.to_string()
        } else {
            config.api_version
        };

        Ok(Self {
            endpoint,
            api_key: config.api_key,
            api_version,
            default_model: config.default_model,
            model_mappings: config.model_mappings,
        })
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Models this backend advertises: the keys of the model mapping, sorted.
    pub fn list_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.model_mappings.keys().cloned().collect();
        models.sort();
        models
    }

    /// Mapped deployment for `model`, or the model name itself.
    pub fn deployment_id<'a>(&'a self, model: &'a str) -> &'a str {
        self.model_mappings
            .get(model)
            .map(String::as_str)
            .unwrap_or(model)
    }

    /// Model named in the request body, falling back to the configured
    /// default when the body is not JSON or names no model.
    pub fn extract_model_name(&self, body: &[u8]) -> String {
        match transform::extract_model(body) {
            Some(model) => model,
            None => {
                if !body.is_empty() {
                    tracing::debug!("request body names no model, using default");
                }
                self.default_model.clone()
            }
        }
    }

    pub fn build_target_url(&self, path: &str, query: Option<&str>, model: &str) -> Url {
        let deployment = self.deployment_id(model);
        let mut url = self.endpoint.clone();
        url.set_path(&transform::rewrite_deployment_path(path, deployment));
        url.set_query(Some(&transform::with_api_version(query, &self.api_version)));
        url
    }

    /// Translate an inbound request (route prefix already stripped).
    ///
    /// The inbound `Authorization` is dropped so the caller's gateway token
    /// never reaches the provider; the provider key goes in `api-key`.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        inbound_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<OutboundRequest, AppError> {
        let model = self.extract_model_name(&body);
        let url = self.build_target_url(path, query, &model);

        let mut headers = transform::forwardable_headers(inbound_headers);
        headers.remove(axum::http::header::AUTHORIZATION);
        headers.remove(axum::http::header::CONTENT_LENGTH);
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| AppError::Config("azure api key is not a valid header value".into()))?;
        headers.insert(API_KEY_HEADER, key);

        Ok(OutboundRequest {
            method,
            url,
            headers,
            body: reqwest::Body::from(body),
        })
    }
}
