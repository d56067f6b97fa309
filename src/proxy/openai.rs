//! Direct-passthrough backend: same path, same query, provider credentials.

use axum::http::{header, HeaderMap, HeaderValue, Method};
use serde::Deserialize;
use url::Url;

use super::transform;
use super::{BackendConfigError, OutboundRequest};
use crate::config::OpenAiConfig;
use crate::errors::AppError;

const ORGANIZATION_HEADER: &str = "openai-organization";
const PROJECT_HEADER: &str = "openai-project";

#[derive(Debug, Clone)]
pub struct OpenAiProxy {
    target: Url,
    base_url: String,
    api_key: String,
    org_id: Option<String>,
    project_id: Option<String>,
    models_white_list: Vec<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<Model>,
}

#[derive(Deserialize)]
struct Model {
    id: String,
}

impl OpenAiProxy {
    pub fn new(config: OpenAiConfig) -> Result<Self, BackendConfigError> {
        let target = Url::parse(&config.target_base_url)
            .ok()
            .filter(|u| u.host_str().is_some())
            .ok_or_else(|| BackendConfigError::InvalidUrl(config.target_base_url.clone()))?;

        Ok(Self {
            target,
            base_url: config.target_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            org_id: config.org_id,
            project_id: config.project_id,
            models_white_list: config.models_white_list,
        })
    }

    /// Target for an inbound path: scheme and authority of the base URL,
    /// path and query of the request.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.target.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// Translate an inbound request (route prefix already stripped).
    /// Without a configured key the inbound `Authorization` is left alone.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        inbound_headers: &HeaderMap,
        body: reqwest::Body,
    ) -> Result<OutboundRequest, AppError> {
        let mut headers = transform::forwardable_headers(inbound_headers);
        self.apply_credentials(&mut headers)?;

        Ok(OutboundRequest {
            method,
            url: self.target_url(path, query),
            headers,
            body,
        })
    }

    fn apply_credentials(&self, headers: &mut HeaderMap) -> Result<(), AppError> {
        let invalid = |name: &str| AppError::Config(format!("{} is not a valid header value", name));

        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| invalid("OPENAI_API_KEY"))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Some(org) = &self.org_id {
            let value = HeaderValue::from_str(org).map_err(|_| invalid("OPENAI_ORG_ID"))?;
            headers.insert(ORGANIZATION_HEADER, value);
        }
        if let Some(project) = &self.project_id {
            let value = HeaderValue::from_str(project).map_err(|_| invalid("OPENAI_PROJECT_ID"))?;
            headers.insert(PROJECT_HEADER, value);
        }
        Ok(())
    }

    /// Upstream model ids that are also on the white list, in upstream order.
    /// Any failure yields an empty list.
    pub async fn list_available_models(&self, client: &reqwest::Client) -> Vec<String> {
        let mut headers = HeaderMap::new();
        if let Err(e) = self.apply_credentials(&mut headers) {
            tracing::error!("Failed to build model listing request: {}", e);
            return Vec::new();
        }

        let url = format!("{}/v1/models", self.base_url);
        let resp = match client.get(&url).headers(headers).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Failed to list upstream models: {}", e);
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            tracing::error!("Model listing returned {}", resp.status());
            return Vec::new();
        }

        match resp.json::<ModelsResponse>().await {
            Ok(models) => models
                .data
                .into_iter()
                .map(|m| m.id)
                .filter(|id| self.models_white_list.contains(id))
                .collect(),
            Err(e) => {
                tracing::error!("Failed to decode model listing: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> OpenAiConfig {
        OpenAiConfig {
            target_base_url: base.into(),
            api_key: "sk-test".into(),
            org_id: Some("org-1".into()),
            project_id: None,
            models_white_list: vec!["gpt-4o".into(), "gpt-4o-mini".into()],
        }
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(OpenAiProxy::new(config("not a url")).is_err());
        assert!(OpenAiProxy::new(config("mailto:ops@example.com")).is_err());
    }

    #[test]
    fn test_target_keeps_path_and_query() {
        let proxy = OpenAiProxy::new(config("https://api.openai.com/ignored")).unwrap();
        let url = proxy.target_url("/v1/chat/completions", Some("stream=true"));
        assert_eq!(url.as_str(), "https://api.openai.com/v1/chat/completions?stream=true");
    }

    #[test]
    fn test_build_request_sets_credentials() {
        let proxy = OpenAiProxy::new(config("https://api.openai.com")).unwrap();
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("Bearer gateway-token"));
        inbound.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        inbound.insert("accept", HeaderValue::from_static("text/event-stream"));

        let out = proxy
            .build_request(
                Method::POST,
                "/v1/chat/completions",
                None,
                &inbound,
                reqwest::Body::from("{}"),
            )
            .unwrap();

        assert_eq!(out.headers["authorization"], "Bearer sk-test");
        assert_eq!(out.headers["openai-organization"], "org-1");
        assert!(out.headers.get("openai-project").is_none());
        assert!(out.headers.get("x-real-ip").is_none());
        assert_eq!(out.headers["accept"], "text/event-stream");
    }

    #[test]
    fn test_without_key_inbound_authorization_passes() {
        let proxy = OpenAiProxy::new(OpenAiConfig {
            api_key: String::new(),
            ..config("https://api.openai.com")
        })
        .unwrap();
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("Bearer sk-client"));

        let out = proxy
            .build_request(Method::GET, "/v1/models", None, &inbound, reqwest::Body::from(""))
            .unwrap();
        assert_eq!(out.headers["authorization"], "Bearer sk-client");
    }

    #[tokio::test]
    async fn test_list_available_models_intersects_white_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header_eq("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o-mini", "object": "model"},
                    {"id": "dall-e-2", "object": "model"},
                    {"id": "gpt-4o", "object": "model"}
                ]
            })))
            .mount(&server)
            .await;

        let proxy = OpenAiProxy::new(config(&server.uri())).unwrap();
        let models = proxy.list_available_models(&reqwest::Client::new()).await;
        assert_eq!(models, vec!["gpt-4o-mini", "gpt-4o"]);
    }

    #[tokio::test]
    async fn test_list_available_models_empty_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let proxy = OpenAiProxy::new(config(&server.uri())).unwrap();
        assert!(proxy.list_available_models(&reqwest::Client::new()).await.is_empty());

        let unreachable = OpenAiProxy::new(config("http://127.0.0.1:9")).unwrap();
        assert!(unreachable.list_available_models(&reqwest::Client::new()).await.is_empty());
    }
}
