/// HTTP client for forwarding requests to provider APIs.
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;

use super::transform;
use super::OutboundRequest;
use crate::errors::AppError;

pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    /// `timeout` bounds the wait for response headers. Bodies are streamed
    /// afterwards without a deadline so long completions are not cut off.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .connect_timeout(Duration::from_secs(5))
            // Redirects are relayed to the client, not followed.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, timeout })
    }

    /// The underlying client, for the gateway's own calls (model listing).
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn send(&self, outbound: OutboundRequest) -> Result<reqwest::Response, AppError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = outbound;

        tracing::debug!(%method, %url, "forwarding upstream");
        let request = self.client.request(method, url).headers(headers).body(body);

        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(AppError::Upstream(e.to_string())),
            Err(_) => Err(AppError::Upstream(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Relay an upstream response: status and headers (minus hop-by-hop) are
/// copied, the body is streamed through unchanged.
pub fn relay_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    transform::strip_hop_by_hop(&mut headers);

    let mut out = Response::new(Body::from_stream(resp.bytes_stream()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, StatusCode};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get(url: &str) -> OutboundRequest {
        OutboundRequest {
            method: Method::GET,
            url: url::Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: reqwest::Body::from(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_relays_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teapot"))
            .respond_with(
                ResponseTemplate::new(418)
                    .insert_header("x-upstream", "yes")
                    .set_body_string("short and stout"),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5)).unwrap();
        let resp = client.send(get(&format!("{}/teapot", server.uri()))).await.unwrap();
        let relayed = relay_response(resp);

        assert_eq!(relayed.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(relayed.headers()["x-upstream"], "yes");
        let body = axum::body::to_bytes(relayed.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"short and stout");
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_millis(100)).unwrap();
        let err = client.send(get(&server.uri())).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_upstream_error() {
        let client = UpstreamClient::new(Duration::from_secs(2)).unwrap();
        // port 9 (discard) on loopback is not listening in test environments
        let err = client.send(get("http://127.0.0.1:9/")).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
