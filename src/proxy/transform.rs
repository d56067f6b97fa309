/// URL rewriting and header mutation for upstream requests.
use axum::http::{header, HeaderMap, HeaderName};
use serde::Deserialize;
use url::form_urlencoded;

/// Path marker that precedes the deployment id on deployment-addressed routes.
pub const DEPLOYMENTS_MARKER: &str = "/openai/deployments/";
const DEPLOYMENTS_BASE: &str = "/openai/deployments";

pub const API_VERSION_PARAM: &str = "api-version";

/// Headers that describe a single connection, never forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that would reveal the original client to the provider.
const CLIENT_IDENTITY: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Copy of the inbound headers that is safe to send upstream: no `Host`
/// (the client sets it from the target URL), no hop-by-hop headers, and no
/// client identity headers.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);
    for name in CLIENT_IDENTITY {
        headers.remove(name);
    }
    headers
}

/// Rebuild a deployment-addressed path as
/// `/openai/deployments/{deployment_id}/{remainder}`.
///
/// The remainder is whatever follows the first `/openai/deployments/` marker,
/// or the whole path when the marker is absent. Every occurrence of
/// `deployment_id` is removed from the remainder as plain text, which also
/// drops an id the client already embedded. Empty, `.` and `..` segments are
/// discarded.
pub fn rewrite_deployment_path(path: &str, deployment_id: &str) -> String {
    let remainder = match path.split_once(DEPLOYMENTS_MARKER) {
        Some((_, rest)) => rest,
        None => path,
    };
    // `str::replace` with an empty pattern would interleave, so skip it.
    let remainder = if deployment_id.is_empty() {
        remainder.to_string()
    } else {
        remainder.replace(deployment_id, "")
    };

    let mut out = String::from(DEPLOYMENTS_BASE);
    let segments = std::iter::once(deployment_id).chain(remainder.split('/'));
    for segment in segments.filter(|s| !s.is_empty() && *s != "." && *s != "..") {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Re-encode the inbound query with `api-version` forced to `api_version`.
/// Other parameters keep their relative order; `api-version` goes last.
pub fn with_api_version(inbound_query: Option<&str>, api_version: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Some(query) = inbound_query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key != API_VERSION_PARAM {
                serializer.append_pair(&key, &value);
            }
        }
    }
    serializer.append_pair(API_VERSION_PARAM, api_version);
    serializer.finish()
}

#[derive(Deserialize)]
struct ModelField {
    model: Option<String>,
}

/// The `model` field of a JSON request body, if the body is JSON and has one.
pub fn extract_model(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ModelField>(body)
        .ok()
        .and_then(|b| b.model)
        .filter(|m| !m.is_empty())
}

/// Strip the routing prefix (`/openai`, `/azure`) from an inbound path.
pub fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}
