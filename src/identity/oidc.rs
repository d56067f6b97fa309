//! OpenID Connect authorization-code client.
//!
//! The discovery document is fetched on first use and cached for the life of
//! the client. ID tokens signed with HS* are checked against the client
//! secret; asymmetric algorithms use the provider JWKS, looked up by `kid`.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use super::{ExchangeError, Identity, IdentityExchange};
use crate::config::OidcConfig;

const CLOCK_LEEWAY_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    #[serde(default)]
    jwks_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
}

pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
    discovery: OnceCell<Discovery>,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            config,
            http,
            discovery: OnceCell::new(),
        })
    }

    async fn discovery(&self) -> Result<&Discovery, ExchangeError> {
        self.discovery
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/.well-known/openid-configuration",
                    self.config.issuer_url.trim_end_matches('/')
                );
                tracing::debug!(%url, "fetching OIDC discovery document");
                let resp = self.http.get(&url).send().await?;
                if !resp.status().is_success() {
                    return Err(ExchangeError::Discovery(format!("{} returned {}", url, resp.status())));
                }
                resp.json::<Discovery>()
                    .await
                    .map_err(|e| ExchangeError::Discovery(e.to_string()))
            })
            .await
    }

    async fn decoding_key(
        &self,
        discovery: &Discovery,
        alg: Algorithm,
        kid: Option<&str>,
    ) -> Result<DecodingKey, ExchangeError> {
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Ok(DecodingKey::from_secret(self.config.client_secret.as_bytes()));
        }

        let jwks_uri = discovery
            .jwks_uri
            .as_deref()
            .ok_or_else(|| ExchangeError::Discovery("provider publishes no jwks_uri".into()))?;
        let kid = kid.ok_or_else(|| ExchangeError::UnknownKeyId("<none>".into()))?;

        let jwks: JwkSet = self.http.get(jwks_uri).send().await?.json().await?;
        let jwk = jwks
            .find(kid)
            .ok_or_else(|| ExchangeError::UnknownKeyId(kid.to_string()))?;
        Ok(DecodingKey::from_jwk(jwk)?)
    }

    async fn verify_id_token(&self, discovery: &Discovery, raw: &str) -> Result<Identity, ExchangeError> {
        let header = jsonwebtoken::decode_header(raw)?;
        let key = self.decoding_key(discovery, header.alg, header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_issuer(&[&discovery.issuer]);
        validation.leeway = CLOCK_LEEWAY_SECS;

        let claims = jsonwebtoken::decode::<IdTokenClaims>(raw, &key, &validation)?.claims;
        Ok(Identity {
            subject: claims.sub,
            email: claims.email.unwrap_or_default(),
            email_verified: claims.email_verified.unwrap_or(false),
            name: claims.name,
        })
    }
}

#[async_trait]
impl IdentityExchange for OidcClient {
    async fn authorize_url(&self, state: &str, redirect: Option<&str>) -> Result<String, ExchangeError> {
        let discovery = self.discovery().await?;
        let mut url = Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| ExchangeError::Discovery(format!("bad authorization_endpoint: {}", e)))?;

        let redirect_uri = redirect.unwrap_or(&self.config.redirect_url);
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<Identity, ExchangeError> {
        let discovery = self.discovery().await?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let resp = self
            .http
            .post(&discovery.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::TokenEndpoint(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = resp.json().await?;
        let raw = token.id_token.ok_or(ExchangeError::MissingIdToken)?;
        self.verify_id_token(discovery, &raw).await
    }
}
