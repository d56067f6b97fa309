//! keygate: an access-gated gateway in front of OpenAI-compatible providers.
//!
//! Library crate shared by the `keygate` binary and the integration tests.

pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod identity;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod proxy;
pub mod server;
pub mod store;

use std::sync::Arc;

use credentials::CredentialManager;
use identity::IdentityExchange;
use proxy::azure::AzureProxy;
use proxy::openai::OpenAiProxy;
use proxy::upstream::UpstreamClient;
use proxy::BackendConfigError;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub credentials: Arc<CredentialManager>,
    pub upstream: UpstreamClient,
    /// A misconfigured backend is kept as its error; requests routed to it
    /// fail with a server error while the other backend keeps working.
    pub openai: Result<OpenAiProxy, BackendConfigError>,
    pub azure: Result<AzureProxy, BackendConfigError>,
    /// `None` when OIDC is not configured; login endpoints then fail.
    pub identity: Option<Arc<dyn IdentityExchange>>,
}

impl AppState {
    pub fn new(
        config: config::Config,
        credentials: Arc<CredentialManager>,
        identity: Option<Arc<dyn IdentityExchange>>,
    ) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(config.http.upstream_timeout)?;

        let openai = OpenAiProxy::new(config.openai.clone());
        if let Err(e) = &openai {
            tracing::warn!("OpenAI backend disabled: {}", e);
        }
        let azure = AzureProxy::new(config.azure.clone());
        if let Err(e) = &azure {
            tracing::warn!("Azure backend disabled: {}", e);
        }

        Ok(Self {
            config,
            credentials,
            upstream,
            openai,
            azure,
            identity,
        })
    }
}
