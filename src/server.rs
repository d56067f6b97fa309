use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::credentials::CredentialManager;
use crate::identity::oidc::OidcClient;
use crate::identity::IdentityExchange;
use crate::middleware::auth::{self, AccessGate};
use crate::middleware::request_id::request_id_middleware;
use crate::{api, jobs, proxy, store, AppState};

/// In-flight requests get this long to finish after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let gate = AccessGate::new(state.config.http.enable_auth, state.credentials.clone());

    let proxied = Router::new()
        .route("/openai/*path", any(proxy::handler::openai_proxy))
        .route("/azure/*path", any(proxy::handler::azure_proxy))
        .route_layer(axum::middleware::from_fn_with_state(
            gate,
            auth::require_access_token,
        ));

    Router::new()
        // Health endpoint (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", api::api_router())
        .merge(proxied)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
}

pub fn identity_from_config(config: &Config) -> anyhow::Result<Option<Arc<dyn IdentityExchange>>> {
    if !config.oidc.is_configured() {
        tracing::info!("OIDC not configured, login endpoints disabled");
        return Ok(None);
    }
    let client = OidcClient::new(config.oidc.clone())?;
    Ok(Some(Arc::new(client)))
}

/// Run the gateway until SIGINT/SIGTERM.
///
/// Shutdown order: stop accepting, give in-flight requests `SHUTDOWN_GRACE`
/// (then abort), stop and join the sweep task, close the store.
pub async fn run(config: Config, addr_override: Option<String>) -> anyhow::Result<()> {
    let store = store::connect(&config.http.store_dsn)
        .await
        .context("failed to open credential store")?;
    let credentials = Arc::new(CredentialManager::new(store.clone()));
    let identity = identity_from_config(&config)?;

    let addr = addr_override.unwrap_or_else(|| config.http.listen_addr.clone());
    let state = Arc::new(AppState::new(config, credentials.clone(), identity)?);
    if !state.config.http.enable_auth {
        tracing::warn!("access gate is OFF: provider routes accept unauthenticated requests (set HTTP_ENABLE_AUTH=true)");
    }
    let app = router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("keygate listening on {}", addr);

    let cancel = CancellationToken::new();
    let sweeper = jobs::cleanup::spawn(credentials, jobs::cleanup::SWEEP_INTERVAL, cancel.clone());

    let stop = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    let served = tokio::select! {
        joined = &mut server => flatten(joined),
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining for up to {}s", SHUTDOWN_GRACE.as_secs());
            cancel.cancel();
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    tracing::warn!("grace period elapsed, aborting in-flight requests");
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("sweep task panicked: {}", e);
    }
    store.close().await;
    tracing::info!("keygate stopped");

    served
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    joined
        .context("server task failed")?
        .context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
