use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keygate::cli::{self, Cli, Commands};
use keygate::credentials::CredentialManager;
use keygate::{config, server, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { addr }) => server::run(cfg, addr).await,
        Some(Commands::Token { command }) => {
            let store = store::connect(&cfg.http.store_dsn)
                .await
                .context("failed to open credential store")?;
            let manager = CredentialManager::new(Arc::clone(&store));
            let out = cli::handle_token_command(command, &manager).await;
            store.close().await;
            out.map(|text| println!("{}", text))
        }
        None => server::run(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keygate=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
