//! tablesync-relay binary entry point.
//!
//! Usage:
//! ```bash
//! tablesync-relay --config relay.toml
//! tablesync-relay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tablesync_relay::{
    cleanup, CredentialVerifier, LobbyRelay, OpenVerifier, SqliteStorage,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Signaling relay for tablesync lobbies.
#[derive(Parser)]
#[command(name = "tablesync-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "relay.toml")]
    config: PathBuf,

    /// Override the bind address from the configuration
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        tablesync_relay::Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load {}", cli.config.display()))?
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
        tablesync_relay::Config::default()
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }


    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .context("Failed to open lobby database")?;
    let verifier: Arc<dyn CredentialVerifier> =
        Arc::new(OpenVerifier::new(config.auth.guest_ttl_secs));

    let relay = Arc::new(LobbyRelay::new(config.clone(), storage, verifier));
    relay
        .rehydrate()
        .await
        .context("Failed to restore suspended lobbies")?;

    let cleanup = cleanup::spawn_cleanup_task(relay.clone(), config.cleanup.clone());

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    tracing::info!(
        "tablesync-relay v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?
    );

    axum::serve(listener, tablesync_relay::http::build_router(relay))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    cleanup.abort();
    Ok(())
}
