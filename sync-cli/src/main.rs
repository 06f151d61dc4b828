//! # tablesync
//!
//! Host and join tablesync lobbies from a terminal.
//!
//! ## Commands
//!
//! - `init`: Initialize device identity
//! - `host`: Create a lobby and host a life-total table
//! - `join`: Join a lobby by code
//! - `resume`: Resume a saved session as host
//! - `info`: Show a lobby's roster
//! - `sessions`: List saved sessions
//!
//! ## Example
//!
//! ```bash
//! # Initialize device
//! tablesync init --name "Ada"
//!
//! # Host a four-player table and share the printed code
//! tablesync host --name "Friday game" --players 4
//!
//! # On another device, join it
//! tablesync join ABC234
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sync_client::DEFAULT_RELAY_URL;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod game;
mod store;

use commands::{info, init, play, sessions};

/// Host and join tablesync lobbies.
#[derive(Parser, Debug)]
#[command(name = "tablesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for device identity and saved sessions
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Relay base URL
    #[arg(long, global = true, env = "TABLESYNC_RELAY", default_value = DEFAULT_RELAY_URL)]
    relay: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize device identity
    Init {
        /// Display name
        #[arg(long, short)]
        name: String,

        /// Avatar reference shown to other players
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Create a lobby and host a life-total table
    Host {
        /// Name for the saved session
        #[arg(long, short, default_value = "Untitled game")]
        name: String,

        /// Number of players at the table
        #[arg(long, default_value = "4")]
        players: usize,

        /// Starting life
        #[arg(long, default_value = "40")]
        life: i64,
    },

    /// Join a lobby by code
    Join {
        /// Six-character lobby code
        code: String,
    },

    /// Resume a saved session as host
    Resume {
        /// Saved session id (see `tablesync sessions`)
        session_id: String,
    },

    /// Show a lobby's roster
    Info {
        /// Six-character lobby code
        code: String,
    },

    /// List saved sessions
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init { name, avatar } => {
            init::run(&data_dir, &name, avatar.as_deref()).await?;
        }
        Commands::Host {
            name,
            players,
            life,
        } => {
            if players == 0 {
                anyhow::bail!("--players must be at least 1");
            }
            play::run(
                &data_dir,
                &cli.relay,
                play::Mode::Host {
                    name,
                    players,
                    life,
                },
            )
            .await?;
        }
        Commands::Join { code } => {
            play::run(&data_dir, &cli.relay, play::Mode::Join { code }).await?;
        }
        Commands::Resume { session_id } => {
            play::run(&data_dir, &cli.relay, play::Mode::Resume { session_id }).await?;
        }
        Commands::Info { code } => {
            info::run(&cli.relay, &code).await?;
        }
        Commands::Sessions => {
            sessions::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for tablesync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "tablesync", "tablesync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
