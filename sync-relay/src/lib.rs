//! # sync-relay
//!
//! Signaling relay for tablesync lobbies.
//!
//! The relay owns lobby lifecycle and the host-authoritative roster, and
//! forwards link-negotiation envelopes between the host and its clients.
//! Game traffic never passes through it: once two members have negotiated
//! a direct link, the relay only sees roster changes.
//!
//! ## Architecture
//!
//! ```text
//! Host ──┐   control channel (WebSocket, JSON)   ┌── Client
//!        ├──────────────────────────────────────►│
//!    ┌───┴──────────────────────────────────────┴───┐
//!    │                 sync-relay                   │
//!    │  registry ─► per-lobby task ─► SQLite        │
//!    │            (roster, relay)   (suspended)     │
//!    └──────────────────────────────────────────────┘
//! ```
//!
//! ## Endpoints
//!
//! - `POST /lobbies` create or reclaim a lobby
//! - `GET /lobbies/:code` read-only roster
//! - `GET /lobbies/:code/ws` attach a control channel
//! - `GET /health`, `GET /metrics`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod instance;
pub mod limits;
pub mod server;
pub mod storage;

pub use auth::{CredentialVerifier, OpenVerifier};
pub use config::Config;
pub use error::{RelayError, Result};
pub use server::LobbyRelay;
pub use storage::SqliteStorage;

use std::sync::Arc;
use tokio::net::TcpListener;

/// Serve the relay's HTTP endpoints on `listener` until the future is dropped.
pub async fn serve(listener: TcpListener, relay: Arc<LobbyRelay>) -> std::io::Result<()> {
    axum::serve(listener, http::build_router(relay)).await
}
