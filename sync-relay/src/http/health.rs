//! Health check endpoint.

use crate::server::LobbyRelay;
use crate::storage::LobbyStorage;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// `ok`, or `degraded` when lobby storage cannot be read.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Running lobby instances.
    pub lobbies: usize,
    /// Running lobbies with no attached members (suspended or awaiting a host).
    pub empty_lobbies: usize,
    /// Attached control-channel connections across all lobbies.
    pub members: usize,
    /// Lobby records in storage; absent when storage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_lobbies: Option<u64>,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Snapshot the relay's lobby and connection counts.
    pub async fn collect(relay: &LobbyRelay) -> Self {
        let stored_lobbies = match relay.storage().count_lobbies().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("Health check could not count stored lobbies: {}", e);
                None
            }
        };
        Self {
            status: if stored_lobbies.is_some() { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            lobbies: relay.total_lobbies(),
            empty_lobbies: relay.empty_lobbies(),
            members: relay.total_members(),
            stored_lobbies,
            uptime_seconds: relay.uptime().as_secs(),
        }
    }
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<LobbyRelay>>) -> Json<HealthStatus> {
    Json(HealthStatus::collect(&relay).await)
}
