//! Background cleanup task.
//!
//! Periodically destroys empty lobbies past their TTL (never-attached
//! lobbies after the idle timeout, suspended ones after the suspended TTL),
//! sweeps orphaned suspended records from storage and shrinks the rate
//! limiter key maps.

use crate::config::CleanupConfig;
use crate::server::{now_secs, LobbyRelay};
use crate::storage::LobbyStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Run one cleanup pass. Returns the number of lobbies removed.
pub async fn run_once(relay: &LobbyRelay, now: u64) -> u64 {
    let expired = relay.expire_idle(now).await as u64;

    let cutoff = now.saturating_sub(relay.config().storage.suspended_ttl_secs);
    let swept = match relay.storage().delete_suspended_before(cutoff).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("Cleanup error: {}", e);
            0
        }
    };

    relay.rate_limits().shrink();
    expired + swept
}

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    relay: Arc<LobbyRelay>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            let removed = run_once(&relay, now_secs()).await;
            if removed > 0 {
                tracing::info!("Cleanup: removed {} expired lobbies", removed);
            } else {
                tracing::debug!("Cleanup: nothing expired");
            }
        }
    })
}
