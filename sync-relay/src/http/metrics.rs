//! Prometheus metrics endpoint.

use crate::server::LobbyRelay;
use crate::storage::LobbyStorage;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format: gauges for current state,
/// counters monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<LobbyRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    let lobbies = relay.total_lobbies();
    let members = relay.total_members();
    let stored = relay.storage().count_lobbies().await.unwrap_or(0);

    let created = m.lobbies_created_total.load(Ordering::Relaxed);
    let destroyed = m.lobbies_destroyed_total.load(Ordering::Relaxed);
    let attaches = m.attaches_total.load(Ordering::Relaxed);
    let rejections = m.attach_rejections_total.load(Ordering::Relaxed);
    let relayed = m.messages_relayed_total.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP tablesync_relay_lobbies_active Number of running lobbies
# TYPE tablesync_relay_lobbies_active gauge
tablesync_relay_lobbies_active {lobbies}

# HELP tablesync_relay_members_active Number of attached members
# TYPE tablesync_relay_members_active gauge
tablesync_relay_members_active {members}

# HELP tablesync_relay_lobbies_stored Number of lobby records in storage
# TYPE tablesync_relay_lobbies_stored gauge
tablesync_relay_lobbies_stored {stored}

# HELP tablesync_relay_info Server information
# TYPE tablesync_relay_info gauge
tablesync_relay_info{{version="{version}"}} 1

# HELP tablesync_relay_lobbies_created_total Lobbies created
# TYPE tablesync_relay_lobbies_created_total counter
tablesync_relay_lobbies_created_total {created}

# HELP tablesync_relay_lobbies_destroyed_total Lobbies destroyed
# TYPE tablesync_relay_lobbies_destroyed_total counter
tablesync_relay_lobbies_destroyed_total {destroyed}

# HELP tablesync_relay_attaches_total Successful attaches
# TYPE tablesync_relay_attaches_total counter
tablesync_relay_attaches_total {attaches}

# HELP tablesync_relay_attach_rejections_total Rejected attaches
# TYPE tablesync_relay_attach_rejections_total counter
tablesync_relay_attach_rejections_total {rejections}

# HELP tablesync_relay_messages_relayed_total Negotiation envelopes forwarded
# TYPE tablesync_relay_messages_relayed_total counter
tablesync_relay_messages_relayed_total {relayed}

# HELP tablesync_relay_rate_limit_hits_total Rate limit rejections
# TYPE tablesync_relay_rate_limit_hits_total counter
tablesync_relay_rate_limit_hits_total {rate_limits}

# HELP tablesync_relay_errors_total Per-member protocol errors
# TYPE tablesync_relay_errors_total counter
tablesync_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
