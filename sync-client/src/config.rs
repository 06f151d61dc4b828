//! Session configuration.

use std::time::Duration;
use sync_core::{ReconnectPolicy, DEFAULT_LOCAL_FIELDS};
use sync_types::PeerId;

/// Default relay base URL.
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8787";

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP base URL of the relay (`http://host:port`).
    pub relay_url: String,
    /// Name shown to other members.
    pub display_name: String,
    /// Optional avatar reference.
    pub avatar_ref: Option<String>,
    /// This device's peer id, stable across reconnects.
    pub peer_id: PeerId,
    /// Bearer credential presented to the relay.
    pub credential: String,
    /// How long to wait for `Joined` after opening the control channel.
    pub connect_timeout: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Player fields kept from the local mirror on every snapshot.
    pub local_fields: Vec<String>,
    /// Control-channel ping interval.
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    /// Create a configuration for the relay at `relay_url` with a random peer id.
    pub fn new(relay_url: &str) -> Self {
        let peer_id = PeerId::random();
        Self {
            relay_url: relay_url.trim_end_matches('/').to_string(),
            display_name: "Player".to_string(),
            avatar_ref: None,
            credential: peer_id.as_str().to_string(),
            peer_id,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            local_fields: DEFAULT_LOCAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    /// Set the avatar reference.
    pub fn with_avatar_ref(mut self, avatar: &str) -> Self {
        self.avatar_ref = Some(avatar.to_string());
        self
    }

    /// Set the peer id.
    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.peer_id = peer_id;
        self
    }

    /// Set the bearer credential.
    pub fn with_credential(mut self, token: &str) -> Self {
        self.credential = token.to_string();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Replace the device-local player fields.
    pub fn with_local_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.local_fields, vec!["activeCounter".to_string()]);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.credential, config.peer_id.as_str());
    }

    #[test]
    fn builder_overrides() {
        let config = SessionConfig::new("http://relay.local/")
            .with_display_name("Ada")
            .with_avatar_ref("dragon")
            .with_peer_id(PeerId::new("dev-1"))
            .with_credential("tok")
            .with_local_fields(["activeCounter", "zoom"]);

        assert_eq!(config.relay_url, "http://relay.local");
        assert_eq!(config.display_name, "Ada");
        assert_eq!(config.avatar_ref.as_deref(), Some("dragon"));
        assert_eq!(config.peer_id, PeerId::new("dev-1"));
        assert_eq!(config.credential, "tok");
        assert_eq!(config.local_fields.len(), 2);
    }
}
