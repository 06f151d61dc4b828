//! Rate limiting for the relay.
//!
//! Protects against attach flooding and control-message spam.
//!
//! ## Design Notes
//!
//! Devices reach the relay from behind NATs and mobile carriers, so the
//! remote address says little about who is calling. Limits are keyed by:
//! - **peer id** for attach attempts
//! - **peer id** for control messages
//!
//! plus one global limiter across all peers. All use the governor crate;
//! keyed limiters are backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use sync_types::PeerId;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits attach attempts per peer id.
    attach_limiter: Arc<KeyedLimiter<PeerId>>,

    /// Limits control messages per peer id.
    message_limiter: Arc<KeyedLimiter<PeerId>>,

    /// Global rate limiter across all peers.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("attach_limiter", &"KeyedLimiter<PeerId>")
            .field("message_limiter", &"KeyedLimiter<PeerId>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

/// Zero in the config means "as strict as possible", not "unlimited".
fn at_least_one(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl RateLimits {
    /// Create rate limiters from configuration.
    pub fn new(config: &LimitsConfig) -> Self {
        let attach_quota = Quota::per_minute(at_least_one(config.attaches_per_minute));
        let message_quota = Quota::per_minute(at_least_one(config.messages_per_minute));
        let global_quota = Quota::per_second(at_least_one(config.global_requests_per_second));

        Self {
            attach_limiter: Arc::new(RateLimiter::keyed(attach_quota)),
            message_limiter: Arc::new(RateLimiter::keyed(message_quota)),
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
        }
    }

    /// Check if an attach attempt is allowed.
    pub fn check_attach(&self, peer_id: &PeerId) -> Result<(), RateLimitError> {
        self.attach_limiter
            .check_key(peer_id)
            .map_err(|_| RateLimitError::AttachLimitExceeded)
    }

    /// Check if a control message is allowed.
    pub fn check_message(&self, peer_id: &PeerId) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(peer_id)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of tracked attach keys (for metrics).
    pub fn attach_keys_count(&self) -> usize {
        self.attach_limiter.len()
    }

    /// Number of tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Evict idle entries from the keyed limiters.
    ///
    /// Called periodically from the cleanup task.
    pub fn shrink(&self) {
        self.attach_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many attach attempts from this peer.
    #[error("attach rate limit exceeded")]
    AttachLimitExceeded,
    /// Too many messages from this peer.
    #[error("message rate limit exceeded")]
    MessageLimitExceeded,
    /// Global request rate exceeded across all peers.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}
