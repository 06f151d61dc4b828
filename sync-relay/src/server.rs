//! Main LobbyRelay server coordination.
//!
//! LobbyRelay owns the registry of running lobbies, storage, rate limits,
//! the credential verifier, and metrics.

use crate::auth::CredentialVerifier;
use crate::config::Config;
use crate::error::{LobbyError, StorageError};
use crate::instance::{self, InstanceContext, LobbyHandle};
use crate::limits::RateLimits;
use crate::storage::{LobbyStorage, SqliteStorage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sync_core::{ConnId, Lobby, LobbyRecord};
use sync_types::{Identity, LobbyCode, LobbyInfo};

/// Attempts at finding an unused random code before giving up.
const CODE_ATTEMPTS: usize = 32;

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Lobbies initialised.
    pub lobbies_created_total: AtomicU64,
    /// Lobbies destroyed (host gone, closed, or expired).
    pub lobbies_destroyed_total: AtomicU64,
    /// Successful attaches.
    pub attaches_total: AtomicU64,
    /// Attaches rejected by the roster rules or auth.
    pub attach_rejections_total: AtomicU64,
    /// Negotiation envelopes forwarded.
    pub messages_relayed_total: AtomicU64,
    /// Rate limit rejections.
    pub rate_limit_hits: AtomicU64,
    /// Per-member protocol errors.
    pub errors_total: AtomicU64,
}

/// Main relay server.
pub struct LobbyRelay {
    config: Config,
    storage: Arc<SqliteStorage>,
    verifier: Arc<dyn CredentialVerifier>,
    rate_limits: RateLimits,
    metrics: Arc<RelayMetrics>,
    lobbies: Arc<DashMap<LobbyCode, LobbyHandle>>,
    next_conn: AtomicU64,
    next_instance: AtomicU64,
    started: Instant,
}

impl std::fmt::Debug for LobbyRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("lobbies_count", &self.lobbies.len())
            .finish_non_exhaustive()
    }
}

impl LobbyRelay {
    /// Create a new relay with the given config, storage and verifier.
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            storage: Arc::new(storage),
            verifier,
            rate_limits,
            metrics: Arc::new(RelayMetrics::default()),
            lobbies: Arc::new(DashMap::new()),
            next_conn: AtomicU64::new(1),
            next_instance: AtomicU64::new(1),
            started: Instant::now(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Get access to the credential verifier.
    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.verifier.as_ref()
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    fn context(&self) -> InstanceContext {
        InstanceContext {
            registry: self.lobbies.clone(),
            storage: self.storage.clone(),
            metrics: self.metrics.clone(),
        }
    }

    fn instance_id(&self) -> u64 {
        self.next_instance.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate a connection id.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Restart suspended lobbies from storage.
    ///
    /// Records of lobbies that were live when the relay stopped are
    /// deleted: their host left without suspending. Returns the number of
    /// lobbies restored.
    pub async fn rehydrate(&self) -> Result<usize, StorageError> {
        let mut restored = 0;
        for record in self.storage.list_lobbies().await? {
            if !record.suspended {
                tracing::info!("Dropping stale live lobby {}", record.code);
                self.storage.delete_lobby(&record.code).await?;
                continue;
            }
            let code = record.code.clone();
            let lobby = Lobby::restore(record, self.config.limits.max_members);
            let handle = instance::spawn(self.instance_id(), lobby, false, self.context());
            self.lobbies.insert(code, handle);
            restored += 1;
        }
        if restored > 0 {
            tracing::info!("Rehydrated {} suspended lobbies", restored);
        }
        Ok(restored)
    }

    /// Create (or reclaim) a lobby for `identity`.
    ///
    /// Without a code a fresh unused one is generated. With a code, a lobby
    /// already owned by the same identity is returned unchanged; one owned
    /// by anyone else is [`LobbyError::AlreadyInitialized`].
    pub async fn create_lobby(
        &self,
        identity: &Identity,
        code: Option<LobbyCode>,
    ) -> Result<LobbyRecord, LobbyError> {
        match code {
            Some(code) => self.claim(identity, code).await,
            None => {
                for _ in 0..CODE_ATTEMPTS {
                    let code = LobbyCode::generate();
                    if let Some(record) = self.try_init(identity, &code) {
                        return Ok(record);
                    }
                }
                Err(LobbyError::CodesExhausted(CODE_ATTEMPTS))
            }
        }
    }

    async fn claim(&self, identity: &Identity, code: LobbyCode) -> Result<LobbyRecord, LobbyError> {
        if let Some(record) = self.try_init(identity, &code) {
            return Ok(record);
        }
        let handle = self
            .lobby(&code)
            .ok_or_else(|| LobbyError::Gone(code.clone()))?;
        let record = handle
            .record()
            .await
            .ok_or_else(|| LobbyError::Gone(code.clone()))?;
        if record.host_subject != identity.subject {
            return Err(LobbyError::AlreadyInitialized(code));
        }
        tracing::info!("Lobby {} reclaimed by its host", code);
        Ok(record)
    }

    /// Initialise `code` if nobody holds it.
    fn try_init(&self, identity: &Identity, code: &LobbyCode) -> Option<LobbyRecord> {
        match self.lobbies.entry(code.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let lobby = Lobby::init(
                    code.clone(),
                    identity.subject.clone(),
                    now_secs(),
                    self.config.limits.max_members,
                );
                let record = lobby.record().clone();
                let handle = instance::spawn(self.instance_id(), lobby, true, self.context());
                slot.insert(handle);
                self.metrics
                    .lobbies_created_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::info!("Lobby {} created by {}", code, identity.subject);
                Some(record)
            }
        }
    }

    /// Handle of a running lobby.
    pub fn lobby(&self, code: &LobbyCode) -> Option<LobbyHandle> {
        self.lobbies.get(code).map(|entry| entry.value().clone())
    }

    /// Read-only roster and metadata.
    pub async fn info(&self, code: &LobbyCode) -> Option<LobbyInfo> {
        self.lobby(code)?.info().await
    }

    /// Destroy empty lobbies past their TTL. Lobbies nobody ever attached
    /// to use the idle timeout; suspended ones use the suspended TTL.
    ///
    /// Returns the number destroyed.
    pub async fn expire_idle(&self, now: u64) -> usize {
        let idle_ttl = self.config.limits.idle_timeout_secs;
        let suspended_ttl = self.config.storage.suspended_ttl_secs;
        let idle: Vec<LobbyHandle> = self
            .lobbies
            .iter()
            .filter(|entry| entry.value().member_count() == 0)
            .map(|entry| entry.value().clone())
            .collect();

        let mut expired = 0;
        for handle in idle {
            if handle.expire(now, idle_ttl, suspended_ttl).await {
                expired += 1;
            }
        }
        expired
    }

    /// Number of running lobbies.
    pub fn total_lobbies(&self) -> usize {
        self.lobbies.len()
    }

    /// Running lobbies with nobody attached: suspended, or waiting for
    /// their host.
    pub fn empty_lobbies(&self) -> usize {
        self.lobbies
            .iter()
            .filter(|entry| entry.value().member_count() == 0)
            .count()
    }

    /// Time since this relay was constructed.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of attached members across all lobbies.
    pub fn total_members(&self) -> usize {
        self.lobbies
            .iter()
            .map(|entry| entry.value().member_count())
            .sum()
    }
}
