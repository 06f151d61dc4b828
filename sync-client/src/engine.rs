//! Sync protocol engine.
//!
//! Host-authoritative consistency over the peer data links. On the host,
//! every applied `Action` is followed by a full `StateSync` to every open
//! link; on a client, every `StateSync` from the host overwrites the local
//! mirror except for device-local player fields.
//!
//! The engine does no I/O. It returns [`Delivery`] instructions that the
//! session hands to the peer manager.

use crate::error::{ClientError, GameError};
use serde_json::Value;
use sync_core::merge_snapshot;
use sync_types::{now_millis, CloseReason, DataMessage, GameSnapshot, Member, PeerId, Role};

/// The local game store the engine drives.
///
/// The engine is the store's only writer on the host, and only calls
/// `apply_action` for an `Action` that arrived over a link or was
/// submitted locally.
pub trait GameStore: Send {
    /// Apply an opaque intent.
    fn apply_action(&mut self, action: &Value) -> Result<(), GameError>;

    /// Complete copy of the current state.
    fn current_snapshot(&self) -> GameSnapshot;

    /// Replace the current state.
    fn restore_snapshot(&mut self, snapshot: GameSnapshot);
}

/// Where a data message should go.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// To one peer.
    To(PeerId, DataMessage),
    /// To every open link.
    Broadcast(DataMessage),
}

/// What an inbound message changed locally.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A host snapshot was applied to the local store.
    SnapshotApplied {
        /// Host timestamp of the snapshot (ms).
        timestamp: u64,
    },
    /// The host started the game.
    GameStarted,
    /// The host's list of linked members changed.
    PeersChanged {
        /// Members currently linked to the host.
        roster: Vec<Member>,
    },
    /// The host ended the session over the data link.
    Closed {
        /// Why.
        reason: CloseReason,
    },
}

/// Result of handling one inbound message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EngineOutput {
    /// Messages to send.
    pub deliveries: Vec<Delivery>,
    /// Local change, if any.
    pub event: Option<EngineEvent>,
}

impl EngineOutput {
    fn deliver(delivery: Delivery) -> Self {
        Self {
            deliveries: vec![delivery],
            event: None,
        }
    }

    fn event(event: EngineEvent) -> Self {
        Self {
            deliveries: Vec::new(),
            event: Some(event),
        }
    }
}

/// Role-aware sync engine.
pub struct SyncEngine {
    role: Role,
    store: Box<dyn GameStore>,
    local_fields: Vec<String>,
    host: Option<PeerId>,
    last_sync: Option<u64>,
}

impl SyncEngine {
    /// Create an engine for `role` around `store`.
    pub fn new(role: Role, store: Box<dyn GameStore>, local_fields: Vec<String>) -> Self {
        Self {
            role,
            store,
            local_fields,
            host: None,
            last_sync: None,
        }
    }

    /// This device's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Record which peer is the host (client side).
    pub fn set_host(&mut self, host: Option<PeerId>) {
        self.host = host;
    }

    /// The host's peer id, once known.
    pub fn host(&self) -> Option<&PeerId> {
        self.host.as_ref()
    }

    /// Timestamp of the last snapshot applied from the host.
    pub fn last_sync(&self) -> Option<u64> {
        self.last_sync
    }

    /// Current local state.
    pub fn snapshot(&self) -> GameSnapshot {
        self.store.current_snapshot()
    }

    /// Replace local state wholesale (resume from a saved session).
    pub fn restore(&mut self, snapshot: GameSnapshot) {
        self.store.restore_snapshot(snapshot);
    }

    /// A full snapshot message of the current state.
    pub fn state_sync(&self) -> DataMessage {
        DataMessage::state_sync(self.store.current_snapshot())
    }

    /// A link to `peer` opened.
    ///
    /// A client asks the host for the current state once per new link.
    pub fn link_opened(&self, peer: &PeerId) -> Vec<Delivery> {
        match self.role {
            Role::Client if self.host.as_ref() == Some(peer) => {
                vec![Delivery::To(peer.clone(), DataMessage::StateRequest)]
            }
            _ => Vec::new(),
        }
    }

    /// Submit a local intent.
    ///
    /// On the host it is applied and the new state broadcast. On a client
    /// it is sent to the host; the local mirror changes only when the
    /// host's `StateSync` arrives.
    pub fn submit(&mut self, action: Value) -> Result<Vec<Delivery>, ClientError> {
        match self.role {
            Role::Host => {
                self.store.apply_action(&action)?;
                Ok(vec![Delivery::Broadcast(self.state_sync())])
            }
            Role::Client => {
                let host = self.host.clone().ok_or(ClientError::NotConnected)?;
                Ok(vec![Delivery::To(host, DataMessage::Action { payload: action })])
            }
        }
    }

    /// Host: announce the game start, then the full state.
    pub fn start_game(&mut self) -> Result<Vec<Delivery>, ClientError> {
        if self.role != Role::Host {
            return Err(ClientError::NotHost);
        }
        let mut snapshot = self.store.current_snapshot();
        snapshot.game_started = true;
        self.store.restore_snapshot(snapshot.clone());
        Ok(vec![
            Delivery::Broadcast(DataMessage::GameStarted {
                players: snapshot.players.clone(),
                settings: snapshot.settings.clone(),
            }),
            Delivery::Broadcast(DataMessage::state_sync(snapshot)),
        ])
    }

    /// Host: the set of linked members changed.
    pub fn peer_update(&self, roster: Vec<Member>) -> Option<Delivery> {
        (self.role == Role::Host).then(|| Delivery::Broadcast(DataMessage::PeerUpdate { roster }))
    }

    /// Handle one message from `from`.
    pub fn on_message(&mut self, from: &PeerId, message: DataMessage) -> EngineOutput {
        match self.role {
            Role::Host => self.on_host_message(from, message),
            Role::Client => self.on_client_message(from, message),
        }
    }

    fn on_host_message(&mut self, from: &PeerId, message: DataMessage) -> EngineOutput {
        match message {
            DataMessage::StateRequest => {
                EngineOutput::deliver(Delivery::To(from.clone(), self.state_sync()))
            }
            DataMessage::Action { payload } => match self.store.apply_action(&payload) {
                Ok(()) => {
                    tracing::debug!("Applied action from {}", from);
                    EngineOutput::deliver(Delivery::Broadcast(self.state_sync()))
                }
                Err(e) => {
                    tracing::warn!("Action from {} rejected: {}", from, e);
                    // Resync the sender in case it acted on a stale mirror.
                    EngineOutput::deliver(Delivery::To(from.clone(), self.state_sync()))
                }
            },
            DataMessage::Ping { t } => {
                EngineOutput::deliver(Delivery::To(from.clone(), DataMessage::Pong { t }))
            }
            DataMessage::Unknown => EngineOutput::default(),
            other => {
                tracing::warn!("Host ignoring {} from {}", other.kind(), from);
                EngineOutput::default()
            }
        }
    }

    fn on_client_message(&mut self, from: &PeerId, message: DataMessage) -> EngineOutput {
        if self.host.as_ref() != Some(from) {
            tracing::warn!("Ignoring {} from non-host {}", message.kind(), from);
            return EngineOutput::default();
        }
        match message {
            DataMessage::StateSync {
                players,
                settings,
                game_started,
                extra_mode_state,
                timestamp,
            } => {
                let incoming = GameSnapshot {
                    players,
                    settings,
                    game_started,
                    extra_mode_state,
                };
                let local = self.store.current_snapshot();
                let merged = merge_snapshot(&local, incoming, &self.local_fields);
                self.store.restore_snapshot(merged);
                self.last_sync = Some(timestamp);
                tracing::debug!("Applied snapshot {}", timestamp);
                EngineOutput::event(EngineEvent::SnapshotApplied { timestamp })
            }
            DataMessage::GameStarted { players, settings } => {
                let local = self.store.current_snapshot();
                let incoming = GameSnapshot {
                    players,
                    settings,
                    game_started: true,
                    extra_mode_state: local.extra_mode_state.clone(),
                };
                let merged = merge_snapshot(&local, incoming, &self.local_fields);
                self.store.restore_snapshot(merged);
                EngineOutput::event(EngineEvent::GameStarted)
            }
            DataMessage::PeerUpdate { roster } => {
                EngineOutput::event(EngineEvent::PeersChanged { roster })
            }
            DataMessage::LobbyClosed { reason } => EngineOutput::event(EngineEvent::Closed { reason }),
            DataMessage::Pong { t } => {
                tracing::debug!("Link rtt {}ms", now_millis().saturating_sub(t));
                EngineOutput::default()
            }
            DataMessage::Unknown => EngineOutput::default(),
            other => {
                tracing::warn!("Client ignoring {} from host", other.kind());
                EngineOutput::default()
            }
        }
    }
}
