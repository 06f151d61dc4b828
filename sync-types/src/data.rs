//! Data-link envelopes (host ⇄ client, over the direct peer link).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{CloseReason, GameSnapshot, Member, PlayerEntry, SyncError};

/// All messages exchanged over a peer data link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DataMessage {
    /// Client asks for a full snapshot (once per newly opened link).
    StateRequest,
    /// Client intent, applied only by the host.
    Action {
        /// Opaque game action.
        payload: Value,
    },
    /// Client latency probe.
    Ping {
        /// Sender's clock, echoed back in `Pong`.
        t: u64,
    },
    /// Full authoritative snapshot.
    StateSync {
        /// Player entries.
        players: Vec<PlayerEntry>,
        /// Game settings.
        settings: Value,
        /// Whether the game has started.
        game_started: bool,
        /// Optional game-mode state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_mode_state: Option<Value>,
        /// Milliseconds since the Unix epoch; diagnostic ordering only.
        timestamp: u64,
    },
    /// Host started the game.
    GameStarted {
        /// Player entries at start.
        players: Vec<PlayerEntry>,
        /// Game settings at start.
        settings: Value,
    },
    /// Host's roster of linked members.
    PeerUpdate {
        /// Linked members, host included.
        roster: Vec<Member>,
    },
    /// Host is ending the session.
    LobbyClosed {
        /// Why.
        reason: CloseReason,
    },
    /// Reply to `Ping`.
    Pong {
        /// Echo of the ping's `t`.
        t: u64,
    },
    /// Any type this build does not know.
    #[serde(other)]
    Unknown,
}

impl DataMessage {
    /// Build a `StateSync` from a snapshot, stamped with the current time.
    pub fn state_sync(snapshot: GameSnapshot) -> Self {
        DataMessage::StateSync {
            players: snapshot.players,
            settings: snapshot.settings,
            game_started: snapshot.game_started,
            extra_mode_state: snapshot.extra_mode_state,
            timestamp: now_millis(),
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DataMessage::StateRequest => "StateRequest",
            DataMessage::Action { .. } => "Action",
            DataMessage::Ping { .. } => "Ping",
            DataMessage::StateSync { .. } => "StateSync",
            DataMessage::GameStarted { .. } => "GameStarted",
            DataMessage::PeerUpdate { .. } => "PeerUpdate",
            DataMessage::LobbyClosed { .. } => "LobbyClosed",
            DataMessage::Pong { .. } => "Pong",
            DataMessage::Unknown => "Unknown",
        }
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
