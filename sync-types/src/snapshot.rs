//! Roster and game-state shapes moved by the protocol.
//!
//! The sync layer treats game state as opaque: it only needs a player's
//! `id` (to merge device-local fields) and otherwise passes JSON through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{LobbyCode, PeerId};

/// One attached member of a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The member's peer id.
    pub peer_id: PeerId,
    /// Name shown to other members.
    pub display_name: String,
    /// Optional avatar reference (URL or asset key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Whether this member is the lobby host.
    pub is_host: bool,
}

/// A player entry inside a snapshot.
///
/// Only `id` is interpreted; every other field is carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    /// Stable player id used by the merge rule.
    pub id: String,
    /// All remaining player fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PlayerEntry {
    /// Create a player entry with no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A complete copy of game state as produced by the local game store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Player entries, in display order.
    pub players: Vec<PlayerEntry>,
    /// Game settings (opaque).
    pub settings: Value,
    /// Whether the game has started.
    #[serde(default)]
    pub game_started: bool,
    /// State of any optional game mode (opaque).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_mode_state: Option<Value>,
}

impl GameSnapshot {
    /// An empty snapshot: no players, null settings.
    pub fn empty() -> Self {
        Self {
            players: Vec::new(),
            settings: Value::Null,
            game_started: false,
            extra_mode_state: None,
        }
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Read-only lobby metadata returned by the relay's info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    /// The lobby code.
    pub code: LobbyCode,
    /// Peer id of the attached host, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<PeerId>,
    /// Unix timestamp (seconds) of creation.
    pub created_at: u64,
    /// Whether the host has suspended the lobby.
    pub suspended: bool,
    /// Roster capacity.
    pub capacity: usize,
    /// Currently attached members.
    pub members: Vec<Member>,
}
