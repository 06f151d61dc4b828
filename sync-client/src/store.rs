//! Saved sessions.
//!
//! A host persists its session on suspend, close and leave so it can be
//! resumed later under the same lobby code. Storage itself is an external
//! collaborator behind [`SessionStore`].

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use sync_types::{GameSnapshot, LobbyCode, PlayerEntry};
use tokio::sync::RwLock;

/// Game state portion of a saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameState {
    /// Player entries.
    pub players: Vec<PlayerEntry>,
    /// Game settings.
    pub settings: Value,
}

impl From<GameSnapshot> for SavedGameState {
    fn from(snapshot: GameSnapshot) -> Self {
        Self {
            players: snapshot.players,
            settings: snapshot.settings,
        }
    }
}

impl From<SavedGameState> for GameSnapshot {
    fn from(state: SavedGameState) -> Self {
        GameSnapshot {
            players: state.players,
            settings: state.settings,
            game_started: false,
            extra_mode_state: None,
        }
    }
}

/// A persisted session.
///
/// `lobby_code` is present only if the session was ever hosted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    /// Session id.
    pub id: String,
    /// Lobby code the session was hosted under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby_code: Option<LobbyCode>,
    /// Human-readable name.
    pub name: String,
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Last saved game state.
    pub game_state: SavedGameState,
}

impl SavedSession {
    /// A new local-only session with a fresh id.
    pub fn new(name: &str, created_at: u64, snapshot: GameSnapshot) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lobby_code: None,
            name: name.to_string(),
            created_at,
            game_state: snapshot.into(),
        }
    }
}

/// Durable keyed store of saved sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id.
    async fn get(&self, id: &str) -> Result<Option<SavedSession>, StoreError>;

    /// Insert or replace a session.
    async fn put(&self, session: SavedSession) -> Result<(), StoreError>;

    /// Delete a session. Missing ids are not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Every saved session, newest first.
    async fn list(&self) -> Result<Vec<SavedSession>, StoreError>;
}

/// In-memory [`SessionStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SavedSession>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<SavedSession>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: SavedSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SavedSession>, StoreError> {
        let mut all: Vec<SavedSession> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
