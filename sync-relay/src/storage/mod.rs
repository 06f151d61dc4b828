//! Storage layer for the relay.
//!
//! Persists lobby records so suspended lobbies survive a restart. Live
//! connections are never stored.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use sync_core::LobbyRecord;
use sync_types::LobbyCode;

/// Trait for lobby record backends.
#[async_trait]
pub trait LobbyStorage: Send + Sync {
    /// Insert or replace a record.
    async fn put_lobby(&self, record: &LobbyRecord) -> Result<(), StorageError>;

    /// Fetch a record by code.
    async fn get_lobby(&self, code: &LobbyCode) -> Result<Option<LobbyRecord>, StorageError>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete_lobby(&self, code: &LobbyCode) -> Result<(), StorageError>;

    /// Every stored record.
    async fn list_lobbies(&self) -> Result<Vec<LobbyRecord>, StorageError>;

    /// Delete suspended records whose suspension began at or before `cutoff` (Unix seconds).
    ///
    /// Returns the number of records deleted.
    async fn delete_suspended_before(&self, cutoff: u64) -> Result<u64, StorageError>;

    /// Number of stored records.
    async fn count_lobbies(&self) -> Result<u64, StorageError>;
}
