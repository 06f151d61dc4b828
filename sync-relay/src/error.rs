//! Error types for the relay.

use std::path::PathBuf;
use sync_types::{ErrorCode, LobbyCode};

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Lobby registry error.
    #[error("lobby error: {0}")]
    Lobby(#[from] LobbyError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a record.
    #[error("corrupt lobby record {code}: {reason}")]
    Corrupt {
        /// Code column of the bad row.
        code: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Control-channel protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame could not be decoded.
    #[error("invalid message format: {reason}")]
    InvalidMessage {
        /// Reason the message is invalid.
        reason: String,
    },

    /// Frame exceeds the configured size.
    #[error("message too large: {size} bytes (limit: {limit} bytes)")]
    MessageTooLarge {
        /// Actual size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Binary frames are not part of the protocol.
    #[error("binary frames are not supported")]
    BinaryFrame,

    /// Sender exceeded its message budget.
    #[error("rate limited")]
    RateLimited,
}

impl ProtocolError {
    /// Wire error code reported to the sender.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::RateLimited => ErrorCode::RateLimited,
            _ => ErrorCode::InvalidMessage,
        }
    }
}

/// Lobby registry errors.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The code is already initialised by another identity.
    #[error("lobby {0} already initialized")]
    AlreadyInitialized(LobbyCode),

    /// No lobby with that code.
    #[error("lobby {0} not found")]
    NotFound(LobbyCode),

    /// Could not find a free code.
    #[error("no free lobby code after {0} attempts")]
    CodesExhausted(usize),

    /// The lobby instance stopped while handling the request.
    #[error("lobby {0} is shutting down")]
    Gone(LobbyCode),
}

impl LobbyError {
    /// Wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            LobbyError::AlreadyInitialized(_) => ErrorCode::AlreadyInitialized,
            LobbyError::NotFound(_) | LobbyError::Gone(_) => ErrorCode::LobbyNotFound,
            LobbyError::CodesExhausted(_) => ErrorCode::RateLimited,
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
