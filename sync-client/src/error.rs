//! Client error types.

use sync_types::{ErrorCode, LobbyCode, SyncError};
use thiserror::Error;

/// Transport errors (control channel, lobby API and peer links).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay refused the request.
    #[error("rejected by relay: {code:?}: {message}")]
    Rejected {
        /// Relay error code.
        code: ErrorCode,
        /// Relay detail.
        message: String,
    },

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// Malformed address, offer or candidate.
    #[error("invalid negotiation data: {0}")]
    InvalidNegotiation(String),
}

/// Error reported by a [`GameStore`](crate::GameStore).
#[derive(Debug, Clone, Error)]
pub enum GameError {
    /// The store refused the action.
    #[error("action rejected: {0}")]
    Rejected(String),
}

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("store record invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Protocol-level failure from the shared taxonomy.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session store error.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    /// Game store error.
    #[error("game store error: {0}")]
    Game(#[from] GameError),

    /// The lobby code belongs to another host.
    #[error("lobby {0} is owned by another host")]
    CodeTaken(LobbyCode),

    /// No saved session with that id.
    #[error("no saved session {0}")]
    SessionNotFound(String),

    /// Host-only operation on a client.
    #[error("only the host can do that")]
    NotHost,

    /// Not connected to the lobby.
    #[error("not connected")]
    NotConnected,

    /// The session task has stopped.
    #[error("session has ended")]
    SessionEnded,
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
