//! Error types for tablesync.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur in tablesync operations.
///
/// The first seven variants are the user-facing taxonomy; the rest are
/// local plumbing failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad or expired lobby code
    #[error("lobby not found")]
    NotFound,

    /// Lobby roster is at capacity
    #[error("lobby is full")]
    Full,

    /// Bad or expired credential
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed envelope
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A peer transport reached a terminal failure state
    #[error("peer negotiation failed: {0}")]
    NegotiationFailed(String),

    /// No control-channel open within the allowed window
    #[error("operation timed out")]
    Timeout,

    /// Abnormal close after having been connected, retries exhausted
    #[error("connection lost")]
    ConnectionLost,

    /// The lobby exists but its host has paused it
    #[error("lobby is suspended")]
    Suspended,

    /// The lobby was ended by the relay or the host
    #[error("lobby closed: {0}")]
    LobbyClosed(CloseReason),

    /// Invalid lobby code format
    #[error("invalid lobby code: {0}")]
    InvalidCode(String),

    /// JSON encoding or decoding failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Map a relay error code to the matching taxonomy entry.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        match code {
            ErrorCode::LobbyNotFound => SyncError::NotFound,
            ErrorCode::LobbyFull => SyncError::Full,
            ErrorCode::LobbySuspended => SyncError::Suspended,
            ErrorCode::Unauthorized | ErrorCode::NotHost => SyncError::Unauthorized,
            ErrorCode::InvalidMessage
            | ErrorCode::AlreadyInitialized
            | ErrorCode::RateLimited => SyncError::InvalidMessage(message.into()),
        }
    }
}

/// Error codes carried in the control channel `Error` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No lobby with that code.
    LobbyNotFound,
    /// Roster at capacity.
    LobbyFull,
    /// Host has suspended the lobby; clients cannot attach.
    LobbySuspended,
    /// Credential rejected, or host identity mismatch.
    Unauthorized,
    /// A host-only signal was sent by a client.
    NotHost,
    /// Envelope could not be decoded or violates the protocol.
    InvalidMessage,
    /// `init` called twice for the same code.
    AlreadyInitialized,
    /// Sender exceeded its message budget.
    RateLimited,
}

impl ErrorCode {
    /// WebSocket close code used when an attach is rejected with this error.
    pub fn close_code(self) -> u16 {
        match self {
            ErrorCode::LobbyNotFound => 4404,
            ErrorCode::LobbyFull => 4409,
            ErrorCode::Unauthorized | ErrorCode::NotHost => 4401,
            ErrorCode::LobbySuspended => 4423,
            ErrorCode::InvalidMessage | ErrorCode::AlreadyInitialized => 4400,
            ErrorCode::RateLimited => 4429,
        }
    }

    /// Inverse of [`ErrorCode::close_code`] for the attach rejections.
    pub fn from_close_code(code: u16) -> Option<Self> {
        match code {
            4404 => Some(ErrorCode::LobbyNotFound),
            4409 => Some(ErrorCode::LobbyFull),
            4401 => Some(ErrorCode::Unauthorized),
            4423 => Some(ErrorCode::LobbySuspended),
            4429 => Some(ErrorCode::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::LobbyNotFound => "LOBBY_NOT_FOUND",
            ErrorCode::LobbyFull => "LOBBY_FULL",
            ErrorCode::LobbySuspended => "LOBBY_SUSPENDED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotHost => "NOT_HOST",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::AlreadyInitialized => "ALREADY_INITIALIZED",
            ErrorCode::RateLimited => "RATE_LIMITED",
        };
        f.write_str(s)
    }
}

/// Why a lobby ended, as shown to the remaining members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The host went away without suspending.
    HostLeft,
    /// The host ended the session on purpose.
    HostClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::HostLeft => f.write_str("host_left"),
            CloseReason::HostClosed => f.write_str("host_closed"),
        }
    }
}
