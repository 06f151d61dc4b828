//! # sync-types
//!
//! Wire format types for the tablesync lobby and peer-sync protocol.
//!
//! This crate provides the foundational types used across all tablesync crates:
//! - [`LobbyCode`], [`PeerId`], [`Identity`] - Identity types
//! - [`ControlRequest`] / [`ControlEvent`] - Control channel envelopes (device ⇄ relay)
//! - [`DataMessage`] - Data link envelopes (host ⇄ client)
//! - [`GameSnapshot`], [`PlayerEntry`], [`Member`] - Payload shapes
//! - [`SyncError`], [`ErrorCode`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod control;
mod data;
mod error;
mod ids;
mod snapshot;

pub use control::{ControlEvent, ControlRequest};
pub use data::{now_millis, DataMessage};
pub use error::{CloseReason, ErrorCode, SyncError};
pub use ids::{
    Identity, IdentityKind, LobbyCode, PeerId, Role, LOBBY_CODE_ALPHABET, LOBBY_CODE_LEN,
};
pub use snapshot::{GameSnapshot, LobbyInfo, Member, PlayerEntry};
