//! # sync-core
//!
//! Pure logic for tablesync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for lobby
//! coordination and peer sync without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`state`]: a device's connection lifecycle and reconnect backoff
//! - [`lobby`]: the roster rules behind one signaling-relay instance
//! - [`merge`]: how a client folds an incoming snapshot into its mirror
//!
//! The actual I/O is performed by `sync-client` and `sync-relay`, which
//! interpret the actions and effects produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lobby;
pub mod merge;
pub mod state;

pub use lobby::{
    AttachRequest, ConnId, Effects, Lobby, LobbyRecord, Outbound, CLOSE_NORMAL, CLOSE_REPLACED,
    DEFAULT_CAPACITY,
};
pub use merge::{merge_players, merge_snapshot, DEFAULT_LOCAL_FIELDS};
pub use state::{
    Action, ConnectionState, EndReason, Event, Failure, Lifecycle, ReconnectPolicy,
};
