//! # sync-client
//!
//! Device library for tablesync.
//!
//! One device hosts a game session; the others mirror it. This crate
//! attaches a device to a lobby on the signaling relay, brokers a direct
//! data link to each peer, and keeps every mirror consistent with the
//! host's last broadcast snapshot.
//!
//! ## Features
//!
//! - **Session orchestration**: create, resume, join, suspend, leave and close
//! - **Reconnect**: exponential backoff driven by the pure state machine in sync-core
//! - **Peer links**: offer/answer/candidate negotiation relayed over the control channel
//! - **Host-authoritative sync**: actions go to the host, full snapshots come back
//!
//! ```text
//! Application → SessionHandle → SessionTask → ControlConnector → Relay
//!                                    ↓    ↘
//!                               SyncEngine  PeerManager → PeerConnector → Peers
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tablesync_client::{Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::new("http://127.0.0.1:8787"));
//! let handle = session.join(&code, Box::new(my_store)).await?;
//! handle.submit(serde_json::json!({"player": "p1", "delta": -1})).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod peer;
pub mod session;
pub mod store;
pub mod transport;

pub use api::{CreatedLobby, HttpLobbyApi, LobbyApi};
pub use config::{SessionConfig, DEFAULT_RELAY_URL};
pub use engine::{Delivery, EngineEvent, EngineOutput, GameStore, SyncEngine};
pub use error::{ClientError, GameError, Result, StoreError, TransportError};
pub use peer::{
    LinkEvent, LinkEvents, LinkId, LinkUpdate, MockConnector, PeerConnector, PeerManager,
    TcpConnector,
};
pub use session::{Session, SessionEnd, SessionEvent, SessionHandle};
pub use store::{MemorySessionStore, SavedGameState, SavedSession, SessionStore};
pub use transport::{ControlConnector, MockControlConnector, WsConnector};

pub use sync_core::{ConnectionState, Failure, ReconnectPolicy};
pub use sync_types::{
    CloseReason, GameSnapshot, LobbyCode, LobbyInfo, Member, PeerId, PlayerEntry, Role,
};
