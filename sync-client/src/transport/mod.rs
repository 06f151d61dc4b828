//! Control-channel transport.
//!
//! A [`ControlConnector`] opens the persistent device ⇄ relay channel for
//! one attach. The open channel is a [`ControlLink`]: a pair of queues
//! pumped by a background task, so the session task can send and receive
//! from one `select!` loop without holding the socket.
//!
//! # Example
//!
//! ```ignore
//! let connector = WsConnector::new();
//! let mut link = connector.open(&target).await?;
//! link.send(ControlRequest::Ping)?;
//! let frame = link.recv().await;
//! ```

mod mock;
mod ws;

pub use mock::{MockControlConnector, MockRelayEnd};
pub use ws::WsConnector;

use crate::error::TransportError;
use async_trait::async_trait;
use sync_types::{ControlEvent, ControlRequest, LobbyCode, PeerId, Role};
use tokio::sync::mpsc;

/// Everything the relay needs to attach one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTarget {
    /// HTTP base URL of the relay.
    pub relay_url: String,
    /// Lobby to attach to.
    pub code: LobbyCode,
    /// This device's peer id.
    pub peer_id: PeerId,
    /// Name shown to other members.
    pub display_name: String,
    /// Optional avatar reference.
    pub avatar_ref: Option<String>,
    /// Requested role.
    pub role: Role,
    /// Bearer credential.
    pub token: String,
}

/// Frame headed for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutbound {
    /// A control request.
    Request(ControlRequest),
    /// Close the channel with the normal close code.
    Close,
}

/// Frame received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlInbound {
    /// A decoded control event.
    Event(ControlEvent),
    /// The channel closed, with the close code when one was sent.
    Closed {
        /// WebSocket close code.
        code: Option<u16>,
    },
}

/// An open control channel.
#[derive(Debug)]
pub struct ControlLink {
    tx: mpsc::UnboundedSender<ControlOutbound>,
    rx: mpsc::UnboundedReceiver<ControlInbound>,
}

impl ControlLink {
    /// Wrap the two ends of a pumped channel.
    pub fn new(
        tx: mpsc::UnboundedSender<ControlOutbound>,
        rx: mpsc::UnboundedReceiver<ControlInbound>,
    ) -> Self {
        Self { tx, rx }
    }

    /// Queue a request.
    pub fn send(&self, request: ControlRequest) -> Result<(), TransportError> {
        self.tx
            .send(ControlOutbound::Request(request))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Ask the pump to close the channel normally.
    pub fn close(&self) {
        let _ = self.tx.send(ControlOutbound::Close);
    }

    /// Next inbound frame. A pump that went away reads as an abnormal close.
    pub async fn recv(&mut self) -> ControlInbound {
        self.rx
            .recv()
            .await
            .unwrap_or(ControlInbound::Closed { code: None })
    }
}

/// Opens control channels.
#[async_trait]
pub trait ControlConnector: Send + Sync {
    /// Open a channel and start the attach handshake.
    ///
    /// Returns once the transport is up; the relay's `Joined` or `Error`
    /// arrives as the first inbound frame.
    async fn open(&self, target: &AttachTarget) -> Result<ControlLink, TransportError>;
}
