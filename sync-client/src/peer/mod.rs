//! Peer transport manager.
//!
//! Turns negotiation envelopes relayed over the control channel into one
//! direct, ordered, reliable data link per peer. The host offers, clients
//! answer, and both sides forward locally discovered candidates as soon as
//! they appear.
//!
//! ```text
//! Host                   Relay                  Client
//!  │ PeerJoined ◄──────────┤                       │
//!  ├─ Offer ──────────────►├─ OfferReceived ──────►│
//!  │◄─ AnswerReceived ─────┤◄──────────── Answer ──┤
//!  ├─ IceCandidate ───────►├─ IceCandidateRcvd ───►│
//!  │◄════════════ direct data link ═══════════════►│
//! ```
//!
//! A link that fails is torn down and removed. Retrying is left to the
//! session, which needs a fresh negotiation round over the control channel.

mod mock;
mod tcp;

pub use mock::{ConnectorCall, MockConnector};
pub use tcp::TcpConnector;

use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use sync_types::{ControlRequest, DataMessage, PeerId};
use tokio::sync::mpsc;

/// Sending half of an open data link.
pub type LinkSender = mpsc::UnboundedSender<DataMessage>;

/// Identifies one negotiation with a peer. Every offer or answer gets a fresh id.
pub type LinkId = u64;

/// A [`LinkEvent`] tagged with the link that produced it.
#[derive(Debug)]
pub struct LinkUpdate {
    /// Link the event belongs to.
    pub link: LinkId,
    /// What happened.
    pub event: LinkEvent,
}

/// Where a connector reports activity for one link.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    link: LinkId,
    tx: mpsc::UnboundedSender<LinkUpdate>,
}

impl LinkEvents {
    /// Report events for `link` on `tx`.
    pub fn new(link: LinkId, tx: mpsc::UnboundedSender<LinkUpdate>) -> Self {
        Self { link, tx }
    }

    /// The link these events belong to.
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Report `event`, tagged with this link.
    pub fn send(&self, event: LinkEvent) -> Result<(), mpsc::error::SendError<LinkUpdate>> {
        self.tx.send(LinkUpdate {
            link: self.link,
            event,
        })
    }
}

/// Link activity reported by a [`PeerConnector`].
#[derive(Debug)]
pub enum LinkEvent {
    /// A local connectivity candidate for `peer` is known.
    Candidate {
        /// Peer the candidate is for.
        peer: PeerId,
        /// Opaque candidate string.
        candidate: String,
    },
    /// The data link to `peer` is open.
    Opened {
        /// The peer.
        peer: PeerId,
        /// Where to write messages for it.
        sender: LinkSender,
    },
    /// A message arrived on the link.
    Message {
        /// Sender.
        peer: PeerId,
        /// Decoded message.
        message: DataMessage,
    },
    /// The remote side closed the link.
    Closed {
        /// The peer.
        peer: PeerId,
    },
    /// Negotiation or the link failed for good.
    Failed {
        /// The peer.
        peer: PeerId,
        /// What went wrong.
        reason: String,
    },
}

/// Offer/answer/candidate shaped direct transport.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Host side: prepare a transport for `peer` and produce an offer.
    async fn offer(&self, peer: &PeerId, events: LinkEvents) -> Result<String, TransportError>;

    /// Client side: accept `offer` from `peer` and produce an answer.
    async fn answer(
        &self,
        peer: &PeerId,
        offer: &str,
        events: LinkEvents,
    ) -> Result<String, TransportError>;

    /// Host side: apply the answer for a pending offer.
    async fn accept_answer(&self, peer: &PeerId, answer: &str) -> Result<(), TransportError>;

    /// Apply a remote connectivity candidate.
    async fn add_candidate(&self, peer: &PeerId, candidate: &str) -> Result<(), TransportError>;

    /// Tear down whatever exists for `peer`. Idempotent.
    async fn close(&self, peer: &PeerId);
}

/// Negotiation progress of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Offer or answer sent, link not yet open.
    Negotiating,
    /// Link open.
    Open,
}

#[derive(Debug)]
struct PeerLink {
    id: LinkId,
    state: LinkState,
    sender: Option<LinkSender>,
}

/// Per-device map of peer links.
///
/// Only the newest link to a peer is current. Events tagged with an older
/// [`LinkId`] are ignored, so a late close from a replaced link cannot tear
/// down a fresh negotiation.
pub struct PeerManager {
    connector: Arc<dyn PeerConnector>,
    events: mpsc::UnboundedSender<LinkUpdate>,
    links: HashMap<PeerId, PeerLink>,
    next_link: LinkId,
}

impl PeerManager {
    /// Create a manager that reports link activity on `events`.
    pub fn new(connector: Arc<dyn PeerConnector>, events: mpsc::UnboundedSender<LinkUpdate>) -> Self {
        Self {
            connector,
            events,
            links: HashMap::new(),
            next_link: 0,
        }
    }

    fn next_events(&mut self) -> LinkEvents {
        self.next_link += 1;
        LinkEvents::new(self.next_link, self.events.clone())
    }

    /// Host: a client attached; start negotiating and return the offer to relay.
    pub async fn on_peer_joined(&mut self, peer: &PeerId) -> Result<ControlRequest, TransportError> {
        if self.links.contains_key(peer) {
            // Reattach of a known peer: start over.
            self.remove(peer).await;
        }
        let events = self.next_events();
        let id = events.link();
        let sdp = self.connector.offer(peer, events).await?;
        self.links.insert(
            peer.clone(),
            PeerLink {
                id,
                state: LinkState::Negotiating,
                sender: None,
            },
        );
        tracing::debug!("Offer prepared for {}", peer);
        Ok(ControlRequest::Offer {
            target_peer_id: peer.clone(),
            sdp,
        })
    }

    /// Client: the host offered a link; return the answer to relay.
    pub async fn on_offer(&mut self, from: &PeerId, sdp: &str) -> Result<ControlRequest, TransportError> {
        if self.links.contains_key(from) {
            self.remove(from).await;
        }
        let events = self.next_events();
        let id = events.link();
        let answer = self.connector.answer(from, sdp, events).await?;
        self.links.insert(
            from.clone(),
            PeerLink {
                id,
                state: LinkState::Negotiating,
                sender: None,
            },
        );
        Ok(ControlRequest::Answer {
            target_peer_id: from.clone(),
            sdp: answer,
        })
    }

    /// Host: the client answered.
    pub async fn on_answer(&mut self, from: &PeerId, sdp: &str) -> Result<(), TransportError> {
        match self.links.get(from) {
            Some(link) if link.state == LinkState::Negotiating => {
                self.connector.accept_answer(from, sdp).await
            }
            _ => {
                tracing::debug!("Ignoring answer from {} with no pending offer", from);
                Ok(())
            }
        }
    }

    /// A remote candidate arrived. Candidates for unknown peers are discarded.
    pub async fn on_candidate(&mut self, from: &PeerId, candidate: &str) -> Result<(), TransportError> {
        if !self.links.contains_key(from) {
            tracing::debug!("Discarding candidate from unknown peer {}", from);
            return Ok(());
        }
        self.connector.add_candidate(from, candidate).await
    }

    /// A local candidate was discovered; the request to relay, if `link` is still current.
    pub fn local_candidate(
        &self,
        peer: &PeerId,
        link: LinkId,
        candidate: String,
    ) -> Option<ControlRequest> {
        self.is_current(peer, link)
            .then(|| ControlRequest::IceCandidate {
                target_peer_id: peer.clone(),
                candidate,
            })
    }

    /// Whether `link` is the newest link to `peer`.
    pub fn is_current(&self, peer: &PeerId, link: LinkId) -> bool {
        self.link_id(peer) == Some(link)
    }

    /// The current link to `peer`.
    pub fn link_id(&self, peer: &PeerId) -> Option<LinkId> {
        self.links.get(peer).map(|l| l.id)
    }

    /// Record an opened link. Returns false for a peer no longer tracked or a replaced link.
    pub fn link_opened(&mut self, peer: &PeerId, link: LinkId, sender: LinkSender) -> bool {
        match self.links.get_mut(peer) {
            Some(current) if current.id == link => {
                current.state = LinkState::Open;
                current.sender = Some(sender);
                tracing::info!("Link to {} open", peer);
                true
            }
            Some(_) => {
                tracing::debug!("Ignoring open of replaced link {} to {}", link, peer);
                false
            }
            None => false,
        }
    }

    /// The remote side closed or failed `link`. Tears the peer down only if
    /// `link` is current; returns whether it was open, or `None` when stale.
    pub async fn remove_link(&mut self, peer: &PeerId, link: LinkId) -> Option<bool> {
        if !self.is_current(peer, link) {
            tracing::debug!("Ignoring end of replaced link {} to {}", link, peer);
            return None;
        }
        Some(self.remove(peer).await)
    }

    /// Drop and tear down the link to `peer`. Returns whether it was open.
    pub async fn remove(&mut self, peer: &PeerId) -> bool {
        let was_open = self
            .links
            .remove(peer)
            .map(|link| link.state == LinkState::Open)
            .unwrap_or(false);
        self.connector.close(peer).await;
        was_open
    }

    /// Close every link and clear bookkeeping.
    pub async fn teardown(&mut self) {
        let peers: Vec<PeerId> = self.links.keys().cloned().collect();
        for peer in peers {
            self.remove(&peer).await;
        }
    }

    /// Send to one peer. Returns false if its link is not open.
    pub fn send(&self, peer: &PeerId, message: &DataMessage) -> bool {
        match self.links.get(peer).and_then(|l| l.sender.as_ref()) {
            Some(sender) => sender.send(message.clone()).is_ok(),
            None => false,
        }
    }

    /// Send to every open link. Returns how many accepted it.
    pub fn broadcast(&self, message: &DataMessage) -> usize {
        self.links
            .values()
            .filter_map(|l| l.sender.as_ref())
            .filter(|sender| sender.send(message.clone()).is_ok())
            .count()
    }

    /// Peers whose link is open.
    pub fn open_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .links
            .iter()
            .filter(|(_, l)| l.state == LinkState::Open)
            .map(|(p, _)| p.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Negotiation state of `peer`.
    pub fn state(&self, peer: &PeerId) -> Option<LinkState> {
        self.links.get(peer).map(|l| l.state)
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
