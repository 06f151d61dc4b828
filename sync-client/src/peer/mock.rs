//! Mock peer connector for testing.
//!
//! Records every call and lets tests drive link events by hand.

use super::{LinkEvent, LinkEvents, PeerConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sync_types::{DataMessage, PeerId};
use tokio::sync::mpsc;

/// A recorded connector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    /// `offer(peer)`
    Offer(PeerId),
    /// `answer(peer, offer)`
    Answer(PeerId, String),
    /// `accept_answer(peer, answer)`
    AcceptAnswer(PeerId, String),
    /// `add_candidate(peer, candidate)`
    Candidate(PeerId, String),
    /// `close(peer)`
    Close(PeerId),
}

#[derive(Debug, Default)]
struct MockConnectorInner {
    calls: Vec<ConnectorCall>,
    events: HashMap<PeerId, LinkEvents>,
    fail_next: Option<String>,
}

/// Mock connector for testing.
///
/// Offers are `offer:<peer>`, answers are `answer:<peer>`.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

impl MockConnector {
    /// Create a new mock connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<ConnectorCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Cause the next offer()/answer() to fail.
    pub fn fail_next(&self, error: &str) {
        self.inner.lock().unwrap().fail_next = Some(error.to_string());
    }

    fn emit(&self, peer: &PeerId, event: LinkEvent) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.events.get(peer) {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Open the link to `peer`; returns what the device writes to it.
    pub fn open_link(&self, peer: &PeerId) -> Option<mpsc::UnboundedReceiver<DataMessage>> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.emit(
            peer,
            LinkEvent::Opened {
                peer: peer.clone(),
                sender,
            },
        )
        .then_some(rx)
    }

    /// Deliver `message` as if `peer` sent it.
    pub fn deliver(&self, peer: &PeerId, message: DataMessage) -> bool {
        self.emit(
            peer,
            LinkEvent::Message {
                peer: peer.clone(),
                message,
            },
        )
    }

    /// The reporter for the current link to `peer`. Keeping it past a
    /// re-offer lets a test replay late events from the replaced link.
    pub fn link_events(&self, peer: &PeerId) -> Option<LinkEvents> {
        self.inner.lock().unwrap().events.get(peer).cloned()
    }

    /// Report a local candidate for `peer`.
    pub fn discover(&self, peer: &PeerId, candidate: &str) -> bool {
        self.emit(
            peer,
            LinkEvent::Candidate {
                peer: peer.clone(),
                candidate: candidate.to_string(),
            },
        )
    }

    /// Fail the link to `peer`.
    pub fn fail(&self, peer: &PeerId, reason: &str) -> bool {
        self.emit(
            peer,
            LinkEvent::Failed {
                peer: peer.clone(),
                reason: reason.to_string(),
            },
        )
    }

    /// Close the link from the remote side.
    pub fn remote_close(&self, peer: &PeerId) -> bool {
        self.emit(peer, LinkEvent::Closed { peer: peer.clone() })
    }

    fn begin(&self, peer: &PeerId, call: ConnectorCall, events: LinkEvents) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next.take() {
            return Err(TransportError::ConnectionFailed(error));
        }
        inner.calls.push(call);
        inner.events.insert(peer.clone(), events);
        Ok(())
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn offer(&self, peer: &PeerId, events: LinkEvents) -> Result<String, TransportError> {
        self.begin(peer, ConnectorCall::Offer(peer.clone()), events)?;
        Ok(format!("offer:{}", peer))
    }

    async fn answer(
        &self,
        peer: &PeerId,
        offer: &str,
        events: LinkEvents,
    ) -> Result<String, TransportError> {
        self.begin(peer, ConnectorCall::Answer(peer.clone(), offer.to_string()), events)?;
        Ok(format!("answer:{}", peer))
    }

    async fn accept_answer(&self, peer: &PeerId, answer: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(ConnectorCall::AcceptAnswer(peer.clone(), answer.to_string()));
        Ok(())
    }

    async fn add_candidate(&self, peer: &PeerId, candidate: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(ConnectorCall::Candidate(peer.clone(), candidate.to_string()));
        Ok(())
    }

    async fn close(&self, peer: &PeerId) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ConnectorCall::Close(peer.clone()));
        inner.events.remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::peer::LinkUpdate;

    #[tokio::test]
    async fn events_flow_after_offer() {
        let connector = MockConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bob = PeerId::new("bob");

        assert!(connector.open_link(&bob).is_none());
        connector.offer(&bob, LinkEvents::new(3, tx)).await.unwrap();

        let mut link = connector.open_link(&bob).unwrap();
        match rx.recv().await {
            Some(LinkUpdate {
                link: 3,
                event: LinkEvent::Opened { peer, sender },
            }) => {
                assert_eq!(peer, bob);
                sender.send(DataMessage::StateRequest).unwrap();
            }
            other => panic!("expected Opened, got {:?}", other),
        }
        assert_eq!(link.recv().await, Some(DataMessage::StateRequest));
    }

    #[tokio::test]
    async fn close_stops_events() {
        let connector = MockConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let bob = PeerId::new("bob");
        connector.offer(&bob, LinkEvents::new(1, tx)).await.unwrap();
        connector.close(&bob).await;
        assert!(!connector.deliver(&bob, DataMessage::StateRequest));
    }

    #[tokio::test]
    async fn forced_failure() {
        let connector = MockConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        connector.fail_next("no route");
        assert!(connector
            .offer(&PeerId::new("bob"), LinkEvents::new(1, tx))
            .await
            .is_err());
    }
}
