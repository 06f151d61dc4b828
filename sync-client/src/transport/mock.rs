//! Mock control channel for testing.
//!
//! Every `open()` hands the test a [`MockRelayEnd`] playing the relay side
//! of the new channel.

use super::{AttachTarget, ControlConnector, ControlInbound, ControlLink, ControlOutbound};
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{ControlEvent, ControlRequest};
use tokio::sync::mpsc;

/// Relay side of one mocked control channel.
#[derive(Debug)]
pub struct MockRelayEnd {
    /// The attach target the device used.
    pub target: AttachTarget,
    requests: mpsc::UnboundedReceiver<ControlOutbound>,
    events: mpsc::UnboundedSender<ControlInbound>,
}

impl MockRelayEnd {
    /// Deliver an event to the device.
    pub fn send(&self, event: ControlEvent) {
        let _ = self.events.send(ControlInbound::Event(event));
    }

    /// Close the channel from the relay side.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.events.send(ControlInbound::Closed { code });
    }

    /// Next frame from the device, waiting up to one second.
    pub async fn next(&mut self) -> Option<ControlOutbound> {
        tokio::time::timeout(Duration::from_secs(1), self.requests.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next request from the device, skipping pings.
    pub async fn next_request(&mut self) -> Option<ControlRequest> {
        loop {
            match self.next().await? {
                ControlOutbound::Request(ControlRequest::Ping) => continue,
                ControlOutbound::Request(request) => return Some(request),
                ControlOutbound::Close => return None,
            }
        }
    }
}

#[derive(Debug, Default)]
struct MockControlInner {
    targets: Vec<AttachTarget>,
    fail_next_open: Option<String>,
}

/// Mock connector for testing.
#[derive(Debug, Clone)]
pub struct MockControlConnector {
    inner: Arc<Mutex<MockControlInner>>,
    ends: mpsc::UnboundedSender<MockRelayEnd>,
}

impl MockControlConnector {
    /// Create a connector and the queue its relay ends arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockRelayEnd>) {
        let (ends, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::default(),
                ends,
            },
            rx,
        )
    }

    /// Cause the next open() to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_open = Some(error.to_string());
    }

    /// Every target opened so far.
    pub fn targets(&self) -> Vec<AttachTarget> {
        self.inner.lock().unwrap().targets.clone()
    }
}

#[async_trait]
impl ControlConnector for MockControlConnector {
    async fn open(&self, target: &AttachTarget) -> Result<ControlLink, TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.fail_next_open.take() {
                return Err(TransportError::ConnectionFailed(error));
            }
            inner.targets.push(target.clone());
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let end = MockRelayEnd {
            target: target.clone(),
            requests: out_rx,
            events: in_tx,
        };
        self.ends
            .send(end)
            .map_err(|_| TransportError::ConnectionFailed("mock relay gone".into()))?;
        Ok(ControlLink::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{LobbyCode, PeerId, Role};

    fn target() -> AttachTarget {
        AttachTarget {
            relay_url: "http://relay".into(),
            code: LobbyCode::parse("ABC234").unwrap(),
            peer_id: PeerId::new("p1"),
            display_name: "P1".into(),
            avatar_ref: None,
            role: Role::Client,
            token: "t".into(),
        }
    }

    #[tokio::test]
    async fn open_hands_out_relay_end() {
        let (connector, mut ends) = MockControlConnector::new();
        let mut link = connector.open(&target()).await.unwrap();
        let mut end = ends.recv().await.unwrap();

        link.send(ControlRequest::Ping).unwrap();
        assert_eq!(
            end.next().await,
            Some(ControlOutbound::Request(ControlRequest::Ping))
        );

        end.send(ControlEvent::Pong);
        assert_eq!(link.recv().await, ControlInbound::Event(ControlEvent::Pong));

        end.close(Some(1000));
        assert_eq!(link.recv().await, ControlInbound::Closed { code: Some(1000) });
        assert_eq!(connector.targets(), vec![target()]);
    }

    #[tokio::test]
    async fn dropped_end_reads_as_abnormal_close() {
        let (connector, mut ends) = MockControlConnector::new();
        let mut link = connector.open(&target()).await.unwrap();
        drop(ends.recv().await.unwrap());
        assert_eq!(link.recv().await, ControlInbound::Closed { code: None });
    }

    #[tokio::test]
    async fn forced_open_failure() {
        let (connector, _ends) = MockControlConnector::new();
        connector.fail_next_open("refused");
        assert!(matches!(
            connector.open(&target()).await,
            Err(TransportError::ConnectionFailed(_))
        ));
        assert!(connector.open(&target()).await.is_ok());
    }
}
