//! WebSocket control channel.

use super::{AttachTarget, ControlConnector, ControlInbound, ControlLink, ControlOutbound};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use sync_types::ControlEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Connector that attaches over `GET /lobbies/:code/ws`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

/// Build the attach URL for `target`.
pub(crate) fn attach_url(target: &AttachTarget) -> Result<Url, TransportError> {
    let mut url = Url::parse(&target.relay_url)
        .map_err(|e| TransportError::ConnectionFailed(format!("bad relay url: {}", e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::ConnectionFailed(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::ConnectionFailed("cannot set scheme".into()))?;
    url.set_path(&format!("/lobbies/{}/ws", target.code));

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("peerId", target.peer_id.as_str());
        query.append_pair("displayName", &target.display_name);
        if let Some(avatar) = &target.avatar_ref {
            query.append_pair("avatarRef", avatar);
        }
        query.append_pair("role", target.role.as_str());
        query.append_pair("token", &target.token);
    }
    Ok(url)
}

#[async_trait]
impl ControlConnector for WsConnector {
    async fn open(&self, target: &AttachTarget) -> Result<ControlLink, TransportError> {
        let url = attach_url(target)?;
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!("Control channel open for {}", target.code);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ControlOutbound>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ControlInbound>();
        let (mut write, mut read) = socket.split();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => match outbound {
                        Some(ControlOutbound::Request(request)) => {
                            let text = match request.to_json() {
                                Ok(text) => text,
                                Err(e) => {
                                    tracing::error!("Failed to encode control request: {}", e);
                                    continue;
                                }
                            };
                            if write.send(Message::Text(text)).await.is_err() {
                                let _ = in_tx.send(ControlInbound::Closed { code: None });
                                break;
                            }
                        }
                        Some(ControlOutbound::Close) | None => {
                            let _ = write
                                .send(Message::Close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "".into(),
                                })))
                                .await;
                            break;
                        }
                    },
                    inbound = read.next() => match inbound {
                        Some(Ok(Message::Text(text))) => match ControlEvent::from_json(&text) {
                            Ok(event) => {
                                if in_tx.send(ControlInbound::Event(event)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Dropping malformed control frame: {}", e),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            let _ = in_tx.send(ControlInbound::Closed { code });
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!("Control channel error: {}", e);
                            let _ = in_tx.send(ControlInbound::Closed { code: None });
                            break;
                        }
                        None => {
                            let _ = in_tx.send(ControlInbound::Closed { code: None });
                            break;
                        }
                    },
                }
            }
        });

        Ok(ControlLink::new(out_tx, in_rx))
    }
}
