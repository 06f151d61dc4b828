//! Control-channel WebSocket endpoint.
//!
//! `GET /lobbies/:code/ws?peerId=&displayName=&avatarRef=&role=&token=`
//!
//! The upgrade always succeeds; a rejected attach is reported as one
//! `Error` frame followed by a close frame carrying the matching code.

use crate::auth::authenticate;
use crate::error::ProtocolError;
use crate::instance::{rejection_message, LobbyHandle, Outgoing};
use crate::server::LobbyRelay;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::response::Response;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sync_core::AttachRequest;
use sync_types::{ControlEvent, ControlRequest, ErrorCode, LobbyCode, PeerId, Role};
use tokio::sync::mpsc;

/// Display name used when none is given.
const DEFAULT_DISPLAY_NAME: &str = "Player";

/// Query parameters of the attach URL.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachParams {
    /// Device-chosen peer id.
    pub peer_id: Option<String>,
    /// Name shown to other members.
    pub display_name: Option<String>,
    /// Optional avatar reference.
    pub avatar_ref: Option<String>,
    /// `host` or `client` (default).
    pub role: Option<String>,
    /// Bearer credential.
    pub token: Option<String>,
}

/// `GET /lobbies/:code/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(params): Query<AttachParams>,
    Extension(relay): Extension<Arc<LobbyRelay>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay, code, params))
}

/// Cut `name` to at most `max` characters on a char boundary.
pub fn truncate_display_name(name: &str, max: usize) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return DEFAULT_DISPLAY_NAME.to_string();
    }
    trimmed.chars().take(max).collect()
}

async fn prepare(
    relay: &LobbyRelay,
    raw_code: &str,
    params: AttachParams,
) -> Result<(LobbyHandle, AttachRequest), ErrorCode> {
    let limits = relay.rate_limits();
    limits.check_global().map_err(|_| ErrorCode::RateLimited)?;

    let peer_id = params
        .peer_id
        .filter(|p| !p.trim().is_empty())
        .map(PeerId::new)
        .ok_or(ErrorCode::InvalidMessage)?;
    limits
        .check_attach(&peer_id)
        .map_err(|_| ErrorCode::RateLimited)?;

    let role = match params.role.as_deref() {
        None | Some("client") => Role::Client,
        Some("host") => Role::Host,
        Some(_) => return Err(ErrorCode::InvalidMessage),
    };

    let code = LobbyCode::parse(raw_code).map_err(|_| ErrorCode::LobbyNotFound)?;
    let identity = authenticate(relay.verifier(), params.token.as_deref())
        .await
        .map_err(|e| {
            tracing::debug!("Attach to {} unauthorized: {}", code, e);
            ErrorCode::Unauthorized
        })?;
    let handle = relay.lobby(&code).ok_or(ErrorCode::LobbyNotFound)?;

    let max_name = relay.config().limits.max_display_name_len;
    let request = AttachRequest {
        conn: relay.next_conn_id(),
        peer_id,
        display_name: truncate_display_name(params.display_name.as_deref().unwrap_or(""), max_name),
        avatar_ref: params.avatar_ref.filter(|a| !a.is_empty()),
        role,
        subject: identity.subject,
    };
    Ok((handle, request))
}

async fn reject(mut socket: WebSocket, code: ErrorCode) {
    if let Ok(text) = ControlEvent::error(code, rejection_message(code)).to_json() {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: code.close_code(),
            reason: Cow::Borrowed(rejection_message(code)),
        })))
        .await;
}

/// Validate and decode one text frame.
fn decode_frame(relay: &LobbyRelay, peer: &PeerId, text: &str) -> Result<ControlRequest, ProtocolError> {
    let limit = relay.config().limits.max_message_bytes;
    if text.len() > limit {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            limit,
        });
    }
    let limits = relay.rate_limits();
    if limits.check_global().is_err() || limits.check_message(peer).is_err() {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        return Err(ProtocolError::RateLimited);
    }
    ControlRequest::from_json(text).map_err(|e| ProtocolError::InvalidMessage {
        reason: e.to_string(),
    })
}

fn protocol_error(err: &ProtocolError) -> Outgoing {
    Outgoing::Event(ControlEvent::error(err.code(), err.to_string()))
}

async fn handle_socket(socket: WebSocket, relay: Arc<LobbyRelay>, code: String, params: AttachParams) {
    let (handle, request) = match prepare(&relay, &code, params).await {
        Ok(prepared) => prepared,
        Err(err) => {
            if err == ErrorCode::RateLimited {
                relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            }
            relay
                .metrics()
                .attach_rejections_total
                .fetch_add(1, Ordering::Relaxed);
            reject(socket, err).await;
            return;
        }
    };

    let conn = request.conn;
    let peer = request.peer_id.clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    if let Err(err) = handle.attach(request, tx.clone()).await {
        reject(socket, err).await;
        return;
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outgoing::Event(event) => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode control event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close(code) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Cow::Borrowed(""),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let idle = Duration::from_secs(relay.config().limits.idle_timeout_secs.max(1));
    loop {
        let message = match tokio::time::timeout(idle, stream.next()).await {
            Err(_) => {
                tracing::debug!("Conn {} idle, dropping", conn);
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => match decode_frame(&relay, &peer, &text) {
                Ok(request) => {
                    if !handle.request(conn, request).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!("Rejected frame from {}: {}", peer, err);
                    relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                    let _ = tx.send(protocol_error(&err));
                }
            },
            Message::Binary(_) => {
                relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                let _ = tx.send(protocol_error(&ProtocolError::BinaryFrame));
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    handle.detach(conn).await;
    drop(tx);
    let _ = tokio::time::timeout(Duration::from_secs(5), writer).await;
}
