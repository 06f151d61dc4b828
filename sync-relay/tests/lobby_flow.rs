//! End-to-end control-channel tests against a relay on a local port.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sync_types::{CloseReason, ControlEvent, ControlRequest, ErrorCode, Identity, LobbyCode, PeerId};
use tablesync_relay::{Config, LobbyRelay, OpenVerifier, SqliteStorage};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay() -> (SocketAddr, Arc<LobbyRelay>) {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let relay = Arc::new(LobbyRelay::new(
        Config::default(),
        storage,
        Arc::new(OpenVerifier::new(3600)),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = relay.clone();
    tokio::spawn(async move {
        let _ = tablesync_relay::serve(listener, serving).await;
    });
    (addr, relay)
}

async fn attach(addr: SocketAddr, code: &LobbyCode, peer: &str, role: &str, token: &str) -> Socket {
    let url = format!(
        "ws://{}/lobbies/{}/ws?peerId={}&displayName={}&role={}&token={}",
        addr, code, peer, peer, role, token
    );
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next control event, skipping transport-level frames.
async fn next_event(socket: &mut Socket) -> Option<ControlEvent> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .ok()??
            .ok()?;
        match message {
            Message::Text(text) => return ControlEvent::from_json(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Read until the close frame and return its code.
async fn close_code(socket: &mut Socket) -> Option<u16> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Close(frame) = message {
            return frame.map(|f| u16::from(f.code));
        }
    }
}

async fn send(socket: &mut Socket, request: ControlRequest) {
    socket
        .send(Message::Text(request.to_json().unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn host_and_client_exchange_negotiation() {
    let (addr, relay) = start_relay().await;
    let record = relay
        .create_lobby(&Identity::user("alice"), None)
        .await
        .unwrap();

    let mut host = attach(addr, &record.code, "host-1", "host", "alice").await;
    match next_event(&mut host).await {
        Some(ControlEvent::Joined { is_host, roster, .. }) => {
            assert!(is_host);
            assert_eq!(roster.len(), 1);
        }
        other => panic!("expected Joined, got {:?}", other),
    }

    let mut client = attach(addr, &record.code, "bob", "client", "bob").await;
    match next_event(&mut client).await {
        Some(ControlEvent::Joined {
            is_host, host_id, ..
        }) => {
            assert!(!is_host);
            assert_eq!(host_id, Some(PeerId::new("host-1")));
        }
        other => panic!("expected Joined, got {:?}", other),
    }
    match next_event(&mut host).await {
        Some(ControlEvent::PeerJoined { peer_id, .. }) => assert_eq!(peer_id, PeerId::new("bob")),
        other => panic!("expected PeerJoined, got {:?}", other),
    }

    send(
        &mut host,
        ControlRequest::Offer {
            target_peer_id: PeerId::new("bob"),
            sdp: "offer-blob".into(),
        },
    )
    .await;
    assert_eq!(
        next_event(&mut client).await,
        Some(ControlEvent::OfferReceived {
            from_peer_id: PeerId::new("host-1"),
            sdp: "offer-blob".into(),
        })
    );

    send(&mut client, ControlRequest::Ping).await;
    assert_eq!(next_event(&mut client).await, Some(ControlEvent::Pong));
}

#[tokio::test]
async fn unknown_lobby_is_rejected_in_band() {
    let (addr, _relay) = start_relay().await;
    let code = LobbyCode::parse("ZZZ999").unwrap();
    let mut client = attach(addr, &code, "bob", "client", "bob").await;

    match next_event(&mut client).await {
        Some(ControlEvent::Error { code, .. }) => assert_eq!(code, ErrorCode::LobbyNotFound),
        other => panic!("expected Error, got {:?}", other),
    }
    assert_eq!(
        close_code(&mut client).await,
        Some(ErrorCode::LobbyNotFound.close_code())
    );
}

#[tokio::test]
async fn host_role_requires_owner_identity() {
    let (addr, relay) = start_relay().await;
    let record = relay
        .create_lobby(&Identity::user("alice"), None)
        .await
        .unwrap();

    let mut impostor = attach(addr, &record.code, "mallory", "host", "mallory").await;
    match next_event(&mut impostor).await {
        Some(ControlEvent::Error { code, .. }) => assert_eq!(code, ErrorCode::Unauthorized),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn host_close_ends_lobby_for_everyone() {
    let (addr, relay) = start_relay().await;
    let record = relay
        .create_lobby(&Identity::user("alice"), None)
        .await
        .unwrap();

    let mut host = attach(addr, &record.code, "host-1", "host", "alice").await;
    next_event(&mut host).await.unwrap();
    let mut client = attach(addr, &record.code, "bob", "client", "bob").await;
    next_event(&mut client).await.unwrap();
    next_event(&mut host).await.unwrap();

    send(&mut host, ControlRequest::Close).await;
    assert_eq!(
        next_event(&mut client).await,
        Some(ControlEvent::LobbyClosed {
            reason: CloseReason::HostClosed,
        })
    );

    for _ in 0..50 {
        if relay.lobby(&record.code).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(relay.lobby(&record.code).is_none());
}

#[tokio::test]
async fn suspended_lobby_survives_host_detach() {
    let (addr, relay) = start_relay().await;
    let record = relay
        .create_lobby(&Identity::user("alice"), None)
        .await
        .unwrap();

    let mut host = attach(addr, &record.code, "host-1", "host", "alice").await;
    next_event(&mut host).await.unwrap();
    let mut client = attach(addr, &record.code, "bob", "client", "bob").await;
    next_event(&mut client).await.unwrap();

    send(&mut host, ControlRequest::Suspend).await;
    assert_eq!(
        next_event(&mut client).await,
        Some(ControlEvent::HostSuspended)
    );
    host.close(None).await.unwrap();
    assert_eq!(close_code(&mut client).await, Some(1000));

    let mut suspended = false;
    for _ in 0..50 {
        if let Some(info) = relay.info(&record.code).await {
            if info.suspended {
                suspended = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(suspended);

    let mut late = attach(addr, &record.code, "carol", "client", "carol").await;
    match next_event(&mut late).await {
        Some(ControlEvent::Error { code, .. }) => assert_eq!(code, ErrorCode::LobbySuspended),
        other => panic!("expected Error, got {:?}", other),
    }

    let mut host = attach(addr, &record.code, "host-1", "host", "alice").await;
    match next_event(&mut host).await {
        Some(ControlEvent::Joined { is_host, .. }) => assert!(is_host),
        other => panic!("expected Joined, got {:?}", other),
    }
}
