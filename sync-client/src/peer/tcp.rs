//! Direct TCP peer links.
//!
//! The host listens on an ephemeral port per negotiation. Its offer carries
//! a one-time token and its candidates are `tcp:<ip>:<port>` strings. The
//! client dials each candidate as it arrives and presents the token as the
//! first frame; the first dial that completes the handshake becomes the
//! link.
//!
//! Frames are a 4-byte big-endian length followed by UTF-8 JSON.

use super::{LinkEvent, LinkEvents, PeerConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use sync_types::{DataMessage, PeerId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Largest accepted frame.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const OFFER_PREFIX: &str = "tcp-json/1;token=";
const ANSWER: &str = "tcp-json/1";
const CANDIDATE_PREFIX: &str = "tcp:";

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    token: String,
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", text.len()),
        ));
    }
    writer.write_u32(text.len() as u32).await?;
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

/// Read one length-prefixed frame; `None` on a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn random_token() -> Result<String, TransportError> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| TransportError::ConnectionFailed(format!("no randomness: {}", e)))?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Parse a `tcp:<ip>:<port>` candidate.
pub fn parse_candidate(candidate: &str) -> Result<SocketAddr, TransportError> {
    candidate
        .strip_prefix(CANDIDATE_PREFIX)
        .and_then(|addr| addr.parse().ok())
        .ok_or_else(|| TransportError::InvalidNegotiation(format!("bad candidate {}", candidate)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Listening,
    Dialing,
}

struct Slot {
    side: Side,
    token: String,
    events: LinkEvents,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

type Slots = Arc<Mutex<HashMap<PeerId, Slot>>>;

/// Lock the slot table, recovering from poisoning.
fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<PeerId, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`PeerConnector`] over plain TCP.
#[derive(Clone)]
pub struct TcpConnector {
    slots: Slots,
    bind_ip: IpAddr,
    advertise: Vec<IpAddr>,
    timeout: Duration,
}

impl TcpConnector {
    /// Listen and advertise on loopback.
    pub fn new() -> Self {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Listen on `ip`, advertising it unless it is unspecified.
    pub fn bind(ip: IpAddr) -> Self {
        let advertise = if ip.is_unspecified() {
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]
        } else {
            vec![ip]
        };
        Self {
            slots: Arc::default(),
            bind_ip: ip,
            advertise,
            timeout: Duration::from_secs(15),
        }
    }

    /// Advertise these addresses as candidates instead.
    pub fn with_advertise(mut self, ips: Vec<IpAddr>) -> Self {
        self.advertise = ips;
        self
    }

    /// How long a negotiation may take before the link is reported failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn track(&self, peer: &PeerId, task: JoinHandle<()>) {
        match lock(&self.slots).get_mut(peer) {
            Some(slot) => slot.tasks.push(task),
            None => task.abort(),
        }
    }

    fn abort_slot(slot: Slot) {
        for task in slot.tasks {
            task.abort();
        }
    }

    /// Start reader and writer tasks for an established stream.
    fn start_link(slots: &Slots, peer: PeerId, stream: TcpStream, events: LinkEvents) {
        let (mut read, mut write) = stream.into_split();
        let (sender, mut outgoing) = mpsc::unbounded_channel::<DataMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode data message: {}", e);
                        continue;
                    }
                };
                if write_frame(&mut write, &text).await.is_err() {
                    break;
                }
            }
            let _ = write.shutdown().await;
        });

        let reader_peer = peer.clone();
        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read).await {
                    Ok(Some(text)) => match DataMessage::from_json(&text) {
                        Ok(message) => {
                            let event = LinkEvent::Message {
                                peer: reader_peer.clone(),
                                message,
                            };
                            if reader_events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Dropping bad frame from {}: {}", reader_peer, e),
                    },
                    Ok(None) => {
                        let _ = reader_events.send(LinkEvent::Closed { peer: reader_peer });
                        break;
                    }
                    Err(e) => {
                        let _ = reader_events.send(LinkEvent::Failed {
                            peer: reader_peer,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
        });

        match lock(slots).get_mut(&peer) {
            Some(slot) => {
                slot.tasks.push(writer);
                slot.tasks.push(reader);
            }
            None => {
                writer.abort();
                reader.abort();
                return;
            }
        }
        let _ = events.send(LinkEvent::Opened { peer, sender });
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(
    slots: Slots,
    peer: PeerId,
    listener: TcpListener,
    token: String,
    connected: Arc<AtomicBool>,
    events: LinkEvents,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let accepted = tokio::time::timeout_at(deadline, listener.accept()).await;
        let mut stream = match accepted {
            Ok(Ok((stream, addr))) => {
                tracing::debug!("Link dial from {} for {}", addr, peer);
                stream
            }
            Ok(Err(e)) => {
                tracing::warn!("Accept failed for {}: {}", peer, e);
                continue;
            }
            Err(_) => {
                let _ = events.send(LinkEvent::Failed {
                    peer,
                    reason: "negotiation timed out".into(),
                });
                return;
            }
        };

        let hello = tokio::time::timeout_at(deadline, read_frame(&mut stream)).await;
        let presented = match hello {
            Ok(Ok(Some(text))) => serde_json::from_str::<Hello>(&text).ok(),
            _ => None,
        };
        if presented.map(|h| h.token == token).unwrap_or(false) {
            connected.store(true, Ordering::SeqCst);
            TcpConnector::start_link(&slots, peer, stream, events);
            return;
        }
        tracing::warn!("Rejected link dial for {} with a bad token", peer);
    }
}

async fn dial(
    slots: Slots,
    peer: PeerId,
    addr: SocketAddr,
    token: String,
    connected: Arc<AtomicBool>,
    events: LinkEvents,
    timeout: Duration,
) {
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!("Dial {} for {} failed: {}", addr, peer, e);
            return;
        }
        Err(_) => return,
    };
    let hello = match serde_json::to_string(&Hello { token }) {
        Ok(hello) => hello,
        Err(_) => return,
    };
    if write_frame(&mut stream, &hello).await.is_err() {
        return;
    }
    if connected
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        TcpConnector::start_link(&slots, peer, stream, events);
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    async fn offer(&self, peer: &PeerId, events: LinkEvents) -> Result<String, TransportError> {
        self.close(peer).await;

        let listener = TcpListener::bind(SocketAddr::new(self.bind_ip, 0))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
            .port();
        let token = random_token()?;
        let connected = Arc::new(AtomicBool::new(false));

        lock(&self.slots).insert(
            peer.clone(),
            Slot {
                side: Side::Listening,
                token: token.clone(),
                events: events.clone(),
                connected: connected.clone(),
                tasks: Vec::new(),
            },
        );

        let task = tokio::spawn(accept_loop(
            self.slots.clone(),
            peer.clone(),
            listener,
            token.clone(),
            connected,
            events.clone(),
            self.timeout,
        ));
        self.track(peer, task);

        for ip in &self.advertise {
            let candidate = format!("{}{}", CANDIDATE_PREFIX, SocketAddr::new(*ip, port));
            let _ = events.send(LinkEvent::Candidate {
                peer: peer.clone(),
                candidate,
            });
        }

        Ok(format!("{}{}", OFFER_PREFIX, token))
    }

    async fn answer(
        &self,
        peer: &PeerId,
        offer: &str,
        events: LinkEvents,
    ) -> Result<String, TransportError> {
        let token = offer
            .strip_prefix(OFFER_PREFIX)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransportError::InvalidNegotiation("unsupported offer".into()))?
            .to_string();
        self.close(peer).await;

        let connected = Arc::new(AtomicBool::new(false));
        lock(&self.slots).insert(
            peer.clone(),
            Slot {
                side: Side::Dialing,
                token,
                events: events.clone(),
                connected: connected.clone(),
                tasks: Vec::new(),
            },
        );

        let watchdog_peer = peer.clone();
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !connected.load(Ordering::SeqCst) {
                let _ = events.send(LinkEvent::Failed {
                    peer: watchdog_peer,
                    reason: "no candidate connected".into(),
                });
            }
        });
        self.track(peer, task);

        Ok(ANSWER.to_string())
    }

    async fn accept_answer(&self, peer: &PeerId, answer: &str) -> Result<(), TransportError> {
        if answer != ANSWER {
            return Err(TransportError::InvalidNegotiation(format!(
                "unsupported answer from {}",
                peer
            )));
        }
        Ok(())
    }

    async fn add_candidate(&self, peer: &PeerId, candidate: &str) -> Result<(), TransportError> {
        let addr = parse_candidate(candidate)?;
        let (token, connected, events) = {
            let slots = lock(&self.slots);
            match slots.get(peer) {
                Some(slot) if slot.side == Side::Dialing => {
                    (slot.token.clone(), slot.connected.clone(), slot.events.clone())
                }
                // The listening side has nothing to dial.
                _ => return Ok(()),
            }
        };
        if connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let task = tokio::spawn(dial(
            self.slots.clone(),
            peer.clone(),
            addr,
            token,
            connected,
            events,
            self.timeout,
        ));
        self.track(peer, task);
        Ok(())
    }

    async fn close(&self, peer: &PeerId) {
        let slot = lock(&self.slots).remove(peer);
        if let Some(slot) = slot {
            Self::abort_slot(slot);
        }
    }
}
