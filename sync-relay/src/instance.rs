//! One running lobby.
//!
//! Each lobby is a tokio task that owns its [`Lobby`] roster and the
//! outbound senders of its attached connections. Everything that touches
//! the roster arrives as a command on the task's queue and is handled to
//! completion before the next one, so attach, relay, detach, suspend, and
//! close never interleave.

use crate::server::{now_secs, RelayMetrics};
use crate::storage::{LobbyStorage, SqliteStorage};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sync_core::{AttachRequest, ConnId, Effects, Lobby, LobbyRecord, Outbound};
use sync_types::{ControlEvent, ControlRequest, ErrorCode, LobbyCode, LobbyInfo};
use tokio::sync::{mpsc, oneshot};

/// Depth of a lobby's command queue.
const COMMAND_QUEUE: usize = 256;

/// Something to write to one control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Send a control event as a text frame.
    Event(ControlEvent),
    /// Send a close frame with this code and stop writing.
    Close(u16),
}

/// Sender half feeding one connection's writer.
pub type OutgoingTx = mpsc::UnboundedSender<Outgoing>;

enum Command {
    Attach {
        req: AttachRequest,
        tx: OutgoingTx,
        reply: oneshot::Sender<Result<(), ErrorCode>>,
    },
    Request {
        conn: ConnId,
        request: ControlRequest,
    },
    Detach {
        conn: ConnId,
    },
    Info {
        reply: oneshot::Sender<LobbyInfo>,
    },
    Record {
        reply: oneshot::Sender<LobbyRecord>,
    },
    Expire {
        now: u64,
        idle_ttl_secs: u64,
        suspended_ttl_secs: u64,
        reply: oneshot::Sender<bool>,
    },
}

/// Cheap, cloneable address of a running lobby.
#[derive(Clone)]
pub struct LobbyHandle {
    id: u64,
    code: LobbyCode,
    tx: mpsc::Sender<Command>,
    members: Arc<AtomicUsize>,
}

impl std::fmt::Debug for LobbyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyHandle")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("members", &self.member_count())
            .finish()
    }
}

impl LobbyHandle {
    /// Lobby code.
    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    /// Attached members as of the last processed command.
    pub fn member_count(&self) -> usize {
        self.members.load(Ordering::Relaxed)
    }

    /// Attach a connection whose frames go to `tx`.
    ///
    /// A lobby that stops before answering reads as not found.
    pub async fn attach(&self, req: AttachRequest, tx: OutgoingTx) -> Result<(), ErrorCode> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Attach { req, tx, reply })
            .await
            .map_err(|_| ErrorCode::LobbyNotFound)?;
        rx.await.unwrap_or(Err(ErrorCode::LobbyNotFound))
    }

    /// Deliver a decoded request from an attached connection.
    ///
    /// Returns false if the lobby is gone.
    pub async fn request(&self, conn: ConnId, request: ControlRequest) -> bool {
        self.tx
            .send(Command::Request { conn, request })
            .await
            .is_ok()
    }

    /// Report that a connection closed.
    pub async fn detach(&self, conn: ConnId) {
        let _ = self.tx.send(Command::Detach { conn }).await;
    }

    /// Roster and metadata, or `None` if the lobby is gone.
    pub async fn info(&self) -> Option<LobbyInfo> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Info { reply }).await.ok()?;
        rx.await.ok()
    }

    /// The lobby record, or `None` if the lobby is gone.
    pub async fn record(&self) -> Option<LobbyRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Record { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Destroy the lobby if it is empty and past its TTL: `idle_ttl_secs`
    /// since creation if never attached, `suspended_ttl_secs` since the
    /// suspend otherwise.
    ///
    /// Returns true if it was destroyed.
    pub async fn expire(&self, now: u64, idle_ttl_secs: u64, suspended_ttl_secs: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Expire {
                now,
                idle_ttl_secs,
                suspended_ttl_secs,
                reply,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Shared state every lobby task needs.
#[derive(Clone)]
pub(crate) struct InstanceContext {
    pub registry: Arc<DashMap<LobbyCode, LobbyHandle>>,
    pub storage: Arc<SqliteStorage>,
    pub metrics: Arc<RelayMetrics>,
}

/// Start a lobby task.
///
/// With `persist` set, the record is written to storage before the first
/// command is handled.
pub(crate) fn spawn(id: u64, lobby: Lobby, persist: bool, ctx: InstanceContext) -> LobbyHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let handle = LobbyHandle {
        id,
        code: lobby.code().clone(),
        tx,
        members: Arc::new(AtomicUsize::new(lobby.member_count())),
    };

    let instance = Instance {
        id,
        lobby,
        conns: HashMap::new(),
        members: handle.members.clone(),
        ctx,
    };
    tokio::spawn(instance.run(rx, persist));
    handle
}

struct Instance {
    id: u64,
    lobby: Lobby,
    conns: HashMap<ConnId, OutgoingTx>,
    members: Arc<AtomicUsize>,
    ctx: InstanceContext,
}

impl Instance {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, persist: bool) {
        let code = self.lobby.code().clone();
        if persist {
            self.persist().await;
        }
        tracing::debug!("Lobby {} task started", code);

        while let Some(cmd) = rx.recv().await {
            if self.handle(cmd).await {
                break;
            }
        }

        let id = self.id;
        self.ctx.registry.remove_if(&code, |_, h| h.id == id);
        tracing::info!("Lobby {} destroyed", code);
    }

    /// Handle one command. Returns true once the lobby is destroyed.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Attach { req, tx, reply } => {
                let conn = req.conn;
                let peer = req.peer_id.clone();
                let role = req.role;
                match self.lobby.attach(req) {
                    Ok(fx) => {
                        self.conns.insert(conn, tx);
                        self.ctx.metrics.attaches_total.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            "Attach: peer={:?} role={} lobby={} (members: {})",
                            peer,
                            role.as_str(),
                            self.lobby.code(),
                            self.lobby.member_count()
                        );
                        let _ = reply.send(Ok(()));
                        self.apply(fx).await
                    }
                    Err(code) => {
                        self.ctx
                            .metrics
                            .attach_rejections_total
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            "Attach rejected: peer={:?} lobby={} code={}",
                            peer,
                            self.lobby.code(),
                            code
                        );
                        let _ = reply.send(Err(code));
                        false
                    }
                }
            }
            Command::Request { conn, request } => match self.lobby.handle(conn, request) {
                Ok(fx) => {
                    let relayed = fx
                        .outbound
                        .iter()
                        .filter(|o| matches!(o, Outbound::Send { event, .. } if is_relayed(event)))
                        .count();
                    if relayed > 0 {
                        self.ctx
                            .metrics
                            .messages_relayed_total
                            .fetch_add(relayed as u64, Ordering::Relaxed);
                        tracing::debug!("Relayed negotiation envelope in lobby {}", self.lobby.code());
                    }
                    self.apply(fx).await
                }
                Err(code) => {
                    self.ctx.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Rejected request from conn {} in lobby {}: {}",
                        conn,
                        self.lobby.code(),
                        code
                    );
                    if let Some(tx) = self.conns.get(&conn) {
                        let _ = tx.send(Outgoing::Event(ControlEvent::error(
                            code,
                            rejection_message(code),
                        )));
                    }
                    false
                }
            },
            Command::Detach { conn } => {
                self.conns.remove(&conn);
                let fx = self.lobby.detach(conn, now_secs());
                tracing::info!(
                    "Detach: conn={} lobby={} (members: {})",
                    conn,
                    self.lobby.code(),
                    self.lobby.member_count()
                );
                self.apply(fx).await
            }
            Command::Info { reply } => {
                let _ = reply.send(self.lobby.info());
                false
            }
            Command::Record { reply } => {
                let _ = reply.send(self.lobby.record().clone());
                false
            }
            Command::Expire {
                now,
                idle_ttl_secs,
                suspended_ttl_secs,
                reply,
            } => {
                let expired = self
                    .lobby
                    .is_expired(now, idle_ttl_secs, suspended_ttl_secs);
                let _ = reply.send(expired);
                if expired {
                    tracing::info!("Lobby {} expired", self.lobby.code());
                    self.apply(Effects {
                        destroyed: true,
                        ..Effects::default()
                    })
                    .await
                } else {
                    false
                }
            }
        }
    }

    async fn apply(&mut self, fx: Effects) -> bool {
        for out in fx.outbound {
            match out {
                Outbound::Send { conn, event } => {
                    if let Some(tx) = self.conns.get(&conn) {
                        let _ = tx.send(Outgoing::Event(event));
                    }
                }
                Outbound::Close { conn, code } => {
                    if let Some(tx) = self.conns.remove(&conn) {
                        let _ = tx.send(Outgoing::Close(code));
                    }
                }
            }
        }
        self.members
            .store(self.lobby.member_count(), Ordering::Relaxed);

        if fx.destroyed {
            self.ctx
                .metrics
                .lobbies_destroyed_total
                .fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.ctx.storage.delete_lobby(self.lobby.code()).await {
                tracing::error!("Failed to delete lobby {}: {}", self.lobby.code(), e);
            }
            return true;
        }
        if fx.record_changed {
            self.persist().await;
        }
        false
    }

    async fn persist(&self) {
        if let Err(e) = self.ctx.storage.put_lobby(self.lobby.record()).await {
            tracing::error!("Failed to persist lobby {}: {}", self.lobby.code(), e);
        }
    }
}

fn is_relayed(event: &ControlEvent) -> bool {
    matches!(
        event,
        ControlEvent::OfferReceived { .. }
            | ControlEvent::AnswerReceived { .. }
            | ControlEvent::IceCandidateReceived { .. }
    )
}

/// Human-readable text for a per-member rejection.
pub fn rejection_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::LobbyNotFound => "no lobby with that code",
        ErrorCode::LobbyFull => "lobby is full",
        ErrorCode::LobbySuspended => "the host has paused this lobby",
        ErrorCode::Unauthorized => "credential rejected",
        ErrorCode::NotHost => "only the host may do that",
        ErrorCode::InvalidMessage => "invalid message",
        ErrorCode::AlreadyInitialized => "lobby already initialized",
        ErrorCode::RateLimited => "slow down",
    }
}
