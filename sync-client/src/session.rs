//! Session orchestrator.
//!
//! One tokio task per device owns the control channel, the connection
//! state machine, the peer manager and the sync engine. Everything that
//! touches them arrives as a [`Step`] on that task, so there is exactly one
//! writer of the connection state and of the game store.
//!
//! ```text
//! SessionHandle ──commands──► SessionTask ◄── control frames (relay)
//!       ▲                        │  ▲
//!       └── watch / events ──────┘  └──── link events (peers)
//! ```
//!
//! The task feeds control-channel lifecycle into the pure
//! [`ConnectionState`] machine and executes the actions it returns.

use crate::api::{HttpLobbyApi, LobbyApi};
use crate::config::SessionConfig;
use crate::engine::{Delivery, EngineEvent, GameStore, SyncEngine};
use crate::error::{ClientError, Result, TransportError};
use crate::peer::{LinkEvent, LinkUpdate, PeerConnector, PeerManager, TcpConnector};
use crate::store::{MemorySessionStore, SavedSession, SessionStore};
use crate::transport::{AttachTarget, ControlConnector, ControlInbound, ControlLink, WsConnector};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{
    Action, ConnectionState, EndReason, Event, Failure, Lifecycle, CLOSE_NORMAL, CLOSE_REPLACED,
};
use sync_types::{
    now_millis, CloseReason, ControlEvent, ControlRequest, DataMessage, ErrorCode, GameSnapshot,
    LobbyCode, Member, PeerId, Role, SyncError,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The local user left, suspended or closed.
    Left,
    /// The host dropped without suspending.
    HostDisconnected,
    /// The host paused the lobby.
    HostSuspended,
    /// The lobby was closed.
    Closed(CloseReason),
    /// Connecting failed or retries ran out.
    Failed(Failure),
}

impl From<EndReason> for SessionEnd {
    fn from(reason: EndReason) -> Self {
        match reason {
            EndReason::HostDisconnected => SessionEnd::HostDisconnected,
            EndReason::HostSuspended => SessionEnd::HostSuspended,
            EndReason::Closed(reason) => SessionEnd::Closed(reason),
        }
    }
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// The control channel dropped; a retry is scheduled.
    Reconnecting {
        /// Retry number.
        attempt: u32,
        /// Delay before it runs.
        delay: Duration,
    },
    /// Local game state changed.
    SnapshotApplied(GameSnapshot),
    /// The host started the game.
    GameStarted,
    /// Members linked to the host changed.
    PeersChanged(Vec<Member>),
    /// The session is over; no further events follow.
    Ended(SessionEnd),
}

enum Command {
    Submit {
        action: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    StartGame {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<GameSnapshot>,
    },
    Suspend {
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        reply: oneshot::Sender<Result<()>>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Submit { .. } => "Submit",
            Command::StartGame { .. } => "StartGame",
            Command::Snapshot { .. } => "Snapshot",
            Command::Suspend { .. } => "Suspend",
            Command::Close { .. } => "Close",
            Command::Leave { .. } => "Leave",
        };
        f.write_str(name)
    }
}

/// Entry point for creating, resuming and joining sessions.
///
/// # Example
///
/// ```ignore
/// let session = Session::new(SessionConfig::new("http://relay:8787").with_display_name("Ada"));
/// let handle = session.create("Friday game", Box::new(my_store)).await?;
/// println!("share code {}", handle.code());
/// ```
#[derive(Clone)]
pub struct Session {
    config: SessionConfig,
    control: Arc<dyn ControlConnector>,
    peers: Arc<dyn PeerConnector>,
    sessions: Arc<dyn SessionStore>,
    api: Arc<dyn LobbyApi>,
}

impl Session {
    /// Create a session factory with the WebSocket control channel, TCP
    /// peer links, an in-memory session store and the relay's HTTP API.
    pub fn new(config: SessionConfig) -> Self {
        let api = HttpLobbyApi::new(&config.relay_url);
        Self {
            config,
            control: Arc::new(WsConnector::new()),
            peers: Arc::new(TcpConnector::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            api: Arc::new(api),
        }
    }

    /// Replace the control-channel connector.
    pub fn with_control_connector(mut self, control: Arc<dyn ControlConnector>) -> Self {
        self.control = control;
        self
    }

    /// Replace the peer connector.
    pub fn with_peer_connector(mut self, peers: Arc<dyn PeerConnector>) -> Self {
        self.peers = peers;
        self
    }

    /// Replace the session store.
    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Replace the lobby API.
    pub fn with_lobby_api(mut self, api: Arc<dyn LobbyApi>) -> Self {
        self.api = api;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a lobby and host it.
    ///
    /// Saves a new session record, then returns once the relay acknowledges
    /// the attach.
    pub async fn create(&self, name: &str, game: Box<dyn GameStore>) -> Result<SessionHandle> {
        let created = self.api.create_lobby(&self.config.credential, None).await?;
        let mut saved = SavedSession::new(name, created.created_at, game.current_snapshot());
        saved.lobby_code = Some(created.code.clone());
        self.sessions.put(saved.clone()).await?;
        tracing::info!("Created session {} as lobby {}", saved.id, created.code);

        let engine = SyncEngine::new(Role::Host, game, self.config.local_fields.clone());
        self.start(Role::Host, created.code, engine, Some(saved)).await
    }

    /// Resume a saved session as host.
    ///
    /// The game store is restored from the saved record before the device
    /// attaches, and the saved lobby code is reclaimed.
    pub async fn resume(&self, session_id: &str, mut game: Box<dyn GameStore>) -> Result<SessionHandle> {
        let mut saved = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ClientError::SessionNotFound(session_id.to_string()))?;
        game.restore_snapshot(saved.game_state.clone().into());

        let created = self
            .api
            .create_lobby(&self.config.credential, saved.lobby_code.as_ref())
            .await?;
        saved.lobby_code = Some(created.code.clone());
        self.sessions.put(saved.clone()).await?;
        tracing::info!("Resuming session {} as lobby {}", saved.id, created.code);

        let engine = SyncEngine::new(Role::Host, game, self.config.local_fields.clone());
        self.start(Role::Host, created.code, engine, Some(saved)).await
    }

    /// Join a lobby as a client.
    pub async fn join(&self, code: &LobbyCode, game: Box<dyn GameStore>) -> Result<SessionHandle> {
        let engine = SyncEngine::new(Role::Client, game, self.config.local_fields.clone());
        self.start(Role::Client, code.clone(), engine, None).await
    }

    async fn start(
        &self,
        role: Role,
        code: LobbyCode,
        engine: SyncEngine,
        saved: Option<SavedSession>,
    ) -> Result<SessionHandle> {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let session_id = saved.as_ref().map(|s| s.id.clone());
        let task = SessionTask {
            config: self.config.clone(),
            role,
            code: code.clone(),
            connector: self.control.clone(),
            sessions: self.sessions.clone(),
            saved,
            state: ConnectionState::Disconnected,
            state_tx,
            events: event_tx,
            control: None,
            connect_deadline: None,
            reconnect_at: None,
            peers: PeerManager::new(self.peers.clone(), link_tx),
            link_events: link_rx,
            engine,
            roster: Vec::new(),
            commands: command_rx,
            ready: Some(ready_tx),
            finished: false,
        };
        tokio::spawn(task.run());

        match ready_rx.await {
            Ok(Ok(())) => Ok(SessionHandle {
                commands: command_tx,
                state: state_rx,
                events: event_rx,
                code,
                role,
                peer_id: self.config.peer_id.clone(),
                session_id,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::SessionEnded),
        }
    }
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    code: LobbyCode,
    role: Role,
    peer_id: PeerId,
    session_id: Option<String>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ClientError::SessionEnded)?;
        rx.await.map_err(|_| ClientError::SessionEnded)
    }

    /// Submit a game action.
    ///
    /// The host applies it and broadcasts; a client forwards it to the host
    /// and sees the effect with the next snapshot.
    pub async fn submit(&self, action: Value) -> Result<()> {
        self.request(|reply| Command::Submit { action, reply }).await?
    }

    /// Start the game (host only).
    pub async fn start_game(&self) -> Result<()> {
        self.request(|reply| Command::StartGame { reply }).await?
    }

    /// Current local game state.
    pub async fn snapshot(&self) -> Result<GameSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Pause the lobby and detach (host only).
    pub async fn suspend(&self) -> Result<()> {
        self.request(|reply| Command::Suspend { reply }).await?
    }

    /// End the lobby for everyone (host only).
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close { reply }).await?
    }

    /// Leave the session. Leaving an ended session is a no-op.
    pub async fn leave(&self) -> Result<()> {
        match self.request(|reply| Command::Leave { reply }).await {
            Ok(result) => result,
            Err(ClientError::SessionEnded) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Session notifications.
    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<SessionEvent> {
        &mut self.events
    }

    /// Next session notification; `None` once the session task is gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Lobby code.
    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    /// This device's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// This device's peer id.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Saved session id (host only).
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

enum Step {
    Command(Option<Command>),
    Control(ControlInbound),
    Link(LinkUpdate),
    ReconnectTimer,
    ConnectTimeout,
    Heartbeat,
}

struct SessionTask {
    config: SessionConfig,
    role: Role,
    code: LobbyCode,
    connector: Arc<dyn ControlConnector>,
    sessions: Arc<dyn SessionStore>,
    saved: Option<SavedSession>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    control: Option<ControlLink>,
    connect_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    peers: PeerManager,
    link_events: mpsc::UnboundedReceiver<LinkUpdate>,
    engine: SyncEngine,
    roster: Vec<Member>,
    commands: mpsc::Receiver<Command>,
    ready: Option<oneshot::Sender<Result<()>>>,
    finished: bool,
}

async fn recv_control(control: &mut Option<ControlLink>) -> ControlInbound {
    match control {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn failure_for(code: ErrorCode, message: &str) -> Failure {
    match code {
        ErrorCode::LobbyNotFound => Failure::NotFound,
        ErrorCode::LobbyFull => Failure::Full,
        ErrorCode::Unauthorized | ErrorCode::NotHost => Failure::Unauthorized,
        ErrorCode::LobbySuspended => Failure::Suspended,
        other => Failure::Transport(format!("{}: {}", other, message)),
    }
}

fn failure_error(failure: Failure) -> ClientError {
    match failure {
        Failure::Transport(reason) => TransportError::ConnectionFailed(reason).into(),
        other => SyncError::from(other).into(),
    }
}

impl SessionTask {
    async fn run(mut self) {
        let period = self.config.heartbeat_interval.max(Duration::from_millis(10));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.dispatch(Event::JoinRequested).await;

        while !self.finished {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                frame = recv_control(&mut self.control) => Step::Control(frame),
                Some(event) = self.link_events.recv() => Step::Link(event),
                _ = sleep_until(self.reconnect_at) => Step::ReconnectTimer,
                _ = sleep_until(self.connect_deadline) => Step::ConnectTimeout,
                _ = heartbeat.tick() => Step::Heartbeat,
            };

            match step {
                Step::Command(Some(command)) => self.on_command(command).await,
                Step::Command(None) => {
                    tracing::debug!("All session handles dropped, leaving");
                    if let Err(e) = self.save().await {
                        tracing::warn!("Failed to save session: {}", e);
                    }
                    self.dispatch(Event::LeaveRequested).await;
                    self.finished = true;
                }
                Step::Control(frame) => self.on_control(frame).await,
                Step::Link(event) => self.on_link_event(event).await,
                Step::ReconnectTimer => {
                    self.reconnect_at = None;
                    self.dispatch(Event::ReconnectTimer).await;
                }
                Step::ConnectTimeout => {
                    tracing::warn!("Relay did not acknowledge attach to {}", self.code);
                    self.drop_control();
                    self.dispatch(Event::ConnectFailed {
                        failure: Failure::Timeout,
                    })
                    .await;
                }
                Step::Heartbeat => self.heartbeat(),
            }
        }

        tracing::debug!("Session task for {} finished", self.code);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn drop_control(&mut self) {
        self.connect_deadline = None;
        if let Some(link) = self.control.take() {
            link.close();
        }
    }

    /// Feed an event through the state machine, then every follow-up event
    /// its actions produce.
    async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let (next, actions) = self.state.on_event(event, &self.config.reconnect);
            if next != self.state {
                tracing::info!("Connection state: {} -> {}", self.state.name(), next.name());
                self.state = next;
                self.state_tx.send_replace(next);
                self.emit(SessionEvent::StateChanged(next));
            }
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::OpenChannel => {
                let target = AttachTarget {
                    relay_url: self.config.relay_url.clone(),
                    code: self.code.clone(),
                    peer_id: self.config.peer_id.clone(),
                    display_name: self.config.display_name.clone(),
                    avatar_ref: self.config.avatar_ref.clone(),
                    role: self.role,
                    token: self.config.credential.clone(),
                };
                let connector = self.connector.clone();
                let opened =
                    tokio::time::timeout(self.config.connect_timeout, connector.open(&target)).await;
                match opened {
                    Ok(Ok(link)) => {
                        self.control = Some(link);
                        self.connect_deadline = Some(Instant::now() + self.config.connect_timeout);
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Control channel to {} failed: {}", self.code, e);
                        Some(Event::ConnectFailed {
                            failure: Failure::Transport(e.to_string()),
                        })
                    }
                    Err(_) => Some(Event::ConnectFailed {
                        failure: Failure::Timeout,
                    }),
                }
            }
            Action::CloseChannel => {
                self.drop_control();
                None
            }
            Action::TeardownLinks => {
                self.peers.teardown().await;
                self.roster.clear();
                None
            }
            Action::StartReconnectTimer { delay } => {
                self.reconnect_at = Some(Instant::now() + delay);
                None
            }
            Action::CancelReconnect => {
                self.reconnect_at = None;
                None
            }
            Action::Emit(lifecycle) => {
                self.on_lifecycle(lifecycle);
                None
            }
        }
    }

    fn on_lifecycle(&mut self, lifecycle: Lifecycle) {
        match lifecycle {
            Lifecycle::Connected => {
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Lifecycle::Reconnecting { attempt, delay } => {
                tracing::info!("Reconnecting to {} in {:?} (attempt {})", self.code, delay, attempt);
                self.emit(SessionEvent::Reconnecting { attempt, delay });
            }
            Lifecycle::Failed { failure } => {
                tracing::warn!("Session {} failed: {:?}", self.code, failure);
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Err(failure_error(failure.clone())));
                }
                self.finish(SessionEnd::Failed(failure));
            }
            Lifecycle::Left => self.finish(SessionEnd::Left),
            Lifecycle::Ended { reason } => {
                tracing::info!("Session {} ended: {:?}", self.code, reason);
                self.finish(reason.into());
            }
        }
    }

    fn finish(&mut self, end: SessionEnd) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(ClientError::SessionEnded));
        }
        self.emit(SessionEvent::Ended(end));
        self.finished = true;
    }

    async fn save(&mut self) -> Result<()> {
        if self.role != Role::Host {
            return Ok(());
        }
        let Some(saved) = self.saved.as_mut() else {
            return Ok(());
        };
        saved.game_state = self.engine.snapshot().into();
        self.sessions.put(saved.clone()).await?;
        tracing::info!("Saved session {}", saved.id);
        Ok(())
    }

    fn send_control(&self, request: ControlRequest) {
        match &self.control {
            Some(link) => {
                if let Err(e) = link.send(request) {
                    tracing::debug!("Control send failed: {}", e);
                }
            }
            None => tracing::debug!("No control channel for {:?}", request),
        }
    }

    /// Returns how many messages were handed to a link.
    fn deliver(&self, deliveries: Vec<Delivery>) -> usize {
        deliveries
            .into_iter()
            .map(|delivery| match delivery {
                Delivery::To(peer, message) => usize::from(self.peers.send(&peer, &message)),
                Delivery::Broadcast(message) => self.peers.broadcast(&message),
            })
            .sum()
    }

    /// The host and every member with an open link.
    fn linked_roster(&self) -> Vec<Member> {
        let open = self.peers.open_peers();
        self.roster
            .iter()
            .filter(|m| m.is_host || open.contains(&m.peer_id))
            .cloned()
            .collect()
    }

    fn announce_peers(&self) {
        let roster = self.linked_roster();
        if let Some(delivery) = self.engine.peer_update(roster.clone()) {
            self.deliver(vec![delivery]);
        }
        self.emit(SessionEvent::PeersChanged(roster));
    }

    fn heartbeat(&self) {
        if !self.state.is_connected() {
            return;
        }
        self.send_control(ControlRequest::Ping);
        if let Some(host) = self.engine.host() {
            if self.role == Role::Client {
                self.peers.send(host, &DataMessage::Ping { t: now_millis() });
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { action, reply } => {
                let _ = reply.send(self.submit(action));
            }
            Command::StartGame { reply } => {
                let result = self.engine.start_game().map(|deliveries| {
                    self.deliver(deliveries);
                    self.emit(SessionEvent::SnapshotApplied(self.engine.snapshot()));
                    self.emit(SessionEvent::GameStarted);
                });
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.engine.snapshot());
            }
            Command::Suspend { reply } => {
                if self.role != Role::Host {
                    let _ = reply.send(Err(ClientError::NotHost));
                    return;
                }
                tracing::info!("Suspending lobby {}", self.code);
                self.send_control(ControlRequest::Suspend);
                let saved = self.save().await;
                self.dispatch(Event::LeaveRequested).await;
                let _ = reply.send(saved);
            }
            Command::Close { reply } => {
                if self.role != Role::Host {
                    let _ = reply.send(Err(ClientError::NotHost));
                    return;
                }
                tracing::info!("Closing lobby {}", self.code);
                self.peers.broadcast(&DataMessage::LobbyClosed {
                    reason: CloseReason::HostClosed,
                });
                self.send_control(ControlRequest::Close);
                let saved = self.save().await;
                self.dispatch(Event::LeaveRequested).await;
                let _ = reply.send(saved);
            }
            Command::Leave { reply } => {
                if self.role == Role::Host {
                    self.peers.broadcast(&DataMessage::LobbyClosed {
                        reason: CloseReason::HostLeft,
                    });
                }
                let saved = self.save().await;
                self.dispatch(Event::LeaveRequested).await;
                self.finished = true;
                let _ = reply.send(saved);
            }
        }
    }

    fn submit(&mut self, action: Value) -> Result<()> {
        if !self.state.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let deliveries = self.engine.submit(action)?;
        let sent = self.deliver(deliveries);
        match self.role {
            Role::Host => {
                self.emit(SessionEvent::SnapshotApplied(self.engine.snapshot()));
                Ok(())
            }
            Role::Client if sent == 0 => Err(ClientError::NotConnected),
            Role::Client => Ok(()),
        }
    }

    async fn on_control(&mut self, frame: ControlInbound) {
        match frame {
            ControlInbound::Event(event) => self.on_control_event(event).await,
            ControlInbound::Closed { code } => {
                tracing::info!("Control channel for {} closed ({:?})", self.code, code);
                self.control = None;
                self.connect_deadline = None;
                let rejected = code.and_then(ErrorCode::from_close_code);
                match rejected {
                    Some(error) if matches!(self.state, ConnectionState::Connecting { .. }) => {
                        self.dispatch(Event::ConnectFailed {
                            failure: failure_for(error, "attach rejected"),
                        })
                        .await;
                    }
                    _ => {
                        let normal = matches!(code, Some(CLOSE_NORMAL) | Some(CLOSE_REPLACED));
                        self.dispatch(Event::ChannelClosed { normal }).await;
                    }
                }
            }
        }
    }

    async fn on_control_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Joined {
                roster,
                your_id,
                is_host,
                host_id,
            } => {
                tracing::info!(
                    "Joined {} as {} ({} members)",
                    self.code,
                    your_id,
                    roster.len()
                );
                if is_host != (self.role == Role::Host) {
                    tracing::warn!("Relay role for {} disagrees with requested role", your_id);
                }
                self.connect_deadline = None;
                self.roster = roster;
                if self.role == Role::Client {
                    self.engine.set_host(host_id);
                }
                self.dispatch(Event::ChannelOpened).await;
            }
            ControlEvent::Error { code, message } => {
                if self.connect_deadline.is_some() {
                    tracing::warn!("Attach to {} rejected: {} ({})", self.code, code, message);
                    self.drop_control();
                    self.dispatch(Event::ConnectFailed {
                        failure: failure_for(code, &message),
                    })
                    .await;
                } else {
                    tracing::warn!("Relay error: {} ({})", code, message);
                }
            }
            ControlEvent::PeerJoined {
                peer_id,
                display_name,
                avatar_ref,
            } => {
                if self.role != Role::Host {
                    return;
                }
                tracing::info!("{} ({}) joined {}", display_name, peer_id, self.code);
                self.roster.retain(|m| m.peer_id != peer_id);
                self.roster.push(Member {
                    peer_id: peer_id.clone(),
                    display_name,
                    avatar_ref,
                    is_host: false,
                });
                match self.peers.on_peer_joined(&peer_id).await {
                    Ok(offer) => self.send_control(offer),
                    Err(e) => tracing::warn!("Could not offer a link to {}: {}", peer_id, e),
                }
            }
            ControlEvent::PeerLeft { peer_id } => {
                tracing::info!("{} left {}", peer_id, self.code);
                self.roster.retain(|m| m.peer_id != peer_id);
                self.peers.remove(&peer_id).await;
                self.announce_peers();
            }
            ControlEvent::HostDisconnected => {
                self.dispatch(Event::Terminated {
                    reason: EndReason::HostDisconnected,
                })
                .await;
            }
            ControlEvent::HostSuspended => {
                self.dispatch(Event::Terminated {
                    reason: EndReason::HostSuspended,
                })
                .await;
            }
            ControlEvent::LobbyClosed { reason } => {
                self.dispatch(Event::Terminated {
                    reason: EndReason::Closed(reason),
                })
                .await;
            }
            ControlEvent::OfferReceived { from_peer_id, sdp } => {
                if self.role != Role::Client || self.engine.host() != Some(&from_peer_id) {
                    tracing::warn!("Ignoring offer from non-host {}", from_peer_id);
                    return;
                }
                match self.peers.on_offer(&from_peer_id, &sdp).await {
                    Ok(answer) => self.send_control(answer),
                    Err(e) => tracing::warn!("Could not answer {}: {}", from_peer_id, e),
                }
            }
            ControlEvent::AnswerReceived { from_peer_id, sdp } => {
                if let Err(e) = self.peers.on_answer(&from_peer_id, &sdp).await {
                    tracing::warn!("Bad answer from {}: {}", from_peer_id, e);
                    self.peers.remove(&from_peer_id).await;
                }
            }
            ControlEvent::IceCandidateReceived {
                from_peer_id,
                candidate,
            } => {
                if let Err(e) = self.peers.on_candidate(&from_peer_id, &candidate).await {
                    tracing::warn!("Bad candidate from {}: {}", from_peer_id, e);
                }
            }
            ControlEvent::Pong => {}
            ControlEvent::Unknown => tracing::debug!("Ignoring unknown control event"),
        }
    }

    async fn on_link_event(&mut self, update: LinkUpdate) {
        let LinkUpdate { link, event } = update;
        match event {
            LinkEvent::Candidate { peer, candidate } => {
                if let Some(request) = self.peers.local_candidate(&peer, link, candidate) {
                    self.send_control(request);
                }
            }
            LinkEvent::Opened { peer, sender } => {
                if !self.peers.link_opened(&peer, link, sender) {
                    return;
                }
                let deliveries = self.engine.link_opened(&peer);
                self.deliver(deliveries);
                if self.role == Role::Host {
                    self.announce_peers();
                }
            }
            LinkEvent::Message { peer, message } => {
                if !self.peers.is_current(&peer, link) {
                    tracing::debug!("Dropping message from replaced link to {}", peer);
                    return;
                }
                let was_action = matches!(message, DataMessage::Action { .. });
                let output = self.engine.on_message(&peer, message);
                self.deliver(output.deliveries);
                match output.event {
                    Some(EngineEvent::SnapshotApplied { .. }) => {
                        self.emit(SessionEvent::SnapshotApplied(self.engine.snapshot()));
                    }
                    Some(EngineEvent::GameStarted) => self.emit(SessionEvent::GameStarted),
                    Some(EngineEvent::PeersChanged { roster }) => {
                        self.emit(SessionEvent::PeersChanged(roster));
                    }
                    Some(EngineEvent::Closed { reason }) => {
                        self.dispatch(Event::Terminated {
                            reason: EndReason::Closed(reason),
                        })
                        .await;
                    }
                    None if was_action && self.role == Role::Host => {
                        self.emit(SessionEvent::SnapshotApplied(self.engine.snapshot()));
                    }
                    None => {}
                }
            }
            LinkEvent::Closed { peer } => {
                if let Some(was_open) = self.peers.remove_link(&peer, link).await {
                    tracing::info!("Link to {} closed", peer);
                    if was_open && self.role == Role::Host {
                        self.announce_peers();
                    }
                }
            }
            LinkEvent::Failed { peer, reason } => {
                if let Some(was_open) = self.peers.remove_link(&peer, link).await {
                    tracing::warn!("Link to {} failed: {}", peer, reason);
                    if was_open && self.role == Role::Host {
                        self.announce_peers();
                    }
                }
            }
        }
    }
}
