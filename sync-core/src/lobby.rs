//! Lobby roster state machine.
//!
//! One [`Lobby`] backs one signaling-relay instance. Every operation takes
//! the current roster plus an input and returns [`Effects`]: frames to send,
//! connections to close, and whether the lobby record changed or the lobby
//! is gone. The relay owns the sockets and the task that serializes calls;
//! this module owns the rules.

use serde::{Deserialize, Serialize};
use sync_types::{
    CloseReason, ControlEvent, ControlRequest, ErrorCode, LobbyCode, LobbyInfo, Member, PeerId,
    Role,
};

/// Relay-assigned id of one control-channel connection.
pub type ConnId = u64;

/// Close code for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent to a connection evicted by a newer one with the same peer id.
pub const CLOSE_REPLACED: u16 = 4000;

/// Default roster capacity.
pub const DEFAULT_CAPACITY: usize = 6;

/// The durable part of a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRecord {
    /// Lobby code.
    pub code: LobbyCode,
    /// Subject of the identity that created the lobby.
    pub host_subject: String,
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Host detached after a suspend signal.
    pub suspended: bool,
    /// Unix seconds when the lobby became suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<u64>,
}

impl LobbyRecord {
    /// A fresh, unsuspended record.
    pub fn new(code: LobbyCode, host_subject: impl Into<String>, created_at: u64) -> Self {
        Self {
            code,
            host_subject: host_subject.into(),
            created_at,
            suspended: false,
            suspended_at: None,
        }
    }
}

/// An attach attempt, already authenticated.
#[derive(Debug, Clone)]
pub struct AttachRequest {
    /// Connection carrying the attach.
    pub conn: ConnId,
    /// Device-chosen peer id.
    pub peer_id: PeerId,
    /// Display name (already truncated by the caller).
    pub display_name: String,
    /// Optional avatar reference.
    pub avatar_ref: Option<String>,
    /// Requested role.
    pub role: Role,
    /// Verified identity subject.
    pub subject: String,
}

/// Something the relay must do to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a control event.
    Send {
        /// Recipient connection.
        conn: ConnId,
        /// Event to send.
        event: ControlEvent,
    },
    /// Close the connection.
    Close {
        /// Connection to close.
        conn: ConnId,
        /// WebSocket close code.
        code: u16,
    },
}

/// Result of one roster operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    /// Frames and closes, in order.
    pub outbound: Vec<Outbound>,
    /// The lobby no longer exists.
    pub destroyed: bool,
    /// The lobby record must be written back to storage.
    pub record_changed: bool,
}

impl Effects {
    fn send(&mut self, conn: ConnId, event: ControlEvent) {
        self.outbound.push(Outbound::Send { conn, event });
    }

    fn close(&mut self, conn: ConnId, code: u16) {
        self.outbound.push(Outbound::Close { conn, code });
    }
}

#[derive(Debug, Clone)]
struct Attached {
    conn: ConnId,
    subject: String,
    member: Member,
}

/// Roster and lifecycle of one lobby.
#[derive(Debug, Clone)]
pub struct Lobby {
    record: LobbyRecord,
    capacity: usize,
    suspending: bool,
    members: Vec<Attached>,
}

impl Lobby {
    /// Initialise a new lobby owned by `host_subject`.
    pub fn init(
        code: LobbyCode,
        host_subject: impl Into<String>,
        created_at: u64,
        capacity: usize,
    ) -> Self {
        Self::restore(LobbyRecord::new(code, host_subject, created_at), capacity)
    }

    /// Rebuild a lobby from a stored record, with zero members.
    pub fn restore(record: LobbyRecord, capacity: usize) -> Self {
        Self {
            record,
            capacity,
            suspending: false,
            members: Vec::new(),
        }
    }

    /// The lobby record.
    pub fn record(&self) -> &LobbyRecord {
        &self.record
    }

    /// Lobby code.
    pub fn code(&self) -> &LobbyCode {
        &self.record.code
    }

    /// Number of attached members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Attached members, in attach order.
    pub fn roster(&self) -> Vec<Member> {
        self.members.iter().map(|a| a.member.clone()).collect()
    }

    /// Connection of the attached host, if any.
    pub fn host_conn(&self) -> Option<ConnId> {
        self.members
            .iter()
            .find(|a| a.member.is_host)
            .map(|a| a.conn)
    }

    fn host_id(&self) -> Option<PeerId> {
        self.members
            .iter()
            .find(|a| a.member.is_host)
            .map(|a| a.member.peer_id.clone())
    }

    fn find_conn(&self, conn: ConnId) -> Option<&Attached> {
        self.members.iter().find(|a| a.conn == conn)
    }

    fn find_peer(&self, peer_id: &PeerId) -> Option<&Attached> {
        self.members.iter().find(|a| &a.member.peer_id == peer_id)
    }

    /// Accept a new control-channel connection.
    ///
    /// A member with the same peer id is evicted first and not counted
    /// against capacity, provided it has the same role and identity; any
    /// other reuse of a peer id is `Unauthorized`. A host attach with the
    /// owning identity also evicts any previous host connection and lifts
    /// a suspension.
    pub fn attach(&mut self, req: AttachRequest) -> Result<Effects, ErrorCode> {
        let is_host = req.role == Role::Host;
        if is_host && req.subject != self.record.host_subject {
            return Err(ErrorCode::Unauthorized);
        }
        if !is_host && (self.record.suspended || self.suspending) {
            return Err(ErrorCode::LobbySuspended);
        }
        if let Some(existing) = self.find_peer(&req.peer_id) {
            if existing.member.is_host != is_host || existing.subject != req.subject {
                return Err(ErrorCode::Unauthorized);
            }
        }

        let replaced: Vec<ConnId> = self
            .members
            .iter()
            .filter(|a| a.member.peer_id == req.peer_id || (is_host && a.member.is_host))
            .map(|a| a.conn)
            .collect();

        if self.members.len() - replaced.len() >= self.capacity {
            return Err(ErrorCode::LobbyFull);
        }

        let mut fx = Effects::default();
        for conn in &replaced {
            fx.close(*conn, CLOSE_REPLACED);
        }
        self.members.retain(|a| !replaced.contains(&a.conn));

        if is_host {
            if self.record.suspended {
                fx.record_changed = true;
            }
            self.record.suspended = false;
            self.record.suspended_at = None;
            self.suspending = false;
        }

        let member = Member {
            peer_id: req.peer_id.clone(),
            display_name: req.display_name,
            avatar_ref: req.avatar_ref,
            is_host,
        };
        self.members.push(Attached {
            conn: req.conn,
            subject: req.subject,
            member: member.clone(),
        });

        fx.send(
            req.conn,
            ControlEvent::Joined {
                roster: self.roster(),
                your_id: req.peer_id,
                is_host,
                host_id: self.host_id(),
            },
        );

        if is_host {
            // Re-run negotiation with clients that outlived the previous host connection.
            for client in self.members.iter().filter(|a| !a.member.is_host) {
                fx.send(req.conn, peer_joined(&client.member));
            }
        } else if let Some(host) = self.host_conn() {
            fx.send(host, peer_joined(&member));
        }

        Ok(fx)
    }

    /// Dispatch one request from an attached connection.
    ///
    /// Requests from connections that are not attached are ignored.
    pub fn handle(&mut self, conn: ConnId, request: ControlRequest) -> Result<Effects, ErrorCode> {
        if self.find_conn(conn).is_none() {
            return Ok(Effects::default());
        }
        match request {
            ControlRequest::Offer { .. }
            | ControlRequest::Answer { .. }
            | ControlRequest::IceCandidate { .. } => self.relay(conn, request),
            ControlRequest::Suspend => self.suspend(conn),
            ControlRequest::Close => self.close(conn),
            ControlRequest::Ping => Ok(self.heartbeat(conn)),
            ControlRequest::Unknown => Ok(Effects::default()),
        }
    }

    /// Forward a negotiation envelope to its target, tagged with the sender.
    ///
    /// Dropped silently when the target is not attached. Client-to-client
    /// envelopes are rejected.
    pub fn relay(&mut self, conn: ConnId, request: ControlRequest) -> Result<Effects, ErrorCode> {
        let mut fx = Effects::default();
        let Some(sender) = self.find_conn(conn) else {
            return Ok(fx);
        };
        let from = sender.member.peer_id.clone();
        let sender_is_host = sender.member.is_host;

        let Some(target_id) = request.target() else {
            return Err(ErrorCode::InvalidMessage);
        };
        let Some(target) = self.find_peer(target_id) else {
            return Ok(fx);
        };
        if !sender_is_host && !target.member.is_host {
            return Err(ErrorCode::InvalidMessage);
        }

        let event = match request {
            ControlRequest::Offer { sdp, .. } => ControlEvent::OfferReceived {
                from_peer_id: from,
                sdp,
            },
            ControlRequest::Answer { sdp, .. } => ControlEvent::AnswerReceived {
                from_peer_id: from,
                sdp,
            },
            ControlRequest::IceCandidate { candidate, .. } => ControlEvent::IceCandidateReceived {
                from_peer_id: from,
                candidate,
            },
            _ => return Err(ErrorCode::InvalidMessage),
        };
        fx.send(target.conn, event);
        Ok(fx)
    }

    /// Host announces a graceful detach.
    pub fn suspend(&mut self, conn: ConnId) -> Result<Effects, ErrorCode> {
        self.require_host(conn)?;
        self.suspending = true;
        let mut fx = Effects::default();
        for other in self.members.iter().filter(|a| a.conn != conn) {
            fx.send(other.conn, ControlEvent::HostSuspended);
        }
        Ok(fx)
    }

    /// Host ends the lobby for everyone.
    pub fn close(&mut self, conn: ConnId) -> Result<Effects, ErrorCode> {
        self.require_host(conn)?;
        let mut fx = Effects::default();
        for other in self.members.iter().filter(|a| a.conn != conn) {
            fx.send(
                other.conn,
                ControlEvent::LobbyClosed {
                    reason: CloseReason::HostClosed,
                },
            );
        }
        for member in &self.members {
            fx.close(member.conn, CLOSE_NORMAL);
        }
        self.members.clear();
        fx.destroyed = true;
        Ok(fx)
    }

    /// Liveness probe.
    pub fn heartbeat(&self, conn: ConnId) -> Effects {
        let mut fx = Effects::default();
        fx.send(conn, ControlEvent::Pong);
        fx
    }

    /// A control channel closed.
    ///
    /// Unknown connections (already evicted or removed) are ignored.
    pub fn detach(&mut self, conn: ConnId, now: u64) -> Effects {
        let mut fx = Effects::default();
        let Some(pos) = self.members.iter().position(|a| a.conn == conn) else {
            return fx;
        };
        let departed = self.members.remove(pos);

        if !departed.member.is_host {
            if let Some(host) = self.host_conn() {
                fx.send(
                    host,
                    ControlEvent::PeerLeft {
                        peer_id: departed.member.peer_id,
                    },
                );
            }
            return fx;
        }

        if self.suspending {
            self.suspending = false;
            self.record.suspended = true;
            self.record.suspended_at = Some(now);
            for member in &self.members {
                fx.close(member.conn, CLOSE_NORMAL);
            }
            self.members.clear();
            fx.record_changed = true;
        } else {
            for member in &self.members {
                fx.send(member.conn, ControlEvent::HostDisconnected);
                fx.close(member.conn, CLOSE_NORMAL);
            }
            self.members.clear();
            fx.destroyed = true;
        }
        fx
    }

    /// Read-only metadata.
    pub fn info(&self) -> LobbyInfo {
        LobbyInfo {
            code: self.record.code.clone(),
            host_id: self.host_id(),
            created_at: self.record.created_at,
            suspended: self.record.suspended,
            capacity: self.capacity,
            members: self.roster(),
        }
    }

    /// Whether an empty lobby should be destroyed.
    ///
    /// Suspended lobbies age from the suspend against `suspended_ttl_secs`.
    /// Lobbies that were created but never attached age from creation
    /// against `idle_ttl_secs`.
    pub fn is_expired(&self, now: u64, idle_ttl_secs: u64, suspended_ttl_secs: u64) -> bool {
        if !self.members.is_empty() {
            return false;
        }
        if self.record.suspended {
            let since = self.record.suspended_at.unwrap_or(self.record.created_at);
            now.saturating_sub(since) >= suspended_ttl_secs
        } else {
            now.saturating_sub(self.record.created_at) >= idle_ttl_secs
        }
    }

    fn require_host(&self, conn: ConnId) -> Result<(), ErrorCode> {
        match self.find_conn(conn) {
            Some(a) if a.member.is_host => Ok(()),
            _ => Err(ErrorCode::NotHost),
        }
    }
}

fn peer_joined(member: &Member) -> ControlEvent {
    ControlEvent::PeerJoined {
        peer_id: member.peer_id.clone(),
        display_name: member.display_name.clone(),
        avatar_ref: member.avatar_ref.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "host-subject";

    fn code() -> LobbyCode {
        LobbyCode::parse("ABC234").unwrap()
    }

    fn lobby() -> Lobby {
        Lobby::init(code(), HOST, 100, DEFAULT_CAPACITY)
    }

    fn host(conn: ConnId) -> AttachRequest {
        AttachRequest {
            conn,
            peer_id: PeerId::new("host"),
            display_name: "Host".into(),
            avatar_ref: None,
            role: Role::Host,
            subject: HOST.into(),
        }
    }

    fn client(conn: ConnId, id: &str) -> AttachRequest {
        AttachRequest {
            conn,
            peer_id: PeerId::new(id),
            display_name: id.to_uppercase(),
            avatar_ref: Some(format!("avatar://{}", id)),
            role: Role::Client,
            subject: format!("guest-{}", id),
        }
    }

    fn sent_to(fx: &Effects, conn: ConnId) -> Vec<ControlEvent> {
        fx.outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Send { conn: c, event } if *c == conn => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn closed(fx: &Effects) -> Vec<(ConnId, u16)> {
        fx.outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Close { conn, code } => Some((*conn, *code)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn host_attach_receives_joined() {
        let mut lobby = lobby();
        let fx = lobby.attach(host(1)).unwrap();
        match &sent_to(&fx, 1)[0] {
            ControlEvent::Joined {
                roster,
                your_id,
                is_host,
                host_id,
            } => {
                assert_eq!(roster.len(), 1);
                assert_eq!(your_id, &PeerId::new("host"));
                assert!(*is_host);
                assert_eq!(host_id.as_ref(), Some(&PeerId::new("host")));
            }
            other => panic!("expected Joined, got {:?}", other),
        }
    }

    #[test]
    fn client_attach_notifies_host() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        let fx = lobby.attach(client(2, "c1")).unwrap();

        assert!(matches!(
            sent_to(&fx, 2)[0],
            ControlEvent::Joined { is_host: false, .. }
        ));
        assert_eq!(
            sent_to(&fx, 1),
            vec![ControlEvent::PeerJoined {
                peer_id: PeerId::new("c1"),
                display_name: "C1".into(),
                avatar_ref: Some("avatar://c1".into()),
            }]
        );
    }

    #[test]
    fn wrong_identity_cannot_attach_as_host() {
        let mut lobby = lobby();
        let mut req = host(1);
        req.subject = "someone-else".into();
        assert_eq!(lobby.attach(req).unwrap_err(), ErrorCode::Unauthorized);
        assert_eq!(lobby.member_count(), 0);
    }

    #[test]
    fn full_roster_rejects_new_peer_unchanged() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        for i in 0..5 {
            lobby.attach(client(10 + i, &format!("c{}", i))).unwrap();
        }
        assert_eq!(lobby.member_count(), 6);
        let before = lobby.roster();

        let err = lobby.attach(client(99, "late")).unwrap_err();
        assert_eq!(err, ErrorCode::LobbyFull);
        assert_eq!(lobby.roster(), before);
    }

    #[test]
    fn reconnect_at_capacity_evicts_instead_of_counting_twice() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        for i in 0..5 {
            lobby.attach(client(10 + i, &format!("c{}", i))).unwrap();
        }
        let fx = lobby.attach(client(50, "c3")).unwrap();
        assert_eq!(closed(&fx), vec![(13, CLOSE_REPLACED)]);
        assert_eq!(lobby.member_count(), 6);
    }

    #[test]
    fn second_attach_with_same_peer_id_evicts_first() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        let fx = lobby.attach(client(3, "c1")).unwrap();
        assert_eq!(closed(&fx), vec![(2, CLOSE_REPLACED)]);
        assert_eq!(lobby.member_count(), 2);

        // The evicted connection's late close is a no-op.
        let fx = lobby.detach(2, 200);
        assert_eq!(fx, Effects::default());
        assert_eq!(lobby.member_count(), 2);
    }

    #[test]
    fn client_cannot_take_the_host_peer_id() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();

        let mut impostor = client(3, "host");
        impostor.subject = HOST.into();
        assert_eq!(lobby.attach(impostor), Err(ErrorCode::Unauthorized));

        assert_eq!(lobby.host_conn(), Some(1));
        assert_eq!(lobby.member_count(), 2);

        // The real host leaving still ends the lobby for everyone.
        let fx = lobby.detach(1, 200);
        assert!(fx.destroyed);
        assert_eq!(sent_to(&fx, 2), vec![ControlEvent::HostDisconnected]);
    }

    #[test]
    fn peer_id_reuse_by_another_identity_is_rejected() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();

        let mut other = client(3, "c1");
        other.subject = "guest-mallory".into();
        assert_eq!(lobby.attach(other), Err(ErrorCode::Unauthorized));
        assert_eq!(lobby.roster().len(), 2);

        // Same role and identity still replaces the old connection.
        let fx = lobby.attach(client(4, "c1")).unwrap();
        assert_eq!(closed(&fx), vec![(2, CLOSE_REPLACED)]);
    }

    #[test]
    fn host_cannot_reuse_a_client_peer_id() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        let mut c1 = client(2, "c1");
        c1.subject = HOST.into();
        lobby.attach(c1).unwrap();

        let mut again = host(3);
        again.peer_id = PeerId::new("c1");
        assert_eq!(lobby.attach(again), Err(ErrorCode::Unauthorized));
        assert_eq!(lobby.host_conn(), Some(1));
    }

    #[test]
    fn relay_forwards_tagged_with_sender() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();

        let fx = lobby
            .handle(
                1,
                ControlRequest::Offer {
                    target_peer_id: PeerId::new("c1"),
                    sdp: "offer".into(),
                },
            )
            .unwrap();
        assert_eq!(
            sent_to(&fx, 2),
            vec![ControlEvent::OfferReceived {
                from_peer_id: PeerId::new("host"),
                sdp: "offer".into(),
            }]
        );
    }

    #[test]
    fn relay_to_absent_target_is_dropped() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        let fx = lobby
            .handle(
                1,
                ControlRequest::IceCandidate {
                    target_peer_id: PeerId::new("ghost"),
                    candidate: "tcp:127.0.0.1:1".into(),
                },
            )
            .unwrap();
        assert!(fx.outbound.is_empty());
    }

    #[test]
    fn client_to_client_relay_is_rejected() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "a")).unwrap();
        lobby.attach(client(3, "b")).unwrap();
        let err = lobby
            .handle(
                2,
                ControlRequest::Answer {
                    target_peer_id: PeerId::new("b"),
                    sdp: "x".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ErrorCode::InvalidMessage);
    }

    #[test]
    fn suspend_is_host_only() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        assert_eq!(
            lobby.handle(2, ControlRequest::Suspend).unwrap_err(),
            ErrorCode::NotHost
        );
        assert_eq!(
            lobby.handle(2, ControlRequest::Close).unwrap_err(),
            ErrorCode::NotHost
        );
    }

    #[test]
    fn suspend_then_detach_keeps_record_with_zero_members() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();

        let fx = lobby.handle(1, ControlRequest::Suspend).unwrap();
        assert_eq!(sent_to(&fx, 2), vec![ControlEvent::HostSuspended]);
        assert!(sent_to(&fx, 1).is_empty());

        let fx = lobby.detach(1, 500);
        assert!(!fx.destroyed);
        assert!(fx.record_changed);
        assert_eq!(closed(&fx), vec![(2, CLOSE_NORMAL)]);
        assert_eq!(lobby.member_count(), 0);
        assert!(lobby.record().suspended);
        assert_eq!(lobby.record().suspended_at, Some(500));
        assert_eq!(lobby.record().created_at, 100);
    }

    #[test]
    fn suspended_lobby_looks_like_fresh_one_except_flag() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.handle(1, ControlRequest::Suspend).unwrap();
        lobby.detach(1, 500);

        let fresh = Lobby::init(code(), HOST, 100, DEFAULT_CAPACITY).info();
        let info = lobby.info();
        assert_eq!(info.members, fresh.members);
        assert_eq!(info.host_id, fresh.host_id);
        assert_eq!(info.code, fresh.code);
    }

    #[test]
    fn clients_cannot_attach_to_suspended_lobby() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.handle(1, ControlRequest::Suspend).unwrap();
        assert_eq!(
            lobby.attach(client(2, "c1")).unwrap_err(),
            ErrorCode::LobbySuspended
        );
        lobby.detach(1, 500);
        assert_eq!(
            lobby.attach(client(3, "c1")).unwrap_err(),
            ErrorCode::LobbySuspended
        );
    }

    #[test]
    fn host_reattach_resumes_same_record() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.handle(1, ControlRequest::Suspend).unwrap();
        lobby.detach(1, 500);

        let fx = lobby.attach(host(7)).unwrap();
        assert!(fx.record_changed);
        assert!(!lobby.record().suspended);
        assert_eq!(lobby.record().suspended_at, None);
        assert_eq!(lobby.record().created_at, 100);
        assert!(lobby.attach(client(8, "c1")).is_ok());
    }

    #[test]
    fn host_disconnect_without_suspend_destroys_lobby() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        lobby.attach(client(3, "c2")).unwrap();

        let fx = lobby.detach(1, 500);
        assert!(fx.destroyed);
        assert_eq!(sent_to(&fx, 2), vec![ControlEvent::HostDisconnected]);
        assert_eq!(sent_to(&fx, 3), vec![ControlEvent::HostDisconnected]);
        assert_eq!(lobby.member_count(), 0);
    }

    #[test]
    fn client_detach_notifies_host() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        let fx = lobby.detach(2, 500);
        assert_eq!(
            sent_to(&fx, 1),
            vec![ControlEvent::PeerLeft {
                peer_id: PeerId::new("c1")
            }]
        );
        assert!(!fx.destroyed);
        assert_eq!(lobby.member_count(), 1);
    }

    #[test]
    fn close_tears_down_everyone() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        let fx = lobby.handle(1, ControlRequest::Close).unwrap();
        assert!(fx.destroyed);
        assert_eq!(
            sent_to(&fx, 2),
            vec![ControlEvent::LobbyClosed {
                reason: CloseReason::HostClosed
            }]
        );
        assert_eq!(closed(&fx), vec![(1, CLOSE_NORMAL), (2, CLOSE_NORMAL)]);
    }

    #[test]
    fn host_reattach_with_clients_present_replays_peer_joined() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.attach(client(2, "c1")).unwrap();
        lobby.attach(client(3, "c2")).unwrap();

        let mut again = host(9);
        again.peer_id = PeerId::new("host-2");
        let fx = lobby.attach(again).unwrap();
        assert_eq!(closed(&fx), vec![(1, CLOSE_REPLACED)]);
        let to_host = sent_to(&fx, 9);
        assert_eq!(to_host.len(), 3);
        assert!(matches!(to_host[1], ControlEvent::PeerJoined { .. }));
        assert!(matches!(to_host[2], ControlEvent::PeerJoined { .. }));
    }

    #[test]
    fn ping_gets_pong_and_unknown_is_ignored() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        let fx = lobby.handle(1, ControlRequest::Ping).unwrap();
        assert_eq!(sent_to(&fx, 1), vec![ControlEvent::Pong]);
        let fx = lobby.handle(1, ControlRequest::Unknown).unwrap();
        assert!(fx.outbound.is_empty());
    }

    #[test]
    fn requests_from_unattached_connections_are_ignored() {
        let mut lobby = lobby();
        let fx = lobby.handle(42, ControlRequest::Close).unwrap();
        assert!(!fx.destroyed);
    }

    #[test]
    fn expiry_only_applies_to_empty_lobbies() {
        let mut lobby = lobby();
        assert!(lobby.is_expired(200, 100, 5_000));
        assert!(!lobby.is_expired(150, 100, 5_000));
        lobby.attach(host(1)).unwrap();
        assert!(!lobby.is_expired(10_000, 100, 5_000));
        lobby.handle(1, ControlRequest::Suspend).unwrap();
        lobby.detach(1, 1_000);
        assert!(!lobby.is_expired(1_050, 10, 100));
        assert!(lobby.is_expired(1_100, 10, 100));
    }

    #[test]
    fn suspended_lobbies_use_the_longer_ttl() {
        let mut lobby = lobby();
        lobby.attach(host(1)).unwrap();
        lobby.handle(1, ControlRequest::Suspend).unwrap();
        lobby.detach(1, 1_000);
        // Past the idle TTL but well inside the suspended one.
        assert!(!lobby.is_expired(1_200, 100, 86_400));
        assert!(lobby.is_expired(1_000 + 86_400, 100, 86_400));
    }
}
