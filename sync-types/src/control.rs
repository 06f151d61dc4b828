//! Control-channel envelopes (device ⇄ signaling relay).
//!
//! Both directions are JSON objects discriminated by a `type` field.
//! Unknown types decode to `Unknown` and are ignored by receivers.

use serde::{Deserialize, Serialize};

use crate::{CloseReason, ErrorCode, Member, PeerId, SyncError};

/// Messages a device sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ControlRequest {
    /// Connection offer for a peer.
    Offer {
        /// Recipient.
        target_peer_id: PeerId,
        /// Opaque offer description.
        sdp: String,
    },
    /// Answer to an offer.
    Answer {
        /// Recipient.
        target_peer_id: PeerId,
        /// Opaque answer description.
        sdp: String,
    },
    /// A locally discovered connectivity candidate.
    IceCandidate {
        /// Recipient.
        target_peer_id: PeerId,
        /// Opaque candidate string.
        candidate: String,
    },
    /// Host is about to detach on purpose (host only).
    Suspend,
    /// Host ends the lobby for everyone (host only).
    Close,
    /// Liveness probe.
    Ping,
    /// Any type this build does not know.
    #[serde(other)]
    Unknown,
}

/// Messages the relay sends to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ControlEvent {
    /// Attach succeeded.
    Joined {
        /// Roster at attach time, including the new member.
        roster: Vec<Member>,
        /// The attached member's own id.
        your_id: PeerId,
        /// Whether the attached member is the host.
        is_host: bool,
        /// Host's peer id, if the host is attached.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_id: Option<PeerId>,
    },
    /// A client attached (sent to the host).
    PeerJoined {
        /// The new member.
        peer_id: PeerId,
        /// Its display name.
        display_name: String,
        /// Its avatar reference.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar_ref: Option<String>,
    },
    /// A client detached (sent to the host).
    PeerLeft {
        /// The departed member.
        peer_id: PeerId,
    },
    /// The host went away without suspending; the lobby is gone.
    HostDisconnected,
    /// The host is pausing the lobby on purpose.
    HostSuspended,
    /// The lobby was ended.
    LobbyClosed {
        /// Why.
        reason: CloseReason,
    },
    /// Relayed offer.
    OfferReceived {
        /// Sender.
        from_peer_id: PeerId,
        /// Opaque offer description.
        sdp: String,
    },
    /// Relayed answer.
    AnswerReceived {
        /// Sender.
        from_peer_id: PeerId,
        /// Opaque answer description.
        sdp: String,
    },
    /// Relayed connectivity candidate.
    IceCandidateReceived {
        /// Sender.
        from_peer_id: PeerId,
        /// Opaque candidate string.
        candidate: String,
    },
    /// Liveness reply.
    Pong,
    /// Per-member error; never affects other members.
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
    /// Any type this build does not know.
    #[serde(other)]
    Unknown,
}

impl ControlRequest {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// The peer this request is addressed to, for relayed negotiation.
    pub fn target(&self) -> Option<&PeerId> {
        match self {
            ControlRequest::Offer { target_peer_id, .. }
            | ControlRequest::Answer { target_peer_id, .. }
            | ControlRequest::IceCandidate { target_peer_id, .. } => Some(target_peer_id),
            _ => None,
        }
    }
}

impl ControlEvent {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Build an `Error` envelope.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ControlEvent::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_wire_shape() {
        let offer = ControlRequest::Offer {
            target_peer_id: PeerId::new("p2"),
            sdp: "token".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&offer.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"type": "Offer", "targetPeerId": "p2", "sdp": "token"})
        );
    }

    #[test]
    fn unit_requests_decode() {
        assert_eq!(
            ControlRequest::from_json(r#"{"type":"Suspend"}"#).unwrap(),
            ControlRequest::Suspend
        );
        assert_eq!(
            ControlRequest::from_json(r#"{"type":"Ping"}"#).unwrap(),
            ControlRequest::Ping
        );
    }

    #[test]
    fn unknown_type_is_not_fatal() {
        let req = ControlRequest::from_json(r#"{"type":"Teleport","x":1}"#).unwrap();
        assert_eq!(req, ControlRequest::Unknown);
        let event = ControlEvent::from_json(r#"{"type":"SomethingNew"}"#).unwrap();
        assert_eq!(event, ControlEvent::Unknown);
    }

    #[test]
    fn malformed_frames_are_invalid_message() {
        assert!(matches!(
            ControlRequest::from_json("not json"),
            Err(SyncError::InvalidMessage(_))
        ));
        // Known type, missing required field.
        assert!(matches!(
            ControlRequest::from_json(r#"{"type":"Offer","sdp":"x"}"#),
            Err(SyncError::InvalidMessage(_))
        ));
    }

    #[test]
    fn joined_wire_shape() {
        let joined = ControlEvent::Joined {
            roster: vec![Member {
                peer_id: PeerId::new("h"),
                display_name: "Host".into(),
                avatar_ref: None,
                is_host: true,
            }],
            your_id: PeerId::new("h"),
            is_host: true,
            host_id: Some(PeerId::new("h")),
        };
        let json: serde_json::Value = serde_json::from_str(&joined.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "Joined");
        assert_eq!(json["yourId"], "h");
        assert_eq!(json["isHost"], true);
        assert_eq!(json["hostId"], "h");
        assert_eq!(json["roster"][0]["displayName"], "Host");
    }

    #[test]
    fn error_and_close_events() {
        let err = ControlEvent::error(ErrorCode::LobbyFull, "6/6");
        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"type": "Error", "code": "LOBBY_FULL", "message": "6/6"}));

        let closed = ControlEvent::from_json(r#"{"type":"LobbyClosed","reason":"host_closed"}"#)
            .unwrap();
        assert_eq!(
            closed,
            ControlEvent::LobbyClosed {
                reason: CloseReason::HostClosed
            }
        );
    }

    #[test]
    fn target_of_negotiation_requests() {
        let cand = ControlRequest::IceCandidate {
            target_peer_id: PeerId::new("c1"),
            candidate: "tcp:127.0.0.1:9".into(),
        };
        assert_eq!(cand.target(), Some(&PeerId::new("c1")));
        assert_eq!(ControlRequest::Ping.target(), None);
    }
}
