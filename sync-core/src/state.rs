//! Connection state machine for tablesync.
//!
//! This module provides a pure, side-effect-free state machine for a
//! device's control-channel lifecycle. The state machine takes events as
//! input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the channel, arming timers, closing links) is
//! performed by sync-client, not by this module. This enables instant unit
//! testing without network mocks.

use std::time::Duration;
use sync_types::{CloseReason, SyncError};

/// Reconnect schedule: `base * 2^(attempt-1)`, capped, for a bounded number
/// of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Retries before giving up.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Connection state machine - NO I/O, just state transitions.
///
/// Only the session's control-channel lifecycle callbacks feed it, so each
/// device has exactly one writer of its connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not in a session.
    #[default]
    Disconnected,
    /// Control channel is being opened.
    Connecting {
        /// Retry number this open belongs to (0 for the initial request).
        attempt: u32,
    },
    /// Control channel open and attach acknowledged.
    Connected,
    /// Channel dropped; a retry is scheduled.
    Reconnecting {
        /// Retry number that will run when the timer fires.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::JoinRequested) => (
                Self::Connecting { attempt: 0 },
                vec![Action::OpenChannel],
            ),

            // From Connecting
            (Self::Connecting { .. }, Event::ChannelOpened) => (
                Self::Connected,
                vec![Action::Emit(Lifecycle::Connected)],
            ),
            (Self::Connecting { attempt: 0 }, Event::ConnectFailed { failure }) => (
                Self::Disconnected,
                vec![
                    Action::CloseChannel,
                    Action::TeardownLinks,
                    Action::Emit(Lifecycle::Failed { failure }),
                ],
            ),
            (Self::Connecting { attempt }, Event::ConnectFailed { failure }) => {
                retry_or_give_up(attempt, failure, policy)
            }
            (Self::Connecting { attempt }, Event::ChannelClosed { .. }) if attempt > 0 => {
                retry_or_give_up(attempt, Failure::ConnectionLost, policy)
            }
            (Self::Connecting { .. }, Event::ChannelClosed { .. }) => (
                Self::Disconnected,
                vec![
                    Action::TeardownLinks,
                    Action::Emit(Lifecycle::Failed {
                        failure: Failure::ConnectionLost,
                    }),
                ],
            ),

            // From Connected
            (Self::Connected, Event::ChannelClosed { normal: false }) => {
                schedule_retry(1, policy)
            }
            (Self::Connected, Event::ChannelClosed { normal: true }) => (
                Self::Disconnected,
                vec![Action::TeardownLinks, Action::Emit(Lifecycle::Left)],
            ),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => (
                Self::Connecting { attempt },
                vec![Action::OpenChannel],
            ),

            // Any live state
            (state, Event::LeaveRequested) if state != Self::Disconnected => (
                Self::Disconnected,
                vec![
                    Action::CancelReconnect,
                    Action::CloseChannel,
                    Action::TeardownLinks,
                    Action::Emit(Lifecycle::Left),
                ],
            ),
            (state, Event::Terminated { reason }) if state != Self::Disconnected => (
                Self::Disconnected,
                vec![
                    Action::CancelReconnect,
                    Action::CloseChannel,
                    Action::TeardownLinks,
                    Action::Emit(Lifecycle::Ended { reason }),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Reconnecting { .. })
    }

    /// Lower-case name for logs and UI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
        }
    }
}

fn schedule_retry(attempt: u32, policy: &ReconnectPolicy) -> (ConnectionState, Vec<Action>) {
    let delay = policy.delay(attempt);
    (
        ConnectionState::Reconnecting { attempt },
        vec![
            Action::StartReconnectTimer { delay },
            Action::Emit(Lifecycle::Reconnecting { attempt, delay }),
        ],
    )
}

fn retry_or_give_up(
    attempt: u32,
    failure: Failure,
    policy: &ReconnectPolicy,
) -> (ConnectionState, Vec<Action>) {
    if failure.is_terminal() {
        return (
            ConnectionState::Disconnected,
            vec![
                Action::CloseChannel,
                Action::TeardownLinks,
                Action::Emit(Lifecycle::Failed { failure }),
            ],
        );
    }
    if attempt >= policy.max_attempts {
        return (
            ConnectionState::Disconnected,
            vec![
                Action::CloseChannel,
                Action::TeardownLinks,
                Action::Emit(Lifecycle::Failed {
                    failure: Failure::ConnectionLost,
                }),
            ],
        );
    }
    schedule_retry(attempt + 1, policy)
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Create, join, or resume requested.
    JoinRequested,
    /// Relay acknowledged the attach.
    ChannelOpened,
    /// The channel could not be opened or the attach was rejected.
    ConnectFailed {
        /// What went wrong.
        failure: Failure,
    },
    /// Control channel closed.
    ChannelClosed {
        /// Whether the close code was the normal one.
        normal: bool,
    },
    /// Explicit leave, suspend, or close by the local user.
    LeaveRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
    /// Relay-originated teardown.
    Terminated {
        /// Why the session ended.
        reason: EndReason,
    },
}

/// Why a connect attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Lobby code unknown.
    NotFound,
    /// Roster at capacity.
    Full,
    /// Credential rejected.
    Unauthorized,
    /// Host has suspended the lobby.
    Suspended,
    /// Channel did not open in time.
    Timeout,
    /// Retries exhausted after an abnormal close.
    ConnectionLost,
    /// Network-level failure.
    Transport(String),
}

impl Failure {
    /// Terminal failures are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Failure::NotFound | Failure::Full | Failure::Unauthorized | Failure::Suspended
        )
    }
}

impl From<Failure> for SyncError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::NotFound => SyncError::NotFound,
            Failure::Full => SyncError::Full,
            Failure::Unauthorized => SyncError::Unauthorized,
            Failure::Suspended => SyncError::Suspended,
            Failure::Timeout => SyncError::Timeout,
            Failure::ConnectionLost | Failure::Transport(_) => SyncError::ConnectionLost,
        }
    }
}

/// Why the relay ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Host dropped without suspending.
    HostDisconnected,
    /// Host paused the lobby.
    HostSuspended,
    /// Lobby closed with a reason.
    Closed(CloseReason),
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the control channel and attach.
    OpenChannel,
    /// Close the control channel (normal close code).
    CloseChannel,
    /// Close every data link and clear peer bookkeeping.
    TeardownLinks,
    /// Arm the reconnect timer.
    StartReconnectTimer {
        /// Delay before the retry.
        delay: Duration,
    },
    /// Disarm any pending reconnect timer.
    CancelReconnect,
    /// Report a lifecycle change to the application.
    Emit(Lifecycle),
}

/// Lifecycle changes reported to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Attach acknowledged.
    Connected,
    /// Channel dropped; retry scheduled.
    Reconnecting {
        /// Retry number.
        attempt: u32,
        /// Delay before it runs.
        delay: Duration,
    },
    /// Connect failed for good.
    Failed {
        /// Why.
        failure: Failure,
    },
    /// Local user left.
    Left,
    /// Relay ended the session.
    Ended {
        /// Why.
        reason: EndReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::default()
    }

    fn step(state: ConnectionState, event: Event) -> (ConnectionState, Vec<Action>) {
        state.on_event(event, &policy())
    }

    #[test]
    fn starts_disconnected() {
        assert_eq!(ConnectionState::new(), ConnectionState::Disconnected);
    }

    #[test]
    fn join_request_transitions_to_connecting() {
        let (state, actions) = step(ConnectionState::Disconnected, Event::JoinRequested);
        assert_eq!(state, ConnectionState::Connecting { attempt: 0 });
        assert!(actions.contains(&Action::OpenChannel));
    }

    #[test]
    fn channel_open_transitions_to_connected() {
        let (state, actions) = step(
            ConnectionState::Connecting { attempt: 0 },
            Event::ChannelOpened,
        );
        assert!(state.is_connected());
        assert!(actions.contains(&Action::Emit(Lifecycle::Connected)));
    }

    #[test]
    fn initial_failure_is_not_retried() {
        let (state, actions) = step(
            ConnectionState::Connecting { attempt: 0 },
            Event::ConnectFailed {
                failure: Failure::Timeout,
            },
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.contains(&Action::Emit(Lifecycle::Failed {
            failure: Failure::Timeout
        })));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::StartReconnectTimer { .. })));
    }

    #[test]
    fn abnormal_close_triggers_reconnect() {
        let (state, actions) = step(
            ConnectionState::Connected,
            Event::ChannelClosed { normal: false },
        );
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });
        assert!(actions.contains(&Action::StartReconnectTimer {
            delay: Duration::from_secs(1)
        }));
    }

    #[test]
    fn normal_close_disconnects() {
        let (state, actions) = step(
            ConnectionState::Connected,
            Event::ChannelClosed { normal: true },
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.contains(&Action::TeardownLinks));
    }

    #[test]
    fn backoff_schedule_is_1_2_4_8_16_then_gives_up() {
        let mut delays = Vec::new();
        let (mut state, actions) = step(
            ConnectionState::Connected,
            Event::ChannelClosed { normal: false },
        );
        collect_delays(&actions, &mut delays);

        loop {
            let (next, _) = step(state, Event::ReconnectTimer);
            assert!(matches!(next, ConnectionState::Connecting { .. }));
            let (next, actions) = step(
                next,
                Event::ConnectFailed {
                    failure: Failure::Transport("refused".into()),
                },
            );
            collect_delays(&actions, &mut delays);
            state = next;
            if state == ConnectionState::Disconnected {
                assert!(actions.contains(&Action::Emit(Lifecycle::Failed {
                    failure: Failure::ConnectionLost
                })));
                break;
            }
        }

        let secs: Vec<u64> = delays.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
    }

    fn collect_delays(actions: &[Action], out: &mut Vec<Duration>) {
        for action in actions {
            if let Action::StartReconnectTimer { delay } = action {
                out.push(*delay);
            }
        }
    }

    #[test]
    fn delay_capped_at_30_seconds() {
        let p = policy();
        assert_eq!(p.delay(6), Duration::from_secs(30));
        assert_eq!(p.delay(40), Duration::from_secs(30));
        assert_eq!(p.delay(1), Duration::from_secs(1));
    }

    #[test]
    fn terminal_failure_during_retry_stops() {
        let (state, actions) = step(
            ConnectionState::Connecting { attempt: 2 },
            Event::ConnectFailed {
                failure: Failure::NotFound,
            },
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.contains(&Action::Emit(Lifecycle::Failed {
            failure: Failure::NotFound
        })));
    }

    #[test]
    fn successful_retry_reconnects() {
        let (state, _) = step(
            ConnectionState::Reconnecting { attempt: 3 },
            Event::ReconnectTimer,
        );
        assert_eq!(state, ConnectionState::Connecting { attempt: 3 });
        let (state, _) = step(state, Event::ChannelOpened);
        assert_eq!(state, ConnectionState::Connected);
    }

    #[test]
    fn leave_from_reconnecting_cancels_timer() {
        let (state, actions) = step(
            ConnectionState::Reconnecting { attempt: 2 },
            Event::LeaveRequested,
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.contains(&Action::CancelReconnect));
        assert!(actions.contains(&Action::TeardownLinks));
    }

    #[test]
    fn leave_is_idempotent() {
        let (state, actions) = step(ConnectionState::Disconnected, Event::LeaveRequested);
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.is_empty());
    }

    #[test]
    fn relay_teardown_ends_session() {
        let (state, actions) = step(
            ConnectionState::Connected,
            Event::Terminated {
                reason: EndReason::HostDisconnected,
            },
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.contains(&Action::Emit(Lifecycle::Ended {
            reason: EndReason::HostDisconnected
        })));
    }

    #[test]
    fn close_after_teardown_is_ignored() {
        let (state, actions) = step(
            ConnectionState::Disconnected,
            Event::ChannelClosed { normal: false },
        );
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.is_empty());
    }

    #[test]
    fn helper_predicates() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Connecting { attempt: 0 }.is_connecting());
        assert!(ConnectionState::Reconnecting { attempt: 1 }.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
        assert_eq!(ConnectionState::Reconnecting { attempt: 1 }.name(), "reconnecting");
    }

    #[test]
    fn failure_maps_to_sync_error() {
        assert!(matches!(SyncError::from(Failure::Full), SyncError::Full));
        assert!(matches!(
            SyncError::from(Failure::Transport("x".into())),
            SyncError::ConnectionLost
        ));
    }
}
