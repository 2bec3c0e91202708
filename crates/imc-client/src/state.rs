//! Client state machine.
//!
//! # State diagram
//!
//! ```text
//!                    InitFinished
//!    Bootstrapping ───────────────► Receiving
//!       ▲      │                        │
//!       │      │ PermanentFailure       │ PermanentFailure
//!       │      │ KeepAliveExpired       │ KeepAliveExpired
//!       │      ▼                        ▼
//!       └──── TransformError ◄──────────┘
//!  SnapshotArrived
//! ```
//!
//! Transitions are pure: [`ClientState::transition`] never touches queues or
//! callbacks. The orchestrator performs the side effects of entering a state.

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// No self-consistent initial view yet. Initial state.
    Bootstrapping,
    /// Steady state: diffs are drained in sequence order.
    Receiving,
    /// Reset after a permanent failure or a stall. Left only when a fresh
    /// snapshot arrives.
    TransformError,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Bootstrapping => "bootstrapping",
            ClientState::Receiving => "receiving",
            ClientState::TransformError => "transform_error",
        }
    }

    /// `true` once bootstrap has completed at least once (any state but
    /// Bootstrapping).
    pub fn is_initialized(&self) -> bool {
        !matches!(self, ClientState::Bootstrapping)
    }

    /// Apply an event. Illegal combinations leave the caller's state as is.
    pub fn transition(self, event: StateEvent) -> Result<ClientState, IllegalTransition> {
        use ClientState::*;
        use StateEvent::*;

        match (self, event) {
            (Bootstrapping, InitFinished) => Ok(Receiving),

            (_, PermanentFailure) => Ok(TransformError),
            (Bootstrapping | Receiving, KeepAliveExpired) => Ok(TransformError),

            (TransformError, SnapshotArrived) => Ok(Bootstrapping),
            (Bootstrapping, SnapshotArrived) => Ok(Bootstrapping),
            (Receiving, SnapshotArrived) => Ok(Receiving),

            (from, event) => Err(IllegalTransition { from, event }),
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive [`ClientState`] transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateEvent {
    /// The lowest snapshot was emitted and no lower diff remains.
    InitFinished,
    /// A pending entry reported a permanent resolution failure.
    PermanentFailure,
    /// No emission within the keep-alive window while entries were pending.
    KeepAliveExpired,
    /// A snapshot was ingested.
    SnapshotArrived,
}

/// Returned when an event has no meaning in the current state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: ClientState,
    pub event: StateEvent,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal client transition: {} + {:?}", self.from, self.event)
    }
}

impl std::error::Error for IllegalTransition {}

#[cfg(test)]
mod tests {
    use super::ClientState::*;
    use super::StateEvent::*;
    use super::*;

    #[test]
    fn bootstrap_completes_into_receiving() {
        assert_eq!(Bootstrapping.transition(InitFinished), Ok(Receiving));
    }

    #[test]
    fn permanent_failure_from_any_state() {
        for s in [Bootstrapping, Receiving, TransformError] {
            assert_eq!(s.transition(PermanentFailure), Ok(TransformError));
        }
    }

    #[test]
    fn keep_alive_does_not_apply_in_error_state() {
        assert_eq!(Receiving.transition(KeepAliveExpired), Ok(TransformError));
        assert_eq!(Bootstrapping.transition(KeepAliveExpired), Ok(TransformError));
        assert!(TransformError.transition(KeepAliveExpired).is_err());
    }

    #[test]
    fn only_a_snapshot_leaves_the_error_state() {
        assert_eq!(TransformError.transition(SnapshotArrived), Ok(Bootstrapping));
        assert!(TransformError.transition(InitFinished).is_err());
    }

    #[test]
    fn init_finished_is_illegal_outside_bootstrap() {
        let err = Receiving.transition(InitFinished).unwrap_err();
        assert_eq!(err.from, Receiving);
        assert_eq!(err.event, InitFinished);
        assert!(err.to_string().contains("receiving"));
    }

    #[test]
    fn initialized_means_past_bootstrap() {
        assert!(!Bootstrapping.is_initialized());
        assert!(Receiving.is_initialized());
        assert!(TransformError.is_initialized());
    }
}
