//! Session state machine.

use parking_lot::Mutex;
use tracing::debug;

/// Lifecycle of a streaming session.
///
/// Transitions are strictly forward except `Streaming -> Connected` at the
/// end of an utterance. `Closed` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
    Draining,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connected, Streaming)
            | (Streaming, Connected)
            | (Connected, Draining)
            | (Streaming, Draining) => true,
            _ => false,
        }
    }

    /// States in which outbound messages are accepted.
    pub fn accepts_sends(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Streaming)
    }
}

/// Shared state cell, mutated only by the session and its tasks.
pub(crate) struct StateCell {
    state: Mutex<SessionState>,
    fatal: Mutex<Option<String>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            fatal: Mutex::new(None),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.state.lock()
    }

    /// Apply a transition if it is legal. Returns whether it happened.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        debug!(from = ?*state, to = ?next, "session state");
        *state = next;
        true
    }

    /// Record a fatal remote error and close.
    pub(crate) fn fail(&self, message: String) {
        self.fatal.lock().get_or_insert(message);
        self.transition(SessionState::Closed);
    }

    pub(crate) fn fatal(&self) -> Option<String> {
        self.fatal.lock().clone()
    }
}
