//! WebSocket session state machine.
//!
//! [`SessionController`] owns the state of one WebSocket iteration. The
//! driver feeds it [`SessionEvent`]s (connect outcome, frames, errors, the
//! deadline) and carries out the [`SessionAction`]s it returns. The controller
//! resolves the iteration at most once; every event after resolution is
//! discarded.
//!
//! ```text
//! Connecting --Connected--> Open --ProbeSent--> AwaitingEcho
//!     |                      |                      |
//!     | ConnectFailed        | Message(non-empty)   | Message(non-empty)
//!     | Deadline             | Deadline             | Deadline
//!     v                      v                      v
//!   Failed                 Closing <----------------+
//!                            |
//!                            | CloseConfirmed / Disconnected / Deadline
//!                            v
//!                          Closed
//!
//! Error from any non-terminal state --> Failed
//! Disconnected before closing --> Failed
//! ```

use crate::loadtest::context::IterationResult;
use crate::loadtest::error::ProbeError;

use std::fmt;
use std::time::Instant;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection attempt in flight.
    Connecting,
    /// Connected; the probe is being sent.
    Open,
    /// Probe sent; waiting for the echo.
    AwaitingEcho,
    /// Close requested; waiting for the peer to confirm.
    Closing,
    /// Terminal: the session ended through a close.
    Closed,
    /// Terminal: the session ended through an error.
    Failed,
}

impl SessionState {
    /// Returns `true` for [`SessionState::Closed`] and [`SessionState::Failed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Returns `true` while the underlying connection is usable for sending.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::AwaitingEcho)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::AwaitingEcho => "awaiting-echo",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake completed.
    Connected,
    /// The connection could not be established.
    ConnectFailed(ProbeError),
    /// The probe message was written.
    ProbeSent,
    /// A data frame arrived; carries the payload length in bytes.
    Message(usize),
    /// The peer confirmed the close, or the stream ended.
    CloseConfirmed,
    /// The connection dropped without a closing handshake.
    Disconnected,
    /// Transport or protocol error on an established connection.
    Error(ProbeError),
    /// The session deadline (or the close grace period) expired.
    Deadline,
}

/// Something the driver must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Send the probe message and count it.
    SendProbe,
    /// Record the "received response" check with this verdict.
    CheckResponse(bool),
    /// Start the closing handshake.
    RequestClose,
    /// The iteration is over; record this verdict.
    Resolve(IterationResult),
}

/// State machine for one WebSocket iteration.
#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    started: Instant,
    success: bool,
    resolved: bool,
}

impl SessionController {
    /// Creates a controller in [`SessionState::Connecting`]. `started` is the
    /// connect-initiation time that session durations are measured from.
    pub fn new(started: Instant) -> Self {
        Self {
            state: SessionState::Connecting,
            started,
            success: false,
            resolved: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the echo was received.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Whether the iteration verdict has been produced.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Applies `event` observed at `now` and returns the actions to perform.
    pub fn handle(&mut self, event: SessionEvent, now: Instant) -> Vec<SessionAction> {
        use SessionEvent as E;
        use SessionState as S;

        if self.resolved {
            return Vec::new();
        }

        match (self.state, event) {
            // Our close frame is out; a dropped connection ends the handshake.
            (S::Closing, E::Disconnected) => self.resolve(S::Closed, self.success, now),
            (_, E::Error(_) | E::Disconnected) | (S::Connecting, E::ConnectFailed(_)) => {
                self.resolve(S::Failed, false, now)
            },
            (S::Connecting, E::Connected) => {
                self.state = S::Open;
                vec![SessionAction::SendProbe]
            },
            (S::Connecting, E::Deadline) => self.resolve(S::Failed, false, now),
            (S::Open, E::ProbeSent) => {
                self.state = S::AwaitingEcho;
                Vec::new()
            },
            (S::Open | S::AwaitingEcho, E::Message(len)) => {
                let non_empty = len > 0;
                let mut actions = vec![SessionAction::CheckResponse(non_empty)];
                if non_empty {
                    self.success = true;
                    self.state = S::Closing;
                    actions.push(SessionAction::RequestClose);
                }
                actions
            },
            (S::Open | S::AwaitingEcho, E::Deadline) => {
                self.state = S::Closing;
                vec![SessionAction::RequestClose]
            },
            (S::Open | S::AwaitingEcho | S::Closing, E::CloseConfirmed) => {
                self.resolve(S::Closed, self.success, now)
            },
            (S::Closing, E::Deadline) => self.resolve(S::Closed, self.success, now),
            // Late frames while closing and out-of-order events are dropped.
            _ => Vec::new(),
        }
    }

    fn resolve(&mut self, terminal: SessionState, success: bool, now: Instant) -> Vec<SessionAction> {
        self.state = terminal;
        self.resolved = true;
        vec![SessionAction::Resolve(IterationResult {
            success,
            duration: now.saturating_duration_since(self.started),
        })]
    }
}

/// Picks the verdict out of an action list, if present.
pub fn resolution(actions: &[SessionAction]) -> Option<IterationResult> {
    actions.iter().find_map(|action| match action {
        SessionAction::Resolve(result) => Some(*result),
        _ => None,
    })
}
