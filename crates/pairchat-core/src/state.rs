//! Connection lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TransportEvent;

/// Connection state.
///
/// `Closed` is not terminal for a session: a fresh connect is always legal,
/// but the socket that closed is never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection has been attempted.
    #[default]
    Idle,
    /// Connection attempt in flight.
    Connecting,
    /// Socket open; sends are accepted.
    Open,
    /// Socket closed or failed.
    Closed,
}

impl ConnectionState {
    /// Whether sends are accepted.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether `connect()` starts a new attempt from this state.
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }

    /// Status text for the UI.
    #[must_use]
    pub const fn label(self) -> &'static str {
        if self.is_open() {
            "Connected"
        } else {
            "Disconnected"
        }
    }

    /// Next state after a transport event.
    ///
    /// Frames never change the state. Lifecycle events that make no sense in
    /// the current state (an `Opened` after close, say) leave it unchanged.
    #[must_use]
    pub const fn transition(self, event: &TransportEvent) -> Self {
        match (self, event) {
            (Self::Connecting, TransportEvent::Opened) => Self::Open,
            (Self::Connecting | Self::Open, TransportEvent::Closed | TransportEvent::Errored(_)) => {
                Self::Closed
            }
            (state, _) => state,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
