//! Backend connection state machine.
//!
//! # States
//! - ToConnect: ask for permission, dial the heartbeat socket
//! - ToRun: heartbeat sender and receiver are running
//! - ToQuit: terminal, the connection task returns
//! - ToIdle: reserved, no transition enters it
//!
//! # State Transitions
//! ```text
//! ToConnect → ToRun:     permission granted and socket dialed
//! ToConnect → ToQuit:    retries exhausted or handshake refused
//! ToRun → ToConnect:     peer closed with 1012 or the read side failed
//! ToRun → ToQuit:        normal closure, going away, unknown code, or local shutdown
//! ```

use std::fmt;

/// Close code sent by a backend that asks for a reconnect (service restart).
pub const CLOSE_SERVICE_RESTART: u16 = 1012;
/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Local code for a read that failed without a close handshake.
pub const UNEXPECTED_PEER_READ_ERROR: u16 = 4001;

/// Lifecycle state of a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ToConnect,
    ToRun,
    ToQuit,
    ToIdle,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::ToConnect => "to_connect",
            ConnectionState::ToRun => "to_run",
            ConnectionState::ToQuit => "to_quit",
            ConnectionState::ToIdle => "to_idle",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a heartbeat link is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Local shutdown; always terminal.
    SelfInitiated,
    /// The peer closed or the link failed with this close code.
    Peer(u16),
}

impl DisconnectCause {
    /// State the connection moves to after this disconnect.
    pub fn next_state(&self) -> ConnectionState {
        match self {
            DisconnectCause::SelfInitiated => ConnectionState::ToQuit,
            DisconnectCause::Peer(code) => classify_close_code(*code),
        }
    }
}

/// Map a close code to the next connection state.
pub fn classify_close_code(code: u16) -> ConnectionState {
    match code {
        CLOSE_NORMAL | CLOSE_GOING_AWAY => ConnectionState::ToQuit,
        CLOSE_SERVICE_RESTART | UNEXPECTED_PEER_READ_ERROR => ConnectionState::ToConnect,
        _ => ConnectionState::ToQuit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify_close_code(1000), ConnectionState::ToQuit);
        assert_eq!(classify_close_code(1001), ConnectionState::ToQuit);
        assert_eq!(classify_close_code(1012), ConnectionState::ToConnect);
        assert_eq!(classify_close_code(UNEXPECTED_PEER_READ_ERROR), ConnectionState::ToConnect);
        assert_eq!(classify_close_code(9999), ConnectionState::ToQuit);
        assert_eq!(classify_close_code(CLOSE_NO_STATUS), ConnectionState::ToQuit);
    }

    #[test]
    fn test_self_initiated_is_terminal() {
        assert_eq!(DisconnectCause::SelfInitiated.next_state(), ConnectionState::ToQuit);
        assert_eq!(DisconnectCause::Peer(1012).next_state(), ConnectionState::ToConnect);
    }
}
