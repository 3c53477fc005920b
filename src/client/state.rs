//! Connection lifecycle state and status snapshots.

use std::fmt;

use crate::identifiers::ConnectionId;
use crate::resilience::CircuitState;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle position of the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and none pending.
    #[default]
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// Open and usable.
    Connected,
    /// Waiting for, or running, an automatic reconnect attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Returns the lowercase state name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Returns `true` while an open is pending or scheduled.
    #[inline]
    #[must_use]
    pub const fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Point-in-time view of the manager, for dashboards and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Id of the live connection, if any.
    pub connection_id: Option<ConnectionId>,
    pub circuit: CircuitState,
    /// Attempts made in the current outage.
    pub reconnect_attempts: u32,
    pub queued_messages: usize,
    pub pending_requests: usize,
    pub heartbeat_running: bool,
    pub visible: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_transitioning() {
        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_transitioning());
    }
}
