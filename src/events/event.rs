//! Events published by the connection manager.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, from_value};

use crate::error::Error;
use crate::identifiers::ConnectionId;
use crate::resilience::ReconnectPhase;

// ============================================================================
// Event Names
// ============================================================================

/// Names of the events the manager emits itself.
///
/// Inbound protocol messages are emitted under their envelope `type`
/// (`trigger_response`, `status_update`, `workflow_log`, `agent_log`, ...).
pub mod names {
    /// Connection opened.
    pub const CONNECT: &str = "connect";
    /// Connection closed.
    pub const DISCONNECT: &str = "disconnect";
    /// Reconnect scheduled.
    pub const RECONNECTING: &str = "reconnecting";
    /// Reconnect attempts exhausted.
    pub const RECONNECT_FAILED: &str = "reconnect_failed";
    /// Transport, protocol, server or network error.
    pub const ERROR: &str = "error";
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Payload delivered to listeners.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection opened and the queue was replayed.
    Connected {
        connection_id: ConnectionId,
        replayed: usize,
    },

    /// The connection closed.
    Disconnected {
        /// Close code, `None` if the connection dropped without one.
        code: Option<u16>,
        reason: String,
        will_reconnect: bool,
    },

    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32, delay: Duration },

    /// Automatic reconnection stopped.
    ReconnectFailed { phase: ReconnectPhase, attempts: u32 },

    /// Something went wrong; the connection may still be up.
    Error(Error),

    /// An inbound protocol message.
    Message { kind: String, data: Value },
}

impl ConnectionEvent {
    /// Event name listeners subscribe to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connected { .. } => names::CONNECT,
            Self::Disconnected { .. } => names::DISCONNECT,
            Self::Reconnecting { .. } => names::RECONNECTING,
            Self::ReconnectFailed { .. } => names::RECONNECT_FAILED,
            Self::Error(_) => names::ERROR,
            Self::Message { kind, .. } => kind,
        }
    }

    /// Decodes the data of a [`Message`](Self::Message) event.
    ///
    /// Returns `None` for other events or if the data has another shape.
    #[must_use]
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Message { data, .. } => from_value(data.clone()).ok(),
            _ => None,
        }
    }

    /// Returns the error of an [`Error`](Self::Error) event.
    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::StatusUpdate;

    #[test]
    fn test_names() {
        let event = ConnectionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1),
        };
        assert_eq!(event.name(), "reconnecting");

        let event = ConnectionEvent::Message {
            kind: "tool_use_pre".into(),
            data: json!({}),
        };
        assert_eq!(event.name(), "tool_use_pre");
    }

    #[test]
    fn test_data_as() {
        let event = ConnectionEvent::Message {
            kind: "status_update".into(),
            data: json!({ "adw_id": "abc12345", "status": "running" }),
        };
        let update: StatusUpdate = event.data_as().expect("typed");
        assert_eq!(update.status, "running");

        let event = ConnectionEvent::Error(Error::NetworkOffline);
        assert!(event.data_as::<StatusUpdate>().is_none());
        assert!(matches!(event.as_error(), Some(Error::NetworkOffline)));
    }
}
