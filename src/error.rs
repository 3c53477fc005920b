//! Error types for the ADW trigger client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use adw_trigger_client::{Error, Result, TriggerWorkflow};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.connect().await?;
//!     let response = manager
//!         .trigger_workflow(TriggerWorkflow::new("adw_plan_build"))
//!         .await?;
//!     println!("accepted: {:?}", response.adw_id);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`], [`Error::NetworkOffline`] |
//! | Resilience | [`Error::CircuitOpen`], [`Error::ReconnectExhausted`] |
//! | Protocol | [`Error::Protocol`], [`Error::Server`], [`Error::WorkflowRejected`] |
//! | Request | [`Error::RequestTimeout`], [`Error::RequestAbandoned`] |
//! | Health | [`Error::HealthCheck`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |
//!
//! `Error` is `Clone`: a single failed connection attempt is reported to
//! every caller awaiting the same `connect()`, and errors travel inside
//! [`ConnectionEvent::Error`](crate::events::ConnectionEvent::Error).

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;
use crate::resilience::ReconnectPhase;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the client configuration is invalid or incomplete,
    /// most importantly when no server host was supplied. Never retried.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the transport cannot be opened or a write fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt exceeded its deadline.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed while an operation was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message sent while disconnected with the message queue disabled.
    #[error("Not connected")]
    NotConnected,

    /// The host environment reported that the network went offline.
    #[error("Network offline")]
    NetworkOffline,

    // ========================================================================
    // Resilience Errors
    // ========================================================================
    /// Connection attempted while the circuit breaker is open.
    ///
    /// Callers should present "temporarily unavailable" instead of
    /// retrying in a loop of their own.
    #[error("Circuit breaker open, retry in {retry_after_ms}ms")]
    CircuitOpen {
        /// Milliseconds until the breaker allows a probe attempt.
        retry_after_ms: u64,
    },

    /// Automatic reconnection gave up.
    ///
    /// Terminal until `connect()` is invoked again.
    #[error("Reconnect attempts exhausted ({phase} phase, {attempts} attempts)")]
    ReconnectExhausted {
        /// Which attempt cap was reached.
        phase: ReconnectPhase,
        /// Attempts made in that phase.
        attempts: u32,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Unparseable or malformed frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Error message pushed by the server.
    #[error("Server error: {message}")]
    Server {
        /// Message reported by the server.
        message: String,
    },

    /// The server answered a workflow trigger without accepting it.
    #[error("Workflow rejected: {message}")]
    WorkflowRejected {
        /// ADW id echoed by the server, if any.
        adw_id: Option<String>,
        /// Rejection reason.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Correlated request timed out awaiting its response.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Correlated request given up after repeated disconnect resends, or
    /// whose queued payload was evicted.
    #[error("Request {request_id} abandoned after {resends} resends")]
    RequestAbandoned {
        /// The request ID that was abandoned.
        request_id: CorrelationId,
        /// Number of times the payload was re-queued.
        resends: u32,
    },

    // ========================================================================
    // Health Errors
    // ========================================================================
    /// `GET /health` did not report a healthy server.
    #[error("Health check failed: {message}")]
    HealthCheck {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[source] Arc<IoError>),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] Arc<WsError>),

    /// HTTP error from the health probe.
    #[error("HTTP error: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    /// Invalid URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        Self::WebSocket(Arc::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<RecvError> for Error {
    fn from(_: RecvError) -> Self {
        Self::ChannelClosed
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a circuit open error.
    #[inline]
    pub fn circuit_open(retry_after_ms: u64) -> Self {
        Self::CircuitOpen { retry_after_ms }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(phase: ReconnectPhase, attempts: u32) -> Self {
        Self::ReconnectExhausted { phase, attempts }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a server error.
    #[inline]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Creates a workflow rejected error.
    #[inline]
    pub fn workflow_rejected(adw_id: Option<String>, message: impl Into<String>) -> Self {
        Self::WorkflowRejected {
            adw_id,
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a request abandoned error.
    #[inline]
    pub fn request_abandoned(request_id: CorrelationId, resends: u32) -> Self {
        Self::RequestAbandoned {
            request_id,
            resends,
        }
    }

    /// Creates a health check error.
    #[inline]
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::NetworkOffline
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the circuit breaker rejected the attempt.
    #[inline]
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NetworkOffline
                | Self::CircuitOpen { .. }
                | Self::RequestTimeout { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing server host");
        assert_eq!(err.to_string(), "Configuration error: missing server host");
    }

    #[test]
    fn test_circuit_open_is_distinguishable() {
        let err = Error::circuit_open(1500);
        assert!(err.is_circuit_open());
        assert!(!Error::connection("refused").is_circuit_open());
        assert_eq!(err.to_string(), "Circuit breaker open, retry in 1500ms");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(CorrelationId::generate(), 30_000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::connection_timeout(1000).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
        assert!(!Error::reconnect_exhausted(ReconnectPhase::Startup, 3).is_recoverable());
    }

    #[test]
    fn test_exhausted_display_names_phase() {
        let err = Error::reconnect_exhausted(ReconnectPhase::Lifetime, 20);
        assert_eq!(
            err.to_string(),
            "Reconnect attempts exhausted (lifetime phase, 20 attempts)"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }
}
