//! Transport binding.
//!
//! This module owns the raw socket-like connection: open, send framed
//! text, receive framed text, close with a status code. The connection
//! manager only talks to the traits below, so tests swap in
//! [`MockTransport`](crate::testing::MockTransport) and production uses
//! [`TungsteniteTransport`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                      ┌──────────────────────┐
//! │  ConnectionManager   │                      │  ADW trigger server  │
//! │                      │      WebSocket       │                      │
//! │  link task           │◄────────────────────►│  /ws/trigger         │
//! │   FrameSink          │   host:port          │                      │
//! │   FrameStream        │                      │  GET /health         │
//! └──────────────────────┘                      └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `tungstenite` | `tokio-tungstenite` binding |
//! | `health` | HTTP `/health` probe |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP health probe.
pub mod health;

/// `tokio-tungstenite` transport binding.
pub mod tungstenite;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use health::{HealthProbe, HealthReport};
pub use tungstenite::TungsteniteTransport;

// ============================================================================
// Close Codes
// ============================================================================

/// Intentional closure. Never triggers reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Peer is going away (server restart). Reconnects.
pub const GOING_AWAY: u16 = 1001;

/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Closed by the client after the heartbeat went unanswered.
pub const HEARTBEAT_TIMEOUT: u16 = 4000;

// ============================================================================
// CloseReason
// ============================================================================

/// Close status code plus reason text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Reason text.
    pub reason: String,
}

impl CloseReason {
    /// Creates a close reason.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a normal (1000) close reason.
    #[inline]
    #[must_use]
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(NORMAL_CLOSURE, reason)
    }

    /// Returns `true` for an intentional closure.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text payload.
    Text(String),
    /// Close frame, with status if the peer sent one.
    Close(Option<CloseReason>),
}

// ============================================================================
// Traits
// ============================================================================

/// Write half of an open connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes a text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Sends a close frame.
    async fn close(&mut self, reason: CloseReason) -> Result<()>;
}

/// Read half of an open connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Returns the next frame, `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// An open connection split into its halves.
pub struct TransportLink {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub stream: Box<dyn FrameStream>,
}

/// Opens connections to a URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns a connection or WebSocket error if the handshake fails.
    async fn open(&self, url: &Url) -> Result<TransportLink>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_cleanliness() {
        assert!(CloseReason::normal("bye").is_clean());
        assert!(!CloseReason::new(GOING_AWAY, "restart").is_clean());
        assert!(!CloseReason::new(HEARTBEAT_TIMEOUT, "stale").is_clean());
    }
}
