//! Wire envelope shared by both directions.
//!
//! # Format
//!
//! ```json
//! { "type": "status_update", "data": { ... } }
//! ```
//!
//! `data` defaults to `null` when the server omits it.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value, to_string, to_value};

use crate::error::{Error, Result};

// ============================================================================
// Message Kinds
// ============================================================================

/// Well-known values of the envelope `type` field.
pub mod kinds {
    /// Outbound keep-alive.
    pub const PING: &str = "ping";
    /// Inbound keep-alive reply.
    pub const PONG: &str = "pong";
    /// Outbound correlated workflow request.
    pub const TRIGGER_WORKFLOW: &str = "trigger_workflow";
    /// Inbound acknowledgment of a workflow trigger.
    pub const TRIGGER_RESPONSE: &str = "trigger_response";
    /// Inbound workflow progress.
    pub const STATUS_UPDATE: &str = "status_update";
    /// Inbound workflow log line.
    pub const WORKFLOW_LOG: &str = "workflow_log";
    /// Inbound server error.
    pub const ERROR: &str = "error";

    // Streaming telemetry, forwarded uninterpreted.
    pub const AGENT_LOG: &str = "agent_log";
    pub const THINKING_BLOCK: &str = "thinking_block";
    pub const TOOL_USE_PRE: &str = "tool_use_pre";
    pub const TOOL_USE_POST: &str = "tool_use_post";
    pub const FILE_CHANGED: &str = "file_changed";
    pub const HEARTBEAT: &str = "heartbeat";
}

// ============================================================================
// Envelope
// ============================================================================

/// A `{type, data}` protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind, see [`kinds`].
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope from a kind and raw data.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Creates an envelope by serializing a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn from_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(kind, to_value(payload)?))
    }

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not a JSON envelope.
    pub fn decode(text: &str) -> Result<Self> {
        from_str(text).map_err(|e| Error::protocol(format!("Unparseable frame: {e}")))
    }

    /// Serializes to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }

    /// Returns `true` if the envelope has the given kind.
    #[inline]
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Decodes `data` into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `data` does not match the payload shape.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        from_value(self.data.clone())
            .map_err(|e| Error::protocol(format!("Malformed {} payload: {e}", self.kind)))
    }
}

// ============================================================================
// Tests
// ============================================================================
