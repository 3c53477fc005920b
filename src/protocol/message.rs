//! Typed inbound and outbound messages.
//!
//! Inbound frames are decoded into an [`Envelope`] first; only the kinds
//! the client acts on are decoded further. Outbound messages are built
//! typed and converted to an envelope at write time.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::CorrelationId;

use super::envelope::{Envelope, kinds};
use super::workflow::{
    Ping, Pong, ServerError, StatusUpdate, TriggerResponse, TriggerWorkflow, WorkflowLog,
};

// ============================================================================
// InboundMessage
// ============================================================================

/// A server → client message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Acknowledgment of a workflow trigger.
    TriggerResponse(TriggerResponse),
    /// Workflow progress.
    StatusUpdate(StatusUpdate),
    /// Workflow log line.
    WorkflowLog(WorkflowLog),
    /// Server error.
    Error(ServerError),
    /// Keep-alive reply.
    Pong(Pong),
    /// Any other kind, forwarded uninterpreted.
    Telemetry {
        /// Envelope `type`.
        kind: String,
        /// Envelope `data`.
        data: Value,
    },
}

impl InboundMessage {
    /// Interprets an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`](crate::Error::Protocol) if a known kind
    /// carries a payload of the wrong shape.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let message = match envelope.kind.as_str() {
            kinds::TRIGGER_RESPONSE => Self::TriggerResponse(envelope.data_as()?),
            kinds::STATUS_UPDATE => Self::StatusUpdate(envelope.data_as()?),
            kinds::WORKFLOW_LOG => Self::WorkflowLog(envelope.data_as()?),
            kinds::ERROR => Self::Error(envelope.data_as()?),
            kinds::PONG if envelope.data.is_null() => Self::Pong(Pong::default()),
            kinds::PONG => Self::Pong(envelope.data_as()?),
            _ => Self::Telemetry {
                kind: envelope.kind.clone(),
                data: envelope.data.clone(),
            },
        };
        Ok(message)
    }

    /// Returns the envelope kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::TriggerResponse(_) => kinds::TRIGGER_RESPONSE,
            Self::StatusUpdate(_) => kinds::STATUS_UPDATE,
            Self::WorkflowLog(_) => kinds::WORKFLOW_LOG,
            Self::Error(_) => kinds::ERROR,
            Self::Pong(_) => kinds::PONG,
            Self::Telemetry { kind, .. } => kind,
        }
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A client → server message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Keep-alive.
    Ping(Ping),
    /// Correlated workflow request.
    TriggerWorkflow(TriggerWorkflow),
    /// Arbitrary envelope.
    Custom(Envelope),
}

impl OutboundMessage {
    /// Creates a custom message.
    #[inline]
    #[must_use]
    pub fn custom(kind: impl Into<String>, data: Value) -> Self {
        Self::Custom(Envelope::new(kind, data))
    }

    /// Returns the envelope kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping(_) => kinds::PING,
            Self::TriggerWorkflow(_) => kinds::TRIGGER_WORKFLOW,
            Self::Custom(envelope) => &envelope.kind,
        }
    }

    /// Returns the correlation id of a stamped trigger.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::TriggerWorkflow(trigger) => trigger.request_id,
            _ => None,
        }
    }

    /// Converts to a wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_envelope(&self) -> Result<Envelope> {
        match self {
            Self::Ping(ping) => Envelope::from_payload(kinds::PING, ping),
            Self::TriggerWorkflow(trigger) => {
                Envelope::from_payload(kinds::TRIGGER_WORKFLOW, trigger)
            }
            Self::Custom(envelope) => Ok(envelope.clone()),
        }
    }

    /// Serializes to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        self.to_envelope()?.encode()
    }
}

impl From<Envelope> for OutboundMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Custom(envelope)
    }
}

impl From<TriggerWorkflow> for OutboundMessage {
    fn from(trigger: TriggerWorkflow) -> Self {
        Self::TriggerWorkflow(trigger)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::Error;

    #[test]
    fn test_known_kinds_are_typed() {
        let env = Envelope::new(
            kinds::TRIGGER_RESPONSE,
            json!({ "status": "accepted", "adw_id": "abc12345" }),
        );
        let message = InboundMessage::from_envelope(&env).expect("typed");
        assert!(matches!(message, InboundMessage::TriggerResponse(ref r) if r.is_accepted()));
        assert_eq!(message.kind(), "trigger_response");
    }

    #[test]
    fn test_telemetry_is_forwarded_raw() {
        let env = Envelope::new(kinds::THINKING_BLOCK, json!({ "text": "hmm" }));
        let message = InboundMessage::from_envelope(&env).expect("telemetry");
        assert_eq!(
            message,
            InboundMessage::Telemetry {
                kind: "thinking_block".into(),
                data: json!({ "text": "hmm" }),
            }
        );
    }

    #[test]
    fn test_bare_pong() {
        let env = Envelope::new(kinds::PONG, Value::Null);
        let message = InboundMessage::from_envelope(&env).expect("pong");
        assert_eq!(message, InboundMessage::Pong(Pong::default()));
    }

    #[test]
    fn test_malformed_known_kind_is_protocol_error() {
        let env = Envelope::new(kinds::STATUS_UPDATE, json!({ "progress_percent": 1 }));
        let err = InboundMessage::from_envelope(&env).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_outbound_trigger_encodes() {
        let id = CorrelationId::generate();
        let message: OutboundMessage = TriggerWorkflow::new("adw_plan").with_request_id(id).into();
        assert_eq!(message.correlation_id(), Some(id));

        let env = message.to_envelope().expect("envelope");
        assert_eq!(env.kind, "trigger_workflow");
        assert_eq!(env.data["workflow_type"], "adw_plan");
        assert_eq!(env.data["request_id"], id.to_string());
    }

    #[test]
    fn test_outbound_custom_passes_through() {
        let message = OutboundMessage::custom("subscribe", json!({ "adw_id": "x" }));
        assert_eq!(message.kind(), "subscribe");
        assert!(message.correlation_id().is_none());
        assert_eq!(
            message.encode().expect("encode"),
            r#"{"type":"subscribe","data":{"adw_id":"x"}}"#
        );
    }
}
