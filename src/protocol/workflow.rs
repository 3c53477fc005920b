//! ADW payload types.
//!
//! Shapes of the `data` object for the message kinds the client
//! interprets. Everything else is forwarded as raw JSON.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::CorrelationId;

// ============================================================================
// TriggerWorkflow
// ============================================================================

/// Request to start a workflow for a board card.
///
/// # Format
///
/// ```json
/// {
///   "type": "trigger_workflow",
///   "data": {
///     "request_id": "uuid",
///     "workflow_type": "adw_plan_build",
///     "adw_id": "a1b2c3d4",
///     "issue_number": "42",
///     "model_set": "base"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerWorkflow {
    /// Correlation id, stamped by the client before sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<CorrelationId>,

    /// Workflow to run (e.g. `adw_plan_build_test`).
    pub workflow_type: String,

    /// Existing ADW id to continue, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adw_id: Option<String>,

    /// Issue / card number the workflow works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<String>,

    /// Issue classification (`feature`, `bug`, `chore`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,

    /// Model set selector (`base`, `heavy`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_set: Option<String>,

    /// Full card content forwarded to the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_json: Option<Value>,

    /// Free-form reason recorded with the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_reason: Option<String>,
}

impl TriggerWorkflow {
    /// Creates a trigger for the given workflow type.
    #[must_use]
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self {
            request_id: None,
            workflow_type: workflow_type.into(),
            adw_id: None,
            issue_number: None,
            issue_type: None,
            model_set: None,
            issue_json: None,
            trigger_reason: None,
        }
    }

    /// Sets the ADW id.
    #[inline]
    #[must_use]
    pub fn with_adw_id(mut self, adw_id: impl Into<String>) -> Self {
        self.adw_id = Some(adw_id.into());
        self
    }

    /// Sets the issue number.
    #[inline]
    #[must_use]
    pub fn with_issue_number(mut self, issue_number: impl Into<String>) -> Self {
        self.issue_number = Some(issue_number.into());
        self
    }

    /// Sets the issue type.
    #[inline]
    #[must_use]
    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = Some(issue_type.into());
        self
    }

    /// Sets the model set.
    #[inline]
    #[must_use]
    pub fn with_model_set(mut self, model_set: impl Into<String>) -> Self {
        self.model_set = Some(model_set.into());
        self
    }

    /// Attaches the card content.
    #[inline]
    #[must_use]
    pub fn with_issue_json(mut self, issue_json: Value) -> Self {
        self.issue_json = Some(issue_json);
        self
    }

    /// Sets the trigger reason.
    #[inline]
    #[must_use]
    pub fn with_trigger_reason(mut self, reason: impl Into<String>) -> Self {
        self.trigger_reason = Some(reason.into());
        self
    }

    /// Returns a copy stamped with a correlation id.
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, request_id: CorrelationId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

// ============================================================================
// TriggerResponse
// ============================================================================

/// Server acknowledgment of a [`TriggerWorkflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// Correlation id echoed by the server, if it echoes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<CorrelationId>,

    /// `accepted`, `rejected`, or `error`.
    pub status: String,

    /// ADW id assigned to the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adw_id: Option<String>,

    /// Resolved workflow name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,

    /// Human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Where the server writes the run logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_path: Option<String>,

    /// Error detail when not accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerResponse {
    /// Returns `true` if the server accepted the workflow.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        match self.status.as_str() {
            "accepted" => true,
            "error" | "rejected" => false,
            _ => self.error.is_none(),
        }
    }

    /// Best available description of why the trigger was not accepted.
    #[must_use]
    pub fn rejection_reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("status {}", self.status))
    }
}

// ============================================================================
// StatusUpdate
// ============================================================================

/// Progress notification for a running workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub adw_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

// ============================================================================
// WorkflowLog
// ============================================================================

/// One log line emitted by a running workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub adw_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

// ============================================================================
// ServerError
// ============================================================================

/// Error frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Correlation id of the request that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<CorrelationId>,

    /// Error description.
    #[serde(alias = "error")]
    pub message: String,

    /// Machine readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ============================================================================
// Ping / Pong
// ============================================================================

/// Keep-alive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Milliseconds since the Unix epoch when the ping was created.
    pub timestamp: u64,
}

impl Ping {
    /// Creates a ping stamped with the current wall clock.
    #[must_use]
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self { timestamp }
    }
}

/// Keep-alive reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pong {
    /// Echoed ping timestamp, when the server echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{from_value, json, to_value};

    #[test]
    fn test_trigger_omits_unset_fields() {
        let trigger = TriggerWorkflow::new("adw_plan_build").with_issue_number("42");
        let value = to_value(&trigger).expect("serialize");
        assert_eq!(
            value,
            json!({ "workflow_type": "adw_plan_build", "issue_number": "42" })
        );
    }

    #[test]
    fn test_trigger_carries_request_id() {
        let id = CorrelationId::generate();
        let trigger = TriggerWorkflow::new("adw_plan").with_request_id(id);
        let value = to_value(&trigger).expect("serialize");
        assert_eq!(value["request_id"], id.to_string());
    }

    #[test]
    fn test_response_acceptance() {
        let accepted: TriggerResponse =
            from_value(json!({ "status": "accepted", "adw_id": "abc12345" })).expect("parse");
        assert!(accepted.is_accepted());

        let rejected: TriggerResponse =
            from_value(json!({ "status": "error", "error": "unknown workflow" })).expect("parse");
        assert!(!rejected.is_accepted());
        assert_eq!(rejected.rejection_reason(), "unknown workflow");

        let odd: TriggerResponse =
            from_value(json!({ "status": "queued", "error": "busy" })).expect("parse");
        assert!(!odd.is_accepted());
    }

    #[test]
    fn test_server_error_accepts_error_alias() {
        let err: ServerError = from_value(json!({ "error": "boom" })).expect("parse");
        assert_eq!(err.message, "boom");
        assert!(err.request_id.is_none());
    }

    #[test]
    fn test_status_update_parses_partial() {
        let update: StatusUpdate = from_value(json!({
            "adw_id": "abc12345",
            "status": "running",
            "progress_percent": 40.0
        }))
        .expect("parse");
        assert_eq!(update.progress_percent, Some(40.0));
        assert!(update.current_step.is_none());
    }

    #[test]
    fn test_ping_has_timestamp() {
        assert!(Ping::now().timestamp > 0);
    }
}
