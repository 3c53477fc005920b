//! WebSocket protocol message types.
//!
//! Every frame in either direction is a JSON [`Envelope`]:
//!
//! ```json
//! { "type": "<kind>", "data": { ... } }
//! ```
//!
//! # Protocol Overview
//!
//! | Kind | Direction | Purpose |
//! |------|-----------|---------|
//! | `ping` | Client → Server | Keep-alive |
//! | `pong` | Server → Client | Keep-alive reply, latency sample |
//! | `trigger_workflow` | Client → Server | Correlated workflow request |
//! | `trigger_response` | Server → Client | Accept / reject of a trigger |
//! | `status_update` | Server → Client | Workflow progress |
//! | `workflow_log` | Server → Client | Workflow log line |
//! | `error` | Server → Client | Server error, optionally correlated |
//! | `agent_log`, `thinking_block`, `tool_use_pre`, ... | Server → Client | Telemetry, forwarded as-is |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Wire envelope and kind constants |
//! | `message` | Inbound / outbound message enums |
//! | `workflow` | ADW payload structs |

// ============================================================================
// Submodules
// ============================================================================

/// Wire envelope and message kinds.
pub mod envelope;

/// Typed inbound and outbound messages.
pub mod message;

/// ADW payload types.
pub mod workflow;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, kinds};
pub use message::{InboundMessage, OutboundMessage};
pub use workflow::{
    Ping, Pong, ServerError, StatusUpdate, TriggerResponse, TriggerWorkflow, WorkflowLog,
};
