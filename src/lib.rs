//! ADW trigger client - resilient WebSocket connection manager.
//!
//! This library keeps a long-lived WebSocket connection to an ADW trigger
//! server and survives server restarts, network drops and hidden hosts
//! without losing user actions.
//!
//! # Architecture
//!
//! - **Connection manager**: single facade owning the lifecycle state machine
//! - **Resilience**: circuit breaker plus exponential backoff with jitter
//! - **Message queue**: bounded FIFO replayed in order on reconnect
//! - **Correlation**: trigger requests resolved by their `trigger_response`
//! - **Event router**: typed listeners keyed by event name
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}` sent over
//! `ws(s)://host:port/ws/trigger`.
//!
//! # Quick Start
//!
//! ```no_run
//! use adw_trigger_client::{ConnectionEvent, ConnectionManager, Result, TriggerWorkflow, listener};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = ConnectionManager::builder()
//!         .host("localhost")
//!         .port(8002)
//!         .build()?;
//!
//!     manager.on("status_update", listener(|event: &ConnectionEvent| {
//!         println!("{event:?}");
//!     }));
//!
//!     manager.connect().await?;
//!     let response = manager
//!         .trigger_workflow(TriggerWorkflow::new("adw_plan_build").with_issue_number("42"))
//!         .await?;
//!     println!("started {:?}", response.adw_id);
//!
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ConnectionManager`], options, queue, correlator |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | [`EventRouter`] and [`ConnectionEvent`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Envelope and ADW message types |
//! | [`resilience`] | Circuit breaker and reconnect scheduling |
//! | [`testing`] | In-memory transport for tests |
//! | [`transport`] | WebSocket transport and health probe |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and its moving parts.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Typed publish/subscribe.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Circuit breaker and reconnect policy.
pub mod resilience;

/// In-memory transport for deterministic tests.
pub mod testing;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ChannelEnvironment, ConnectionManager, ConnectionManagerBuilder, ConnectionMetrics,
    ConnectionOptions, ConnectionState, ConnectionStatus, Delivery, Environment,
    HeadlessEnvironment, LivenessHooks, LivenessSender, LivenessSignal, Scheme,
};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{ConnectionEvent, EventRouter, Listener, listener};

// Identifier types
pub use identifiers::{ConnectionId, CorrelationId, ListenerId, OwnerId};

// Protocol types
pub use protocol::{
    Envelope, InboundMessage, OutboundMessage, ServerError, StatusUpdate, TriggerResponse,
    TriggerWorkflow, WorkflowLog,
};

// Resilience types
pub use resilience::{CircuitBreakerConfig, CircuitState, ReconnectPhase, ReconnectPolicy};

// Transport types
pub use transport::{HealthReport, TungsteniteTransport};
