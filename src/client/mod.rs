//! Connection manager and its moving parts.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | [`ConnectionManager`] facade and state machine |
//! | `builder` | [`ConnectionManagerBuilder`] |
//! | `options` | [`ConnectionOptions`], URL derivation, environment loading |
//! | `queue` | Bounded replay queue |
//! | `correlator` | Request/response correlation for trigger requests |
//! | `link` | Per-connection event loop |
//! | `heartbeat` | Keep-alive pings and staleness detection |
//! | `liveness` | Host visibility and network signals |

// ============================================================================
// Submodules
// ============================================================================

pub mod builder;
pub mod correlator;
pub mod liveness;
pub mod manager;
pub mod metrics;
pub mod options;
pub mod queue;
pub mod state;

mod heartbeat;
mod link;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionManagerBuilder;
pub use correlator::{RequestCorrelator, ResponseReceiver, SweepOutcome};
pub use link::Delivery;
pub use liveness::{
    ChannelEnvironment, Environment, HeadlessEnvironment, LivenessHooks, LivenessSender,
    LivenessSignal,
};
pub use manager::ConnectionManager;
pub use metrics::ConnectionMetrics;
pub use options::{ConnectionOptions, Scheme};
pub use queue::{MessageQueue, QueuedMessage, RequeueOutcome};
pub use state::{ConnectionState, ConnectionStatus};
