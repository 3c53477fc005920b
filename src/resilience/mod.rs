//! Connection resilience policies.
//!
//! Pure state machines with no I/O: the connection manager feeds them
//! outcomes and timestamps and acts on their decisions.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `circuit_breaker` | Blocks connection attempts after repeated failures |
//! | `reconnect` | Backoff with jitter plus lifetime and startup caps |

// ============================================================================
// Submodules
// ============================================================================

/// Circuit breaker.
pub mod circuit_breaker;

/// Reconnection scheduling.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use reconnect::{ReconnectDecision, ReconnectPhase, ReconnectPolicy, ReconnectScheduler};
