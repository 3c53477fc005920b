//! Event routing.
//!
//! [`EventRouter`] is a generic typed publish/subscribe table;
//! the connection manager instantiates it with [`ConnectionEvent`].
//!
//! | Module | Description |
//! |--------|-------------|
//! | `router` | Listener table, duplicate suppression, owner index |
//! | `event` | `ConnectionEvent` and built-in event names |

// ============================================================================
// Submodules
// ============================================================================

/// Connection events.
pub mod event;

/// Publish/subscribe table.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ConnectionEvent, names};
pub use router::{EventRouter, Listener, listener};
