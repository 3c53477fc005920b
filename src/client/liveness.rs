//! Host liveness integration.
//!
//! An [`Environment`] tells the manager whether the host is currently
//! visible and may hand over a channel of [`LivenessSignal`]s. Hosts that
//! observe visibility or network changes themselves can instead call the
//! [`LivenessHooks`] methods on the manager directly.
//!
//! # Example
//!
//! ```ignore
//! use adw_trigger_client::{ChannelEnvironment, ConnectionManager, LivenessSignal};
//!
//! let (environment, signals) = ChannelEnvironment::new(true);
//! let manager = ConnectionManager::builder()
//!     .host("localhost")
//!     .environment(environment)
//!     .build()?;
//!
//! manager.connect().await?;
//! signals.send(LivenessSignal::VisibilityChanged { visible: false });
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// LivenessSignal
// ============================================================================

/// A change in the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSignal {
    /// The host became visible or hidden.
    VisibilityChanged { visible: bool },
    /// Network connectivity returned.
    NetworkOnline,
    /// Network connectivity was lost.
    NetworkOffline,
}

// ============================================================================
// Traits
// ============================================================================

/// Reactions to host liveness changes.
pub trait LivenessHooks {
    /// Pauses the heartbeat when hidden; resumes or reconnects when visible.
    fn on_visibility_change(&self, visible: bool);

    /// Resets the lifetime attempt counter and tries to reconnect at once.
    fn on_network_online(&self);

    /// Reports the outage to `error` listeners.
    fn on_network_offline(&self);
}

/// Source of the host's liveness state.
pub trait Environment: Send + Sync + 'static {
    /// Visibility at startup.
    fn is_visible(&self) -> bool {
        true
    }

    /// Hands over the signal channel. Called once, on first connect.
    fn signals(&self) -> Option<mpsc::UnboundedReceiver<LivenessSignal>> {
        None
    }
}

// ============================================================================
// HeadlessEnvironment
// ============================================================================

/// Always visible, never signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessEnvironment;

impl Environment for HeadlessEnvironment {}

// ============================================================================
// ChannelEnvironment
// ============================================================================

/// Environment fed by a [`LivenessSender`].
#[derive(Debug)]
pub struct ChannelEnvironment {
    visible: bool,
    rx: Mutex<Option<mpsc::UnboundedReceiver<LivenessSignal>>>,
}

impl ChannelEnvironment {
    /// Creates the environment and the handle that feeds it.
    #[must_use]
    pub fn new(visible: bool) -> (Self, LivenessSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let environment = Self {
            visible,
            rx: Mutex::new(Some(rx)),
        };
        (environment, LivenessSender { tx })
    }
}

impl Environment for ChannelEnvironment {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn signals(&self) -> Option<mpsc::UnboundedReceiver<LivenessSignal>> {
        self.rx.lock().take()
    }
}

/// Pushes signals into a [`ChannelEnvironment`].
#[derive(Debug, Clone)]
pub struct LivenessSender {
    tx: mpsc::UnboundedSender<LivenessSignal>,
}

impl LivenessSender {
    /// Sends a signal. Returns `false` once the manager is gone.
    pub fn send(&self, signal: LivenessSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_defaults() {
        let environment = HeadlessEnvironment;
        assert!(environment.is_visible());
        assert!(environment.signals().is_none());
    }

    #[tokio::test]
    async fn test_channel_hands_over_once() {
        let (environment, sender) = ChannelEnvironment::new(false);
        assert!(!environment.is_visible());

        let mut rx = environment.signals().expect("first call");
        assert!(environment.signals().is_none());

        assert!(sender.send(LivenessSignal::NetworkOnline));
        assert_eq!(rx.recv().await, Some(LivenessSignal::NetworkOnline));

        drop(rx);
        assert!(!sender.send(LivenessSignal::NetworkOffline));
    }
}
