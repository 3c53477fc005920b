//! Connection counters.

use std::time::Duration;

use tokio::time::Instant;

/// Cumulative counters over the manager's lifetime.
///
/// Connection-scoped fields (`connected_at`) are cleared on disconnect;
/// everything else accumulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetrics {
    /// Frames written to a live connection.
    pub messages_sent: u64,
    /// Writes that failed.
    pub send_failures: u64,
    /// Text frames received.
    pub messages_received: u64,
    /// Round trip of the most recent ping.
    pub last_latency: Option<Duration>,
    /// Open time of the current connection.
    pub connected_at: Option<Instant>,
    /// Successful opens.
    pub connections: u64,
    /// Closes of an established connection.
    pub disconnects: u64,
}

impl ConnectionMetrics {
    /// Time since the current connection opened.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|at| at.elapsed())
    }

    pub(crate) fn record_connected(&mut self, now: Instant) {
        self.connections += 1;
        self.connected_at = Some(now);
    }

    pub(crate) fn record_disconnected(&mut self) {
        self.disconnects += 1;
        self.connected_at = None;
    }
}
