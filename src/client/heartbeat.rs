//! Keep-alive pings and staleness detection.
//!
//! A ping is sent every `heartbeat_interval` while the connection is open
//! and the host is visible. The monitor remembers the first ping that went
//! unanswered; once it is older than `heartbeat_timeout` the link is closed
//! with code 4000 and the normal reconnect path takes over.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

use crate::identifiers::ConnectionId;
use crate::transport::{CloseReason, HEARTBEAT_TIMEOUT};

use super::manager::ManagerInner;

// ============================================================================
// HeartbeatMonitor
// ============================================================================

#[derive(Default)]
struct HeartbeatState {
    task: Option<AbortHandle>,
    last_ping: Option<Instant>,
    awaiting_since: Option<Instant>,
}

/// Ping bookkeeping shared by the heartbeat task and the frame handler.
#[derive(Default)]
pub(crate) struct HeartbeatMonitor {
    state: Mutex<HeartbeatState>,
}

impl HeartbeatMonitor {
    pub(crate) fn is_running(&self) -> bool {
        self.state
            .lock()
            .task
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Installs a new task, aborting the previous one.
    pub(crate) fn replace(&self, task: AbortHandle) {
        let mut state = self.state.lock();
        if let Some(old) = state.task.replace(task) {
            old.abort();
        }
        state.last_ping = None;
        state.awaiting_since = None;
    }

    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
            debug!("Heartbeat stopped");
        }
        state.awaiting_since = None;
    }

    pub(crate) fn record_ping(&self, now: Instant) {
        let mut state = self.state.lock();
        state.last_ping = Some(now);
        state.awaiting_since.get_or_insert(now);
    }

    /// Clears the unanswered marker and returns the round trip.
    pub(crate) fn record_pong(&self, now: Instant) -> Option<Duration> {
        let mut state = self.state.lock();
        state.awaiting_since = None;
        state.last_ping.map(|sent| now.saturating_duration_since(sent))
    }

    pub(crate) fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.state
            .lock()
            .awaiting_since
            .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
    }
}

// ============================================================================
// Heartbeat Task
// ============================================================================

pub(crate) async fn run(
    inner: Weak<ManagerInner>,
    connection_id: ConnectionId,
    period: Duration,
    timeout: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let now = Instant::now();
        if inner.heartbeat.is_stale(now, timeout) {
            warn!(%connection_id, timeout_ms = timeout.as_millis() as u64, "Heartbeat timed out");
            inner.close_link(
                connection_id,
                CloseReason::new(HEARTBEAT_TIMEOUT, "Heartbeat timeout"),
            );
            break;
        }

        inner.heartbeat.record_ping(now);
        if !inner.send_ping(connection_id) {
            break;
        }
        trace!(%connection_id, "Ping sent");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_staleness_tracks_first_unanswered_ping() {
        let monitor = HeartbeatMonitor::default();
        let timeout = Duration::from_secs(30);

        monitor.record_ping(Instant::now());
        tokio::time::advance(Duration::from_secs(15)).await;
        monitor.record_ping(Instant::now());
        assert!(!monitor.is_stale(Instant::now(), timeout));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(monitor.is_stale(Instant::now(), timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_clears_and_measures() {
        let monitor = HeartbeatMonitor::default();
        monitor.record_ping(Instant::now());
        tokio::time::advance(Duration::from_millis(40)).await;

        assert_eq!(
            monitor.record_pong(Instant::now()),
            Some(Duration::from_millis(40))
        );
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!monitor.is_stale(Instant::now(), Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_stop_aborts_task() {
        let monitor = HeartbeatMonitor::default();
        let task = tokio::spawn(std::future::pending::<()>());
        monitor.replace(task.abort_handle());
        assert!(monitor.is_running());

        monitor.stop();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!monitor.is_running());
    }
}
