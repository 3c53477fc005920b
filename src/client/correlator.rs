//! Request/response correlation for trigger requests.
//!
//! Each outstanding request owns a oneshot sender and a timer task. The
//! first of {matching response, matching error, timeout, abandonment}
//! removes the entry, cancels the timer and completes the caller.
//!
//! When the connection drops, entries that were already written are
//! swept: their timers stop and, with queuing enabled, their payloads come
//! back with a fresh correlation id for replay while the caller keeps
//! waiting on the same receiver.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{ServerError, TriggerResponse, TriggerWorkflow};

// ============================================================================
// Types
// ============================================================================

/// Receiver completed with the request outcome.
pub type ResponseReceiver = oneshot::Receiver<Result<TriggerResponse>>;

struct PendingRequest {
    tx: oneshot::Sender<Result<TriggerResponse>>,
    payload: TriggerWorkflow,
    timeout: Duration,
    /// Registration order, used when a response carries no id.
    seq: u64,
    resends: u32,
    in_flight: bool,
    timer: Option<Timer>,
}

struct Timer {
    token: u64,
    handle: AbortHandle,
}

impl PendingRequest {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    fn complete(mut self, result: Result<TriggerResponse>) {
        self.cancel_timer();
        let _ = self.tx.send(result);
    }
}

#[derive(Default)]
struct PendingTable {
    entries: FxHashMap<CorrelationId, PendingRequest>,
    next_seq: u64,
    next_token: u64,
}

impl PendingTable {
    /// Oldest written request, or the oldest overall if none was written.
    fn oldest(&self) -> Option<CorrelationId> {
        let oldest_where = |in_flight_only: bool| {
            self.entries
                .iter()
                .filter(|(_, p)| !in_flight_only || p.in_flight)
                .min_by_key(|(_, p)| p.seq)
                .map(|(id, _)| *id)
        };
        oldest_where(true).or_else(|| oldest_where(false))
    }

    fn lookup(&self, request_id: Option<CorrelationId>) -> Option<CorrelationId> {
        match request_id {
            Some(id) => self.entries.contains_key(&id).then_some(id),
            None => self.oldest(),
        }
    }
}

// ============================================================================
// SweepOutcome
// ============================================================================

/// What a disconnect sweep did.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Payloads to re-queue, already stamped with fresh ids.
    pub resend: Vec<TriggerWorkflow>,
    /// Requests rejected with `ConnectionClosed`.
    pub rejected: usize,
    /// Requests rejected with `RequestAbandoned`.
    pub abandoned: usize,
}

// ============================================================================
// RequestCorrelator
// ============================================================================

/// Table of outstanding trigger requests.
pub struct RequestCorrelator {
    table: Arc<Mutex<PendingTable>>,
    max_pending: usize,
}

impl RequestCorrelator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(PendingTable::default())),
            max_pending,
        }
    }

    /// Registers a request and arms its timer.
    ///
    /// Keeps a caller-supplied `request_id` unless it is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `max_pending` requests are outstanding.
    pub fn register(
        &self,
        mut request: TriggerWorkflow,
        timeout: Duration,
    ) -> Result<(TriggerWorkflow, ResponseReceiver)> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.table.lock();

        if table.entries.len() >= self.max_pending {
            warn!(
                pending = table.entries.len(),
                max = self.max_pending,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                table.entries.len(),
                self.max_pending
            )));
        }

        let id = match request.request_id {
            Some(id) if !table.entries.contains_key(&id) => id,
            _ => CorrelationId::generate(),
        };
        request.request_id = Some(id);

        let seq = table.next_seq;
        table.next_seq += 1;
        let timer = self.arm(&mut table, id, timeout);

        table.entries.insert(
            id,
            PendingRequest {
                tx,
                payload: request.clone(),
                timeout,
                seq,
                resends: 0,
                in_flight: false,
                timer: Some(timer),
            },
        );

        debug!(request_id = %id, workflow = %request.workflow_type, "Request registered");
        Ok((request, rx))
    }

    /// Marks a request as written; re-arms a timer stopped by a sweep.
    pub fn mark_sent(&self, id: CorrelationId) {
        let mut table = self.table.lock();
        let Some(timeout) = table.entries.get_mut(&id).map(|entry| {
            entry.in_flight = true;
            entry.timer.is_none().then_some(entry.timeout)
        }) else {
            return;
        };

        if let Some(timeout) = timeout {
            let timer = self.arm(&mut table, id, timeout);
            if let Some(entry) = table.entries.get_mut(&id) {
                entry.timer = Some(timer);
            }
        }
    }

    /// Completes the request a `trigger_response` belongs to.
    ///
    /// Returns `false` if no pending request matches.
    pub fn resolve(&self, response: TriggerResponse) -> bool {
        let Some(entry) = self.take(response.request_id) else {
            debug!(request_id = ?response.request_id, "Unmatched trigger response");
            return false;
        };

        if response.is_accepted() {
            entry.complete(Ok(response));
        } else {
            let reason = response.rejection_reason();
            entry.complete(Err(Error::workflow_rejected(response.adw_id, reason)));
        }
        true
    }

    /// Fails the request a server `error` frame belongs to.
    pub fn reject(&self, error: &ServerError) -> bool {
        let Some(entry) = self.take(error.request_id) else {
            return false;
        };
        entry.complete(Err(Error::server(error.message.clone())));
        true
    }

    /// Rejects a request whose payload was lost from the queue.
    pub fn abandon(&self, id: CorrelationId) -> bool {
        let Some(entry) = self.table.lock().entries.remove(&id) else {
            return false;
        };
        warn!(request_id = %id, resends = entry.resends, "Request abandoned");
        let resends = entry.resends;
        entry.complete(Err(Error::request_abandoned(id, resends)));
        true
    }

    /// Removes a request without completing it.
    pub fn discard(&self, id: CorrelationId) {
        if let Some(mut entry) = self.table.lock().entries.remove(&id) {
            entry.cancel_timer();
        }
    }

    /// Handles a dropped connection.
    ///
    /// Only written requests are touched; queued ones keep waiting for
    /// their replay.
    pub fn sweep(&self, requeue: bool, max_resends: u32) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut table = self.table.lock();

        let swept: Vec<CorrelationId> = table
            .entries
            .iter()
            .filter(|(_, p)| p.in_flight)
            .map(|(id, _)| *id)
            .collect();

        for id in swept {
            let Some(mut entry) = table.entries.remove(&id) else {
                continue;
            };

            if !requeue {
                entry.complete(Err(Error::ConnectionClosed));
                outcome.rejected += 1;
                continue;
            }

            if entry.resends >= max_resends {
                let resends = entry.resends;
                entry.complete(Err(Error::request_abandoned(id, resends)));
                outcome.abandoned += 1;
                continue;
            }

            entry.cancel_timer();
            entry.resends += 1;
            entry.in_flight = false;

            let fresh = CorrelationId::generate();
            entry.payload.request_id = Some(fresh);
            outcome.resend.push(entry.payload.clone());
            table.entries.insert(fresh, entry);
        }

        if !outcome.resend.is_empty() || outcome.rejected > 0 || outcome.abandoned > 0 {
            debug!(
                resend = outcome.resend.len(),
                rejected = outcome.rejected,
                abandoned = outcome.abandoned,
                "Swept pending requests"
            );
        }
        outcome
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.table.lock().entries.contains_key(&id)
    }

    fn take(&self, request_id: Option<CorrelationId>) -> Option<PendingRequest> {
        let mut table = self.table.lock();
        let id = table.lookup(request_id)?;
        table.entries.remove(&id)
    }

    fn arm(&self, table: &mut PendingTable, id: CorrelationId, timeout: Duration) -> Timer {
        let token = table.next_token;
        table.next_token += 1;

        let shared = Arc::clone(&self.table);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut table = shared.lock();
            let current = table
                .entries
                .get(&id)
                .and_then(|p| p.timer.as_ref())
                .is_some_and(|t| t.token == token);
            if !current {
                return;
            }
            if let Some(mut entry) = table.entries.remove(&id) {
                drop(table);
                entry.timer = None;
                debug!(request_id = %id, "Request timed out");
                let _ = entry
                    .tx
                    .send(Err(Error::request_timeout(id, timeout.as_millis() as u64)));
            }
        })
        .abort_handle();

        Timer { token, handle }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    fn trigger() -> TriggerWorkflow {
        TriggerWorkflow::new("adw_plan_build").with_issue_number("42")
    }

    fn response(id: Option<CorrelationId>, status: &str) -> TriggerResponse {
        TriggerResponse {
            request_id: id,
            status: status.to_string(),
            adw_id: Some("abc12345".into()),
            workflow_name: None,
            message: None,
            logs_path: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_by_id() {
        let correlator = RequestCorrelator::new(10);
        let (stamped, rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let id = stamped.request_id.expect("stamped");

        assert!(correlator.resolve(response(Some(id), "accepted")));
        let reply = assert_ok!(rx.await.expect("completed"));
        assert_eq!(reply.adw_id.as_deref(), Some("abc12345"));
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let correlator = RequestCorrelator::new(10);
        let (_stamped, _rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        assert!(!correlator.resolve(response(Some(CorrelationId::generate()), "accepted")));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_resolves_oldest() {
        let correlator = RequestCorrelator::new(10);
        let (first, rx1) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let (_second, _rx2) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        assert!(correlator.resolve(response(None, "accepted")));
        assert_ok!(rx1.await.expect("completed"));
        assert!(!correlator.contains(first.request_id.expect("stamped")));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_prefers_written_request() {
        let correlator = RequestCorrelator::new(10);
        let (queued, _rx1) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let (written, rx2) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let written_id = written.request_id.expect("stamped");
        correlator.mark_sent(written_id);

        assert!(correlator.resolve(response(None, "accepted")));
        assert_ok!(rx2.await.expect("completed"));
        assert!(!correlator.contains(written_id));
        assert!(correlator.contains(queued.request_id.expect("stamped")));
    }

    #[tokio::test]
    async fn test_rejected_status_fails_caller() {
        let correlator = RequestCorrelator::new(10);
        let (stamped, rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        let mut reply = response(stamped.request_id, "rejected");
        reply.error = Some("unknown workflow".into());
        correlator.resolve(reply);

        let err = assert_err!(rx.await.expect("completed"));
        assert!(matches!(err, Error::WorkflowRejected { ref message, .. } if message == "unknown workflow"));
    }

    #[tokio::test]
    async fn test_server_error_rejects() {
        let correlator = RequestCorrelator::new(10);
        let (stamped, rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        let error = ServerError {
            request_id: stamped.request_id,
            message: "boom".into(),
            code: None,
        };
        assert!(correlator.reject(&error));
        assert!(matches!(rx.await.expect("completed"), Err(Error::Server { .. })));
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let correlator = RequestCorrelator::new(1);
        let (_stamped, _rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let err = assert_err!(correlator.register(trigger(), Duration::from_secs(30)));
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_entry() {
        let correlator = RequestCorrelator::new(10);
        let (stamped, rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(31)).await;
        let err = assert_err!(rx.await.expect("completed"));
        assert!(matches!(err, Error::RequestTimeout { request_id, timeout_ms: 30_000 }
            if Some(request_id) == stamped.request_id));
        assert!(correlator.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_without_queue_rejects_written() {
        let correlator = RequestCorrelator::new(10);
        let (sent, rx_sent) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let (_queued, _rx_queued) =
            assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        correlator.mark_sent(sent.request_id.expect("stamped"));

        let outcome = correlator.sweep(false, 3);
        assert_eq!(outcome.rejected, 1);
        assert!(outcome.resend.is_empty());
        assert!(matches!(rx_sent.await.expect("completed"), Err(Error::ConnectionClosed)));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_rekeys_and_pauses_timer() {
        let correlator = RequestCorrelator::new(10);
        let (sent, mut rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let original = sent.request_id.expect("stamped");
        correlator.mark_sent(original);

        let outcome = correlator.sweep(true, 3);
        assert_eq!(outcome.resend.len(), 1);
        let fresh = outcome.resend[0].request_id.expect("restamped");
        assert_ne!(fresh, original);
        assert!(correlator.contains(fresh));

        // Timer is stopped while the payload waits for a connection.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert!(correlator.contains(fresh));

        // Replay re-arms a full timeout.
        correlator.mark_sent(fresh);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(correlator.contains(fresh));
        assert!(correlator.resolve(response(Some(fresh), "accepted")));
        assert_ok!(rx.await.expect("completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_abandons_after_max_resends() {
        let correlator = RequestCorrelator::new(10);
        let (sent, rx) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let mut id = sent.request_id.expect("stamped");

        for _ in 0..2 {
            correlator.mark_sent(id);
            let outcome = correlator.sweep(true, 2);
            id = outcome.resend[0].request_id.expect("restamped");
        }

        correlator.mark_sent(id);
        let outcome = correlator.sweep(true, 2);
        assert_eq!(outcome.abandoned, 1);
        let err = assert_err!(rx.await.expect("completed"));
        assert!(matches!(err, Error::RequestAbandoned { resends: 2, .. }));
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_abandon_and_discard() {
        let correlator = RequestCorrelator::new(10);
        let (a, rx_a) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));
        let (b, mut rx_b) = assert_ok!(correlator.register(trigger(), Duration::from_secs(30)));

        assert!(correlator.abandon(a.request_id.expect("stamped")));
        assert!(matches!(
            rx_a.await.expect("completed"),
            Err(Error::RequestAbandoned { resends: 0, .. })
        ));

        correlator.discard(b.request_id.expect("stamped"));
        assert!(correlator.is_empty());
        assert!(rx_b.try_recv().is_err());
    }
}
