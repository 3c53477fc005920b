//! Connection manager facade and state machine.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ─connect()─→ Connecting ─open─→ Connected
//! Connected ─abnormal close─→ Reconnecting ─open─→ Connected
//! Connected ─clean close / disconnect()─→ Disconnected
//! Reconnecting ─attempts exhausted─→ Disconnected
//! ```
//!
//! # Locking
//!
//! Mutexes are never held across an `.await`. When more than one is
//! taken the order is `connect_slot → state → queue → correlator`.
//! Listeners always run with no lock held.

// ============================================================================
// Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, EventRouter, Listener};
use crate::identifiers::{ConnectionId, ListenerId, OwnerId};
use crate::protocol::{
    Envelope, InboundMessage, OutboundMessage, Ping, TriggerResponse, TriggerWorkflow,
};
use crate::resilience::{CircuitBreaker, ReconnectDecision, ReconnectScheduler};
use crate::transport::{CloseReason, HealthProbe, HealthReport, Transport, TransportLink};

use super::builder::ConnectionManagerBuilder;
use super::correlator::RequestCorrelator;
use super::heartbeat::{self, HeartbeatMonitor};
use super::link::{self, Delivery, LinkCommand, LinkHandle, Origin};
use super::liveness::{Environment, LivenessHooks, LivenessSignal};
use super::metrics::ConnectionMetrics;
use super::options::ConnectionOptions;
use super::queue::{MessageQueue, QueuedMessage, RequeueOutcome};
use super::state::{ConnectionState, ConnectionStatus};

// ============================================================================
// Types
// ============================================================================

type ConnectFuture = Shared<BoxFuture<'static, Result<()>>>;

struct LinkSlot {
    state: ConnectionState,
    link: Option<LinkHandle>,
    /// Set by `disconnect()`, cleared by `connect()`.
    manual_disconnect: bool,
}

struct ReconnectTimer {
    token: u64,
    handle: AbortHandle,
}

#[derive(Clone, Copy)]
enum TimerAction {
    Attempt,
    Reschedule,
}

enum Route {
    Written(oneshot::Receiver<Result<Delivery>>),
    Queued(Option<QueuedMessage>),
}

// ============================================================================
// ManagerInner
// ============================================================================

pub(crate) struct ManagerInner {
    options: ConnectionOptions,
    socket_url: Url,
    transport: Arc<dyn Transport>,
    environment: Box<dyn Environment>,
    health: HealthProbe,

    slot: Mutex<LinkSlot>,
    breaker: Mutex<CircuitBreaker>,
    scheduler: Mutex<ReconnectScheduler>,
    queue: Mutex<MessageQueue>,
    correlator: RequestCorrelator,
    router: EventRouter<ConnectionEvent>,
    metrics: Mutex<ConnectionMetrics>,
    pub(crate) heartbeat: HeartbeatMonitor,

    visible: AtomicBool,
    liveness_started: AtomicBool,
    connect_slot: Mutex<Option<ConnectFuture>>,
    reconnect_timer: Mutex<Option<ReconnectTimer>>,
    next_timer_token: AtomicU64,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.reconnect_timer.get_mut().take() {
            timer.handle.abort();
        }
        self.heartbeat.stop();
    }
}

// ----------------------------------------------------------------------------
// Connecting
// ----------------------------------------------------------------------------

impl ManagerInner {
    /// Returns the in-flight attempt or starts a new one.
    fn begin_connect(self: &Arc<Self>, manual: bool) -> Result<ConnectFuture> {
        let mut connect_slot = self.connect_slot.lock();
        if let Some(pending) = connect_slot.as_ref() {
            return Ok(pending.clone());
        }

        let now = Instant::now();
        {
            let mut breaker = self.breaker.lock();
            if breaker.is_open(now) {
                let retry_after = breaker.retry_after(now);
                debug!(retry_after_ms = retry_after.as_millis() as u64, "Circuit open, attempt rejected");
                return Err(Error::circuit_open(retry_after.as_millis() as u64));
            }
            breaker.begin_attempt();
        }

        if manual {
            self.scheduler.lock().reset_for_manual();
            self.cancel_reconnect_timer();
        }

        {
            let mut slot = self.slot.lock();
            if slot.state != ConnectionState::Reconnecting {
                slot.state = ConnectionState::Connecting;
            }
        }

        let this = Arc::clone(self);
        let attempt = tokio::spawn(async move {
            match AssertUnwindSafe(Arc::clone(&this).open_connection())
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => this.handle_connect_panic(),
            }
        })
        .map(|joined| {
            joined.unwrap_or_else(|e| Err(Error::connection(format!("connect task failed: {e}"))))
        })
        .boxed()
        .shared();

        *connect_slot = Some(attempt.clone());
        Ok(attempt)
    }

    /// Releases the attempt slot after the transport panicked mid-open.
    fn handle_connect_panic(self: &Arc<Self>) -> Result<()> {
        self.connect_slot.lock().take();
        let err = Error::connection("connect task panicked");
        self.handle_connect_failure(err.clone());
        Err(err)
    }

    async fn open_connection(self: Arc<Self>) -> Result<()> {
        debug!(url = %self.socket_url, "Opening connection");

        let opened = match timeout(self.options.connect_timeout, self.transport.open(&self.socket_url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::connection_timeout(
                self.options.connect_timeout.as_millis() as u64,
            )),
        };

        match opened {
            Ok(link) => {
                let result = self.install_link(link);
                self.connect_slot.lock().take();
                result
            }
            Err(err) => {
                self.connect_slot.lock().take();
                self.handle_connect_failure(err.clone());
                Err(err)
            }
        }
    }

    fn handle_connect_failure(self: &Arc<Self>, err: Error) {
        self.breaker.lock().record_failure(Instant::now());
        warn!(error = %err, "Connection attempt failed");

        let will_retry = {
            let mut slot = self.slot.lock();
            let retry = self.options.auto_reconnect && !slot.manual_disconnect;
            slot.state = if retry {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
            retry
        };

        self.emit(ConnectionEvent::Error(err));
        if will_retry {
            self.schedule_reconnect();
        }
    }

    /// Publishes a freshly opened transport and replays the queue.
    fn install_link(self: &Arc<Self>, link: TransportLink) -> Result<()> {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        let replayed = {
            let mut slot = self.slot.lock();
            if slot.manual_disconnect {
                drop(slot);
                debug!(connection_id = %id, "Disconnected while opening, closing new link");
                self.breaker.lock().record_success();
                let mut sink = link.sink;
                tokio::spawn(async move {
                    let _ = sink.close(CloseReason::normal("Client disconnect")).await;
                });
                return Err(Error::ConnectionClosed);
            }

            let task = tokio::spawn(link::run(Arc::downgrade(self), id, link, rx)).abort_handle();

            // Replay is submitted before the link becomes visible to
            // `dispatch`, so queued messages precede any new send.
            let queued = self.queue.lock().drain();
            let replayed = queued.len();
            for message in queued {
                let _ = tx.send(LinkCommand::Send {
                    message,
                    origin: Origin::Replay,
                    ack: None,
                });
            }

            slot.link = Some(LinkHandle { id, tx, task });
            slot.state = ConnectionState::Connected;
            replayed
        };

        self.cancel_reconnect_timer();
        self.breaker.lock().record_success();
        self.scheduler.lock().record_connected();
        self.metrics.lock().record_connected(Instant::now());

        info!(connection_id = %id, replayed, "Connected");
        self.emit(ConnectionEvent::Connected {
            connection_id: id,
            replayed,
        });

        if self.options.heartbeat && self.visible.load(Ordering::Acquire) {
            self.start_heartbeat(id);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Reconnecting
// ----------------------------------------------------------------------------

impl ManagerInner {
    fn schedule_reconnect(self: &Arc<Self>) {
        let now = Instant::now();
        let decision = self.scheduler.lock().next(now, &mut rand::thread_rng());

        match decision {
            ReconnectDecision::Throttled => {
                debug!("Reconnect request throttled");
                let pending = self.reconnect_timer.lock().is_some();
                if !pending {
                    self.spawn_timer(self.options.min_reconnect_interval, TimerAction::Reschedule);
                }
            }

            ReconnectDecision::Exhausted { phase, attempts } => {
                {
                    let mut slot = self.slot.lock();
                    if slot.state != ConnectionState::Connected {
                        slot.state = ConnectionState::Disconnected;
                    }
                }
                warn!(%phase, attempts, "Reconnect attempts exhausted");
                self.emit(ConnectionEvent::ReconnectFailed { phase, attempts });
                self.emit(ConnectionEvent::Error(Error::reconnect_exhausted(phase, attempts)));
            }

            ReconnectDecision::Schedule { attempt, delay } => {
                let delay = delay.max(self.breaker.lock().retry_after(now));
                {
                    let mut slot = self.slot.lock();
                    if slot.state != ConnectionState::Connected {
                        slot.state = ConnectionState::Reconnecting;
                    }
                }
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
                self.emit(ConnectionEvent::Reconnecting { attempt, delay });
                self.spawn_timer(delay, TimerAction::Attempt);
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>, delay: Duration, action: TimerAction) {
        let token = self.next_timer_token.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut timer = inner.reconnect_timer.lock();
                if timer.as_ref().is_some_and(|t| t.token == token) {
                    timer.take();
                }
            }
            match action {
                TimerAction::Attempt => inner.attempt_reconnect(),
                TimerAction::Reschedule => inner.schedule_reconnect(),
            }
        })
        .abort_handle();

        if let Some(old) = self.reconnect_timer.lock().replace(ReconnectTimer { token, handle }) {
            old.handle.abort();
        }
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.handle.abort();
        }
    }

    fn attempt_reconnect(self: &Arc<Self>) {
        {
            let slot = self.slot.lock();
            if slot.manual_disconnect || slot.state == ConnectionState::Connected {
                return;
            }
        }

        // The attempt runs in its own task; failures come back through
        // `handle_connect_failure`.
        if let Err(err) = self.begin_connect(false) {
            debug!(error = %err, "Reconnect attempt blocked");
            if err.is_circuit_open() {
                self.schedule_reconnect();
            }
        }
    }

    /// Attempts a reconnect right away if nothing forbids it.
    fn reconnect_immediately(self: &Arc<Self>) {
        {
            let slot = self.slot.lock();
            if !self.options.auto_reconnect
                || slot.manual_disconnect
                || slot.state == ConnectionState::Connected
            {
                return;
            }
        }
        if self.breaker.lock().is_open(Instant::now()) {
            debug!("Circuit open, immediate reconnect skipped");
            return;
        }
        if let Err(err) = self.begin_connect(false) {
            debug!(error = %err, "Immediate reconnect blocked");
        }
    }
}

// ----------------------------------------------------------------------------
// Link Callbacks
// ----------------------------------------------------------------------------

impl ManagerInner {
    pub(crate) fn handle_text(&self, id: ConnectionId, text: &str) {
        self.metrics.lock().messages_received += 1;
        trace!(connection_id = %id, len = text.len(), "Frame received");

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(connection_id = %id, error = %err, "Dropping unparseable frame");
                self.emit(ConnectionEvent::Error(err));
                return;
            }
        };

        let message = match InboundMessage::from_envelope(&envelope) {
            Ok(message) => message,
            Err(err) => {
                warn!(connection_id = %id, kind = %envelope.kind, error = %err, "Dropping malformed message");
                self.emit(ConnectionEvent::Error(err));
                return;
            }
        };

        match message {
            InboundMessage::Pong(_) => {
                if let Some(latency) = self.heartbeat.record_pong(Instant::now()) {
                    self.metrics.lock().last_latency = Some(latency);
                    trace!(connection_id = %id, latency_ms = latency.as_millis() as u64, "Pong");
                }
                self.breaker.lock().record_success();
            }

            InboundMessage::TriggerResponse(response) => {
                self.correlator.resolve(response);
                self.emit(ConnectionEvent::Message {
                    kind: envelope.kind,
                    data: envelope.data,
                });
            }

            InboundMessage::Error(server_error) => {
                let matched = self.correlator.reject(&server_error);
                warn!(connection_id = %id, message = %server_error.message, matched, "Server error");
                self.emit(ConnectionEvent::Error(Error::server(server_error.message)));
            }

            _ => self.emit(ConnectionEvent::Message {
                kind: envelope.kind,
                data: envelope.data,
            }),
        }
    }

    pub(crate) fn record_sent(&self, message: &QueuedMessage) {
        self.metrics.lock().messages_sent += 1;
        if let Some(id) = message.correlation_id() {
            self.correlator.mark_sent(id);
        }
    }

    /// Decides the fate of a message the transport did not take.
    pub(crate) fn handle_write_failure(
        &self,
        message: QueuedMessage,
        origin: Origin,
        err: Error,
    ) -> Result<Delivery> {
        self.metrics.lock().send_failures += 1;
        if origin == Origin::Heartbeat || !self.queue_usable() {
            return Err(err);
        }

        let outcome = self.queue.lock().requeue(message);
        match outcome {
            RequeueOutcome::Requeued { evicted } => {
                debug!("Message re-queued after write failure");
                if let Some(evicted) = evicted {
                    self.drop_evicted(evicted);
                }
                Ok(Delivery::Queued)
            }
            RequeueOutcome::Dropped(dropped) => {
                warn!(kind = dropped.payload.kind(), retries = dropped.retries, "Message dropped after retries");
                if let Some(id) = dropped.correlation_id() {
                    self.correlator.abandon(id);
                }
                Err(err)
            }
        }
    }

    pub(crate) fn handle_link_closed(
        self: &Arc<Self>,
        id: ConnectionId,
        close: Option<CloseReason>,
        error: Option<Error>,
    ) {
        let now = Instant::now();
        let clean = close.as_ref().is_some_and(CloseReason::is_clean);

        let (manual, will_reconnect, evicted) = {
            let mut slot = self.slot.lock();
            if slot.link.as_ref().is_none_or(|l| l.id != id) {
                debug!(connection_id = %id, "Ignoring close of stale link");
                return;
            }
            slot.link = None;

            let manual = slot.manual_disconnect;
            let requeue = self.queue_usable() && !manual;
            let swept = self.correlator.sweep(requeue, self.options.max_request_resends);

            let mut evicted = Vec::new();
            if !swept.resend.is_empty() {
                let mut queue = self.queue.lock();
                for payload in swept.resend {
                    evicted.extend(queue.enqueue(QueuedMessage::new(payload.into(), now)));
                }
            }

            let will_reconnect = !clean && !manual && self.options.auto_reconnect;
            slot.state = if will_reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
            (manual, will_reconnect, evicted)
        };

        for message in evicted {
            self.drop_evicted(message);
        }

        self.heartbeat.stop();
        self.metrics.lock().record_disconnected();
        if !clean && !manual {
            self.breaker.lock().record_failure(now);
        }

        let code = close.as_ref().map(|c| c.code);
        let reason = match (&close, &error) {
            (Some(close), _) => close.reason.clone(),
            (None, Some(err)) => err.to_string(),
            (None, None) => String::new(),
        };
        info!(connection_id = %id, ?code, will_reconnect, "Disconnected");

        if let Some(err) = error {
            self.emit(ConnectionEvent::Error(err));
        }
        self.emit(ConnectionEvent::Disconnected {
            code,
            reason,
            will_reconnect,
        });

        if will_reconnect {
            self.schedule_reconnect();
        }
    }

    /// Asks the link to close; used by the heartbeat on staleness.
    pub(crate) fn close_link(&self, id: ConnectionId, reason: CloseReason) {
        let slot = self.slot.lock();
        if let Some(link) = slot.link.as_ref().filter(|l| l.id == id) {
            let _ = link.tx.send(LinkCommand::Close { reason, ack: None });
        }
    }

    /// Submits a keep-alive ping. Returns `false` once the link is gone.
    pub(crate) fn send_ping(&self, id: ConnectionId) -> bool {
        let slot = self.slot.lock();
        match slot.link.as_ref().filter(|l| l.id == id) {
            Some(link) => link
                .tx
                .send(LinkCommand::Send {
                    message: QueuedMessage::new(OutboundMessage::Ping(Ping::now()), Instant::now()),
                    origin: Origin::Heartbeat,
                    ack: None,
                })
                .is_ok(),
            None => false,
        }
    }

    fn start_heartbeat(self: &Arc<Self>, id: ConnectionId) {
        let task = tokio::spawn(heartbeat::run(
            Arc::downgrade(self),
            id,
            self.options.heartbeat_interval,
            self.options.heartbeat_timeout,
        ))
        .abort_handle();
        self.heartbeat.replace(task);
        debug!(connection_id = %id, interval_ms = self.options.heartbeat_interval.as_millis() as u64, "Heartbeat started");
    }
}

// ----------------------------------------------------------------------------
// Sending
// ----------------------------------------------------------------------------

impl ManagerInner {
    fn queue_usable(&self) -> bool {
        self.options.message_queue_enabled && self.options.max_queue_size > 0
    }

    async fn dispatch(&self, message: OutboundMessage, origin: Origin) -> Result<Delivery> {
        let entry = QueuedMessage::new(message, Instant::now());

        let route = {
            let slot = self.slot.lock();
            match slot.link.as_ref() {
                Some(link) if slot.state == ConnectionState::Connected => {
                    let (ack, rx) = oneshot::channel();
                    match link.tx.send(LinkCommand::Send {
                        message: entry,
                        origin,
                        ack: Some(ack),
                    }) {
                        Ok(()) => Route::Written(rx),
                        Err(SendError(LinkCommand::Send { message, .. })) => {
                            self.route_offline(message, origin)?
                        }
                        Err(_) => return Err(Error::ConnectionClosed),
                    }
                }
                _ => self.route_offline(entry, origin)?,
            }
        };

        match route {
            Route::Written(rx) => rx.await.unwrap_or(Err(Error::ConnectionClosed)),
            Route::Queued(evicted) => {
                if let Some(evicted) = evicted {
                    self.drop_evicted(evicted);
                }
                Ok(Delivery::Queued)
            }
        }
    }

    /// Called with the state lock held.
    fn route_offline(&self, message: QueuedMessage, origin: Origin) -> Result<Route> {
        if origin == Origin::Heartbeat || !self.queue_usable() {
            return Err(Error::NotConnected);
        }
        let mut queue = self.queue.lock();
        let evicted = queue.enqueue(message);
        trace!(queued = queue.len(), "Message queued");
        Ok(Route::Queued(evicted))
    }

    fn drop_evicted(&self, message: QueuedMessage) {
        warn!(kind = message.payload.kind(), "Queue full, oldest message evicted");
        if let Some(id) = message.correlation_id() {
            self.correlator.abandon(id);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        self.router.emit(event.name(), &event);
    }
}

// ----------------------------------------------------------------------------
// Liveness
// ----------------------------------------------------------------------------

impl ManagerInner {
    fn start_liveness(self: &Arc<Self>) {
        if self.liveness_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(mut signals) = self.environment.signals() else {
            return;
        };

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_signal(signal);
            }
            trace!("Liveness watcher stopped");
        });
    }

    fn apply_signal(self: &Arc<Self>, signal: LivenessSignal) {
        match signal {
            LivenessSignal::VisibilityChanged { visible } => self.visibility_changed(visible),
            LivenessSignal::NetworkOnline => self.network_online(),
            LivenessSignal::NetworkOffline => self.network_offline(),
        }
    }

    fn visibility_changed(self: &Arc<Self>, visible: bool) {
        self.visible.store(visible, Ordering::Release);
        if !visible {
            debug!("Hidden, pausing heartbeat");
            self.heartbeat.stop();
            return;
        }

        let connected = {
            let slot = self.slot.lock();
            slot.link
                .as_ref()
                .filter(|_| slot.state == ConnectionState::Connected)
                .map(|l| l.id)
        };

        match connected {
            Some(id) => {
                if self.options.heartbeat && !self.heartbeat.is_running() {
                    debug!(connection_id = %id, "Visible, resuming heartbeat");
                    self.start_heartbeat(id);
                }
            }
            None => {
                debug!("Visible while disconnected");
                self.reconnect_immediately();
            }
        }
    }

    fn network_online(self: &Arc<Self>) {
        info!("Network online");
        self.scheduler.lock().reset_attempts();
        self.reconnect_immediately();
    }

    fn network_offline(&self) {
        warn!("Network offline");
        self.emit(ConnectionEvent::Error(Error::NetworkOffline));
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Resilient client for the ADW trigger server.
///
/// Cheap to clone; clones share one connection. Dropping the last clone
/// closes the connection with code 1001.
///
/// # Example
///
/// ```ignore
/// use adw_trigger_client::{ConnectionManager, TriggerWorkflow};
///
/// let manager = ConnectionManager::builder().host("localhost").port(8002).build()?;
/// manager.connect().await?;
///
/// let response = manager
///     .trigger_workflow(TriggerWorkflow::new("adw_plan_build").with_issue_number("42"))
///     .await?;
/// println!("started {:?}", response.adw_id);
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        options: ConnectionOptions,
        transport: Arc<dyn Transport>,
        environment: Box<dyn Environment>,
    ) -> Result<Self> {
        options.validate()?;
        let socket_url = options.socket_url()?;
        let health = HealthProbe::new(options.health_url()?, options.health_timeout)?;
        let visible = environment.is_visible();

        let inner = ManagerInner {
            socket_url,
            transport,
            environment,
            health,
            slot: Mutex::new(LinkSlot {
                state: ConnectionState::Disconnected,
                link: None,
                manual_disconnect: false,
            }),
            breaker: Mutex::new(CircuitBreaker::new(options.circuit_breaker)),
            scheduler: Mutex::new(ReconnectScheduler::new(options.reconnect_policy())),
            queue: Mutex::new(MessageQueue::new(
                options.max_queue_size,
                options.max_message_retries,
            )),
            correlator: RequestCorrelator::new(options.max_pending_requests),
            router: EventRouter::new(),
            metrics: Mutex::new(ConnectionMetrics::default()),
            heartbeat: HeartbeatMonitor::default(),
            visible: AtomicBool::new(visible),
            liveness_started: AtomicBool::new(false),
            connect_slot: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
            next_timer_token: AtomicU64::new(0),
            options,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Opens the connection.
    ///
    /// Concurrent calls share one attempt. Resets the reconnect counters
    /// and re-enables automatic reconnection after `disconnect()`.
    ///
    /// # Errors
    ///
    /// - [`Error::CircuitOpen`] if the breaker is open (no transport attempt)
    /// - [`Error::ConnectionTimeout`] if the open exceeds `connect_timeout`
    /// - the transport error otherwise
    pub async fn connect(&self) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock();
            if slot.state == ConnectionState::Connected {
                return Ok(());
            }
            slot.manual_disconnect = false;
        }

        self.inner.start_liveness();
        let attempt = self.inner.begin_connect(true)?;
        attempt.await
    }

    /// Closes the connection with code 1000 and stops reconnecting.
    ///
    /// Queued messages get one `drain_timeout` window to be written first.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let link = {
            let mut slot = inner.slot.lock();
            slot.manual_disconnect = true;
            match slot.link.as_ref() {
                Some(link) => Some((link.id, link.tx.clone())),
                None => {
                    slot.state = ConnectionState::Disconnected;
                    None
                }
            }
        };
        inner.cancel_reconnect_timer();
        inner.heartbeat.stop();

        let Some((id, tx)) = link else {
            debug!("Disconnect while not connected");
            return;
        };

        let queued = inner.queue.lock().drain();
        if !queued.is_empty() {
            debug!(count = queued.len(), "Flushing queue before disconnect");
        }
        for message in queued {
            if let Err(SendError(LinkCommand::Send { message, origin, .. })) =
                tx.send(LinkCommand::Send {
                    message,
                    origin: Origin::Replay,
                    ack: None,
                })
            {
                let _ = inner.handle_write_failure(message, origin, Error::ConnectionClosed);
            }
        }

        let drain = inner.options.drain_timeout;
        let (flush_tx, flush_rx) = oneshot::channel();
        if tx.send(LinkCommand::Flush { ack: flush_tx }).is_ok()
            && timeout(drain, flush_rx).await.is_err()
        {
            debug!(drain_ms = drain.as_millis() as u64, "Drain window elapsed");
        }

        let reason = CloseReason::normal("Client disconnect");
        let (done_tx, done_rx) = oneshot::channel();
        let _ = tx.send(LinkCommand::Close {
            reason: reason.clone(),
            ack: Some(done_tx),
        });

        // The link acks only after reporting its close; anything else
        // means it is stuck or already gone without reporting.
        if !matches!(timeout(drain, done_rx).await, Ok(Ok(()))) {
            warn!(connection_id = %id, "Link did not close cleanly, aborting");
            {
                let slot = inner.slot.lock();
                if let Some(link) = slot.link.as_ref().filter(|l| l.id == id) {
                    link.task.abort();
                }
            }
            inner.handle_link_closed(id, Some(reason), None);
        }
    }
}

// ============================================================================
// ConnectionManager - Messaging
// ============================================================================

impl ConnectionManager {
    /// Sends a message, or queues it while not connected.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if not connected and queuing is disabled
    /// - the transport error if a live write fails and queuing is disabled
    pub async fn send(&self, message: impl Into<OutboundMessage>) -> Result<Delivery> {
        self.inner.dispatch(message.into(), Origin::Direct).await
    }

    /// Triggers a workflow and waits for its acknowledgment.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkflowRejected`] if the server declines
    /// - [`Error::Server`] if the server answers with an error frame
    /// - [`Error::RequestTimeout`] after `request_timeout`
    /// - [`Error::RequestAbandoned`] if the request was lost across reconnects
    pub async fn trigger_workflow(&self, request: TriggerWorkflow) -> Result<TriggerResponse> {
        self.trigger_workflow_with_timeout(request, self.inner.options.request_timeout)
            .await
    }

    /// Like [`trigger_workflow`](Self::trigger_workflow) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`trigger_workflow`](Self::trigger_workflow).
    pub async fn trigger_workflow_with_timeout(
        &self,
        request: TriggerWorkflow,
        request_timeout: Duration,
    ) -> Result<TriggerResponse> {
        let inner = &self.inner;
        let (stamped, rx) = inner.correlator.register(request, request_timeout)?;
        let request_id = stamped.request_id;

        if let Err(err) = inner.dispatch(stamped.into(), Origin::Direct).await {
            if let Some(id) = request_id {
                inner.correlator.discard(id);
            }
            return Err(err);
        }

        let result = rx.await?;
        if let Err(Error::RequestTimeout { request_id, .. }) = &result {
            inner.queue.lock().remove_correlated(*request_id);
        }
        result
    }
}

// ============================================================================
// ConnectionManager - Listeners
// ============================================================================

impl ConnectionManager {
    /// Subscribes to `event` (`connect`, `disconnect`, `error`, or a message kind).
    pub fn on(&self, event: impl Into<String>, listener: Listener<ConnectionEvent>) -> ListenerId {
        self.inner.router.on(event, listener)
    }

    /// Subscribes for a single delivery.
    pub fn once(&self, event: impl Into<String>, listener: Listener<ConnectionEvent>) -> ListenerId {
        self.inner.router.once(event, listener)
    }

    /// Subscribes on behalf of `owner`, removable with [`off_owner`](Self::off_owner).
    pub fn on_owned(
        &self,
        owner: &OwnerId,
        event: impl Into<String>,
        listener: Listener<ConnectionEvent>,
    ) -> ListenerId {
        self.inner.router.on_owned(owner.clone(), event, listener)
    }

    pub fn off(&self, event: &str, listener: &Listener<ConnectionEvent>) -> bool {
        self.inner.router.off(event, listener)
    }

    pub fn off_id(&self, id: ListenerId) -> bool {
        self.inner.router.off_id(id)
    }

    /// Removes every listener registered by `owner`.
    pub fn off_owner(&self, owner: &OwnerId) -> usize {
        self.inner.router.off_owner(owner)
    }

    pub fn off_event(&self, event: &str) -> usize {
        self.inner.router.off_event(event)
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.router.listener_count(event)
    }
}

// ============================================================================
// ConnectionManager - Introspection
// ============================================================================

impl ConnectionManager {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the manager's internals.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let inner = &self.inner;
        let (state, connection_id) = {
            let slot = inner.slot.lock();
            (slot.state, slot.link.as_ref().map(|l| l.id))
        };

        ConnectionStatus {
            state,
            connection_id,
            circuit: inner.breaker.lock().state(),
            reconnect_attempts: inner.scheduler.lock().attempts(),
            queued_messages: inner.queue.lock().len(),
            pending_requests: inner.correlator.len(),
            heartbeat_running: inner.heartbeat.is_running(),
            visible: inner.visible.load(Ordering::Acquire),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> ConnectionMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Queued payloads in replay order.
    #[must_use]
    pub fn queued_messages(&self) -> Vec<OutboundMessage> {
        self.inner
            .queue
            .lock()
            .iter()
            .map(|m| m.payload.clone())
            .collect()
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    #[must_use]
    pub fn socket_url(&self) -> &Url {
        &self.inner.socket_url
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Performs `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HealthCheck`] or [`Error::Http`].
    pub async fn check_health(&self) -> Result<HealthReport> {
        self.inner.health.check().await
    }

    /// Polls `/health` until it passes or `deadline` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] when the deadline elapses.
    pub async fn wait_until_healthy(
        &self,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<HealthReport> {
        self.inner
            .health
            .wait_until_healthy(deadline, poll_interval)
            .await
    }
}

impl LivenessHooks for ConnectionManager {
    fn on_visibility_change(&self, visible: bool) {
        self.inner.visibility_changed(visible);
    }

    fn on_network_online(&self) {
        self.inner.network_online();
    }

    fn on_network_offline(&self) {
        self.inner.network_offline();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.socket_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
