//! In-memory transport for driving [`ConnectionManager`](crate::ConnectionManager)
//! deterministically.
//!
//! [`MockTransport::channel_pair`] returns the transport plus a [`MockController`].
//! The controller decides whether opens succeed and hands out one
//! [`MockConnection`] per successful open, which plays the server side:
//! it reads what the client wrote, pushes frames to the client, and closes
//! cleanly or drops abruptly.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::{CloseReason, Frame, FrameSink, FrameStream, Transport, TransportLink};

// ============================================================================
// MockTransport
// ============================================================================

#[derive(Default)]
struct OpenPolicy {
    refusing: bool,
    fail_next: u32,
}

struct MockShared {
    policy: Mutex<OpenPolicy>,
    open_count: AtomicUsize,
    connections: mpsc::UnboundedSender<MockConnection>,
}

/// Transport whose connections are backed by channels.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl MockTransport {
    /// Creates the transport and its controller.
    #[must_use]
    pub fn channel_pair() -> (Self, MockController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(MockShared {
            policy: Mutex::new(OpenPolicy::default()),
            open_count: AtomicUsize::new(0),
            connections: tx,
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockController {
                shared,
                connections: rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &Url) -> Result<TransportLink> {
        self.shared.open_count.fetch_add(1, Ordering::SeqCst);
        {
            let mut policy = self.shared.policy.lock();
            if policy.fail_next > 0 {
                policy.fail_next -= 1;
                return Err(Error::connection("mock: connection refused"));
            }
            if policy.refusing {
                return Err(Error::connection("mock: connection refused"));
            }
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let write_failure = Arc::new(AtomicBool::new(false));

        let _ = self.shared.connections.send(MockConnection {
            from_client,
            to_client,
            write_failure: Arc::clone(&write_failure),
        });

        Ok(TransportLink {
            sink: Box::new(MockSink {
                tx: to_server,
                write_failure,
            }),
            stream: Box::new(MockStream { rx: from_server }),
        })
    }
}

// ============================================================================
// MockController
// ============================================================================

/// Test-side control of a [`MockTransport`].
pub struct MockController {
    shared: Arc<MockShared>,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockController {
    /// Makes every open fail until switched back.
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.policy.lock().refusing = refusing;
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next(&self, count: u32) {
        self.shared.policy.lock().fail_next = count;
    }

    /// Opens attempted so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.shared.open_count.load(Ordering::SeqCst)
    }

    /// Waits for the next successful open.
    pub async fn next_connection(&mut self) -> Option<MockConnection> {
        self.connections.recv().await
    }

    /// Returns an already opened connection without waiting.
    pub fn try_next_connection(&mut self) -> Option<MockConnection> {
        self.connections.try_recv().ok()
    }
}

// ============================================================================
// MockConnection
// ============================================================================

/// Server side of one mock connection.
pub struct MockConnection {
    from_client: mpsc::UnboundedReceiver<Frame>,
    to_client: mpsc::UnboundedSender<Result<Frame>>,
    write_failure: Arc<AtomicBool>,
}

impl MockConnection {
    /// Next frame written by the client, `None` once the client side is gone.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next text frame; `None` on close or end.
    pub async fn recv_text(&mut self) -> Option<String> {
        match self.recv_frame().await? {
            Frame::Text(text) => Some(text),
            Frame::Close(_) => None,
        }
    }

    /// Next text frame decoded as an envelope.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        let text = self.recv_text().await?;
        Envelope::decode(&text).ok()
    }

    /// Next envelope whose kind is not `ping`.
    pub async fn recv_non_ping(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.recv_envelope().await?;
            if envelope.kind != crate::protocol::kinds::PING {
                return Some(envelope);
            }
        }
    }

    /// Waits for the client's close frame.
    pub async fn recv_close(&mut self) -> Option<CloseReason> {
        loop {
            match self.recv_frame().await? {
                Frame::Close(reason) => return reason,
                Frame::Text(_) => {}
            }
        }
    }

    /// Returns a frame the client already wrote, without waiting.
    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Pushes an envelope to the client.
    pub fn push(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.push_text(text),
            Err(_) => false,
        }
    }

    /// Pushes raw text to the client.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Sends a close frame to the client.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.to_client
            .send(Ok(Frame::Close(Some(CloseReason::new(code, reason)))))
            .is_ok()
    }

    /// Makes every following client write fail.
    pub fn fail_writes(&self) {
        self.write_failure.store(true, Ordering::SeqCst);
    }

    /// Drops the connection with a transport error and no close frame.
    pub fn disconnect_abruptly(self) {
        let _ = self
            .to_client
            .send(Err(Error::connection("mock: connection reset")));
    }
}

// ============================================================================
// Client Halves
// ============================================================================

struct MockSink {
    tx: mpsc::UnboundedSender<Frame>,
    write_failure: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.write_failure.load(Ordering::SeqCst) {
            return Err(Error::connection("mock: write failed"));
        }
        self.tx
            .send(Frame::Text(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        self.tx
            .send(Frame::Close(Some(reason)))
            .map_err(|_| Error::ConnectionClosed)
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn url() -> Url {
        Url::parse("ws://localhost:8002/ws/trigger").expect("url")
    }

    #[tokio::test]
    async fn test_refusing_counts_attempts() {
        let (transport, controller) = MockTransport::channel_pair();
        controller.set_refusing(true);

        assert!(transport.open(&url()).await.is_err());
        assert!(transport.open(&url()).await.is_err());
        assert_eq!(controller.open_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_then_succeed() {
        let (transport, mut controller) = MockTransport::channel_pair();
        controller.fail_next(1);

        assert!(transport.open(&url()).await.is_err());
        assert!(transport.open(&url()).await.is_ok());
        assert!(controller.try_next_connection().is_some());
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut controller) = MockTransport::channel_pair();
        let TransportLink {
            mut sink,
            mut stream,
        } = transport.open(&url()).await.expect("open");
        let mut server = controller.next_connection().await.expect("connection");

        sink.send_text(r#"{"type":"ping","data":{}}"#.into())
            .await
            .expect("send");
        assert_eq!(server.recv_envelope().await.expect("frame").kind, "ping");

        server.push(&Envelope::new("pong", json!({})));
        assert!(matches!(stream.next_frame().await, Some(Ok(Frame::Text(_)))));

        server.close(1000, "bye");
        assert!(matches!(
            stream.next_frame().await,
            Some(Ok(Frame::Close(Some(CloseReason { code: 1000, .. }))))
        ));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let (transport, mut controller) = MockTransport::channel_pair();
        let mut link = transport.open(&url()).await.expect("open");
        let server = controller.next_connection().await.expect("connection");

        server.fail_writes();
        assert!(link.sink.send_text("x".into()).await.is_err());
    }
}
