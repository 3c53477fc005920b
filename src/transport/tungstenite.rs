//! `tokio-tungstenite` transport binding.
//!
//! Splits the WebSocket stream into a [`FrameSink`] and a [`FrameStream`].
//! Control frames (ping/pong) are answered by tungstenite itself and not
//! surfaced; binary frames are surfaced as text when they are valid UTF-8.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Result;

use super::{CloseReason, Frame, FrameSink, FrameStream, Transport, TransportLink};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// TungsteniteTransport
// ============================================================================

/// Production transport over `tokio-tungstenite`.
///
/// `wss://` URLs require the `tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        debug!(url = %url, "Opening WebSocket");
        let (ws_stream, response) = connect_async(url.as_str()).await?;
        debug!(status = %response.status(), "WebSocket handshake completed");

        let (sink, stream) = ws_stream.split();
        Ok(TransportLink {
            sink: Box::new(TungsteniteSink { inner: sink }),
            stream: Box::new(TungsteniteStream { inner: stream }),
        })
    }
}

// ============================================================================
// TungsteniteSink
// ============================================================================

struct TungsteniteSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        };
        self.inner.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

// ============================================================================
// TungsteniteStream
// ============================================================================

struct TungsteniteStream {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),

                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => warn!(len = bytes.len(), "Dropping non UTF-8 binary frame"),
                },

                Ok(Message::Close(frame)) => {
                    let reason =
                        frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.to_string()));
                    return Some(Ok(Frame::Close(reason)));
                }

                // Ping, Pong, raw frames
                Ok(other) => trace!(?other, "Ignoring control frame"),

                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use crate::transport::NORMAL_CLOSURE;

    async fn echo_then_close_server() -> (Url, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/trigger")).expect("url");

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.expect("echo");
            }
            let close = CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            };
            let _ = ws.send(Message::Close(Some(close))).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_echo_and_close_code() {
        let (url, server) = echo_then_close_server().await;

        let mut link = TungsteniteTransport::new().open(&url).await.expect("open");
        link.sink
            .send_text(r#"{"type":"ping","data":{}}"#.to_string())
            .await
            .expect("send");

        let echoed = link.stream.next_frame().await.expect("frame").expect("ok");
        assert_eq!(echoed, Frame::Text(r#"{"type":"ping","data":{}}"#.to_string()));

        let closed = link.stream.next_frame().await.expect("frame").expect("ok");
        assert_eq!(
            closed,
            Frame::Close(Some(CloseReason::new(NORMAL_CLOSURE, "done")))
        );

        drop(link);
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/trigger")).expect("url");
        let result = TungsteniteTransport::new().open(&url).await;
        assert!(result.is_err());
    }
}
