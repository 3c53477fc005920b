//! Per-connection event loop.
//!
//! One task per open transport. It multiplexes inbound frames with
//! commands from the manager, writes outbound messages in submission
//! order, and reports the close back to the manager exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::transport::{CloseReason, Frame, FrameSink, GOING_AWAY, TransportLink};

use super::manager::ManagerInner;
use super::queue::QueuedMessage;

// ============================================================================
// Delivery
// ============================================================================

/// How `send()` disposed of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the open transport.
    Sent,
    /// Buffered until the next connection.
    Queued,
}

// ============================================================================
// LinkCommand
// ============================================================================

/// Who submitted a message; decides what happens when the write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// `send()` or a trigger request.
    Direct,
    /// Queue replay on connect.
    Replay,
    /// Keep-alive ping. Never queued.
    Heartbeat,
}

pub(crate) enum LinkCommand {
    Send {
        message: QueuedMessage,
        origin: Origin,
        ack: Option<oneshot::Sender<Result<Delivery>>>,
    },
    /// Acknowledged once every earlier command was processed.
    Flush { ack: oneshot::Sender<()> },
    /// Close the transport; `ack` completes after the close was handled.
    Close {
        reason: CloseReason,
        ack: Option<oneshot::Sender<()>>,
    },
}

// ============================================================================
// LinkHandle
// ============================================================================

/// Manager-side handle of a live link task.
pub(crate) struct LinkHandle {
    pub(crate) id: ConnectionId,
    pub(crate) tx: mpsc::UnboundedSender<LinkCommand>,
    pub(crate) task: AbortHandle,
}

/// Why the loop ended.
struct LinkEnd {
    close: Option<CloseReason>,
    error: Option<Error>,
}

impl LinkEnd {
    fn closed(reason: Option<CloseReason>) -> Self {
        Self {
            close: reason,
            error: None,
        }
    }

    fn failed(error: Error) -> Self {
        Self {
            close: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

pub(crate) async fn run(
    inner: Weak<ManagerInner>,
    id: ConnectionId,
    link: TransportLink,
    mut rx: mpsc::UnboundedReceiver<LinkCommand>,
) {
    let TransportLink {
        mut sink,
        mut stream,
    } = link;
    let mut close_acks = Vec::new();

    let end = loop {
        tokio::select! {
            frame = stream.next_frame() => {
                match frame {
                    Some(Ok(Frame::Text(text))) => {
                        let Some(inner) = inner.upgrade() else {
                            break LinkEnd::closed(None);
                        };
                        inner.handle_text(id, &text);
                    }

                    Some(Ok(Frame::Close(reason))) => {
                        debug!(connection_id = %id, code = ?reason.as_ref().map(|r| r.code), "Closed by remote");
                        break LinkEnd::closed(reason);
                    }

                    Some(Err(e)) => {
                        error!(connection_id = %id, error = %e, "Transport error");
                        break LinkEnd::failed(e);
                    }

                    None => {
                        debug!(connection_id = %id, "Stream ended");
                        break LinkEnd::closed(None);
                    }
                }
            }

            command = rx.recv() => {
                match command {
                    Some(LinkCommand::Send { message, origin, ack }) => {
                        let Some(inner) = inner.upgrade() else {
                            break LinkEnd::closed(None);
                        };
                        if let Err(e) = write(&inner, &mut *sink, id, message, origin, ack).await {
                            break LinkEnd::failed(e);
                        }
                    }

                    Some(LinkCommand::Flush { ack }) => {
                        let _ = ack.send(());
                    }

                    Some(LinkCommand::Close { reason, ack }) => {
                        debug!(connection_id = %id, code = reason.code, "Closing link");
                        if let Err(e) = sink.close(reason.clone()).await {
                            debug!(connection_id = %id, error = %e, "Close frame not delivered");
                        }
                        close_acks.extend(ack);
                        break LinkEnd::closed(Some(reason));
                    }

                    None => {
                        debug!(connection_id = %id, "Manager dropped");
                        let _ = sink.close(CloseReason::new(GOING_AWAY, "Client dropped")).await;
                        break LinkEnd::closed(Some(CloseReason::new(GOING_AWAY, "Client dropped")));
                    }
                }
            }
        }
    };

    // Nothing new can arrive once the receiver is closed; whatever was
    // already submitted goes back through the write-failure path.
    rx.close();
    let inner = inner.upgrade();
    while let Ok(command) = rx.try_recv() {
        match command {
            LinkCommand::Send {
                message,
                origin,
                ack,
            } => {
                let result = match &inner {
                    Some(inner) => inner.handle_write_failure(message, origin, Error::ConnectionClosed),
                    None => Err(Error::ConnectionClosed),
                };
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            LinkCommand::Flush { ack } => {
                let _ = ack.send(());
            }
            LinkCommand::Close { ack, .. } => close_acks.extend(ack),
        }
    }

    if let Some(inner) = inner {
        inner.handle_link_closed(id, end.close, end.error);
    }

    for ack in close_acks {
        let _ = ack.send(());
    }
    trace!(connection_id = %id, "Link task terminated");
}

/// Writes one message. An error means the transport is unusable.
async fn write(
    inner: &ManagerInner,
    sink: &mut dyn FrameSink,
    id: ConnectionId,
    message: QueuedMessage,
    origin: Origin,
    ack: Option<oneshot::Sender<Result<Delivery>>>,
) -> Result<()> {
    let text = match message.payload.encode() {
        Ok(text) => text,
        Err(e) => {
            warn!(connection_id = %id, kind = message.payload.kind(), error = %e, "Unencodable message dropped");
            if let Some(ack) = ack {
                let _ = ack.send(Err(e));
            }
            return Ok(());
        }
    };

    match sink.send_text(text).await {
        Ok(()) => {
            trace!(connection_id = %id, kind = message.payload.kind(), ?origin, "Frame sent");
            inner.record_sent(&message);
            if let Some(ack) = ack {
                let _ = ack.send(Ok(Delivery::Sent));
            }
            Ok(())
        }
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Write failed");
            let result = inner.handle_write_failure(message, origin, e.clone());
            if let Some(ack) = ack {
                let _ = ack.send(result);
            }
            Err(e)
        }
    }
}
