//! Persistent relay transport over a single WebSocket.
//!
//! Every outbound text frame is a wire request. Inbound text frames are either reply items,
//! routed to their call by `request_id`, or relay error envelopes:
//!
//! ```json
//! { "request_id": "17", "error": { "code": 3, "message": "invalid dkey" } }
//! ```
//!
//! An envelope without `request_id` concerns the whole connection and fails every pending
//! call. If the connection drops without [`WsTransport::close`] having been called, every
//! pending call fails with [`RelayError::ConnectionClosed`].

use super::{RelayErrorBody, Transport};
use crate::{
    errors::RelayError,
    pipeline::ReplyStream,
    types::{ReplyItem, WireRequest},
};
use dashmap::DashMap;
use futures_util::{stream, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type CallSender = mpsc::UnboundedSender<Result<ReplyItem, RelayError>>;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    request_id: Option<String>,
    error: RelayErrorBody,
}

/// Connection state shared by the transport handle, its reader and writer tasks, and every
/// in-flight call.
struct Shared {
    outbound: mpsc::UnboundedSender<Message>,
    pending: DashMap<String, CallSender>,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn route(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse relay frame");
                return;
            }
        };

        // Reply items always name a provider; envelopes never do.
        if value.get("provider_id").is_none() && value.get("error").is_some() {
            match serde_json::from_value::<ErrorEnvelope>(value) {
                Ok(envelope) => self.route_error(envelope),
                Err(e) => tracing::warn!(error = %e, "malformed relay error frame"),
            }
            return;
        }

        match serde_json::from_value::<ReplyItem>(value) {
            Ok(item) => {
                if let Some(sender) = self.pending.get(&item.request_id) {
                    let _ = sender.send(Ok(item));
                } else {
                    tracing::debug!(request_id = %item.request_id, "reply for unknown request");
                }
            }
            Err(e) => tracing::warn!(error = %e, "malformed reply item"),
        }
    }

    fn route_error(&self, envelope: ErrorEnvelope) {
        match envelope.request_id {
            Some(request_id) => {
                if let Some((_, sender)) = self.pending.remove(&request_id) {
                    let _ = sender.send(Err(envelope.error.into()));
                }
            }
            None => {
                tracing::warn!(message = %envelope.error.message, "relay rejected connection");
                self.fail_all(|| envelope.error.clone().into());
            }
        }
    }

    fn fail_all(&self, error: impl Fn() -> RelayError) {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(Err(error()));
            }
        }
    }

    /// Registers a call. Fails if the connection ended while the call was being set up,
    /// since `connection_ended` may already have swept the pending map.
    fn register(&self, request_id: String, sender: CallSender) -> bool {
        self.pending.insert(request_id.clone(), sender);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&request_id);
            return false;
        }
        true
    }

    /// Called once by the reader task when the connection ends.
    fn connection_ended(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.closing.load(Ordering::SeqCst) {
            // Dropping the senders ends every pending stream normally.
            self.pending.clear();
        } else {
            tracing::warn!(pending = self.pending.len(), "relay connection closed unexpectedly");
            self.fail_all(|| RelayError::ConnectionClosed);
        }
    }
}

/// Multiplexing relay transport over one WebSocket connection.
///
/// Cloning the handle shares the connection.
#[derive(Clone)]
pub struct WsTransport {
    shared: Arc<Shared>,
}

impl WsTransport {
    /// Connects to `url` and spawns the reader and writer tasks.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionFailed`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        tracing::info!(ws_url = url, "connecting to relay websocket");

        let (ws_stream, response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            tracing::error!(error = %e, "relay websocket connection failed");
            RelayError::ConnectionFailed(format!("WebSocket connection failed: {e}"))
        })?;
        tracing::info!(status = response.status().as_u16(), "relay websocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let shared = Arc::new(Shared {
            outbound,
            pending: DashMap::new(),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let is_close = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    tracing::debug!(error = %e, "relay websocket write failed");
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => reader_shared.route(&text),
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "relay websocket error");
                        break;
                    }
                    Ok(_) => {}
                }
            }
            reader_shared.connection_ended();
        });

        Ok(Self { shared })
    }

    /// Closes the connection. Pending calls end without results, which the pipeline
    /// reports as its usual consensus or completeness failure.
    pub fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("closing relay websocket");
        if self.shared.outbound.send(Message::Close(None)).is_err() {
            // writer already gone
            self.shared.connection_ended();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) || self.shared.closing.load(Ordering::SeqCst)
    }

    /// Number of calls currently waiting for replies.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }
}

impl Transport for WsTransport {
    fn submit(&self, request: Arc<WireRequest>) -> ReplyStream {
        if self.is_closed() {
            return stream::once(async { Err(RelayError::ConnectionClosed) }).boxed();
        }

        let frame = match serde_json::to_string(&*request) {
            Ok(frame) => frame,
            Err(e) => {
                let err = RelayError::InvalidRequest(format!("failed to encode request: {e}"));
                return stream::once(async move { Err(err) }).boxed();
            }
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        if !self.shared.register(request.id.clone(), sender) {
            return stream::once(async { Err(RelayError::ConnectionClosed) }).boxed();
        }
        let call = CallStream {
            receiver,
            request_id: request.id.clone(),
            shared: Arc::clone(&self.shared),
        };

        if self.shared.outbound.send(Message::Text(frame.into())).is_err() {
            self.shared.pending.remove(&request.id);
            return stream::once(async { Err(RelayError::ConnectionClosed) }).boxed();
        }
        tracing::debug!(request_id = %request.id, "relay request sent");

        call.boxed()
    }
}

/// Reply stream of one call. Deregisters the call when dropped.
struct CallStream {
    receiver: mpsc::UnboundedReceiver<Result<ReplyItem, RelayError>>,
    request_id: String,
    shared: Arc<Shared>,
}

impl Stream for CallStream {
    type Item = Result<ReplyItem, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for CallStream {
    fn drop(&mut self) {
        if self.shared.pending.remove(&self.request_id).is_some() {
            tracing::debug!(request_id = %self.request_id, "relay call released");
        }
    }
}
