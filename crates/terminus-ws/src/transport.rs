//! Transport abstraction.
//!
//! The protocol core does not own the OS socket or the HTTP upgrade -
//! the host runtime hands it something that can push complete messages
//! to one client. [`TungsteniteTransport`] is the production
//! implementation over a `tokio-tungstenite` stream; [`MockTransport`]
//! records outbound messages in order for protocol tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;

use crate::error::{WsError, WsResult};
use crate::message::Message;

/// A raw send primitive for one client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one complete message.
    async fn send(&self, message: Message) -> WsResult<()>;

    /// Close the underlying connection.
    async fn close(&self) -> WsResult<()>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

/// A transport over the write half of a `tokio-tungstenite` stream.
///
/// The read half is returned to the host, which drives the receive loop
/// and feeds inbound frames to the dispatcher.
pub struct TungsteniteTransport<S> {
    sender: Mutex<SplitSink<WebSocketStream<S>, tungstenite::Message>>,
    open: AtomicBool,
}

impl<S> TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Split a WebSocket stream into a transport and its receive half.
    pub fn split(stream: WebSocketStream<S>) -> (Self, SplitStream<WebSocketStream<S>>) {
        let (sender, receiver) = stream.split();
        let transport = Self {
            sender: Mutex::new(sender),
            open: AtomicBool::new(true),
        };
        (transport, receiver)
    }
}

#[async_trait]
impl<S> Transport for TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: Message) -> WsResult<()> {
        if !self.is_open() {
            return Err(WsError::NotConnected);
        }
        let mut sender = self.sender.lock().await;
        sender
            .send(message.into())
            .await
            .map_err(|e| WsError::send_failed(e.to_string()))
    }

    async fn close(&self) -> WsResult<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            let mut sender = self.sender.lock().await;
            sender
                .send(tungstenite::Message::Close(None))
                .await
                .map_err(|e| WsError::send_failed(e.to_string()))?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// An in-memory transport that records every outbound message in order.
///
/// Protocol tests assert against [`sent`](MockTransport::sent) and can
/// inject send failures with [`fail_sends`](MockTransport::fail_sends).
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: parking_lot::Mutex<Vec<Message>>,
    failures_remaining: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    /// Create a new open mock transport.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All messages sent so far, in send order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// All text payloads sent so far, in send order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| m.as_text().map(str::to_string))
            .collect()
    }

    /// The number of binary messages sent so far.
    pub fn binary_count(&self) -> usize {
        self.sent.lock().iter().filter(|m| m.is_binary()).count()
    }

    /// Make the next `count` sends fail.
    pub fn fail_sends(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Whether the transport was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: Message) -> WsResult<()> {
        if self.is_closed() {
            return Err(WsError::NotConnected);
        }
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WsError::send_failed("injected failure"));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn close(&self) -> WsResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}
