//! The outbound message contract handed to terminals and commands.
//!
//! Everything that produces output for a client does so through a
//! [`MessageSink`]. The concrete sink is picked per connection state: a
//! plain connection sink while the session is `Open`, an awaiting
//! decorator while a stream holds the socket, or a broadcast fan-out
//! for combinations.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use terminus_core::{SerializedResult, Terminal};

use crate::error::WsResult;

/// The full outbound surface of one client connection.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one text message.
    async fn send_text(&self, text: String) -> WsResult<()>;

    /// Send one binary message.
    async fn send_binary(&self, data: Bytes) -> WsResult<()>;

    /// Send a JSON value as one text message.
    async fn send_json(&self, value: &Value) -> WsResult<()>;

    /// Send a serialized result: status line, then body.
    async fn send_result(&self, result: &SerializedResult) -> WsResult<()>;

    /// Send a best-effort error notification.
    async fn send_exception(&self, message: &str) -> WsResult<()>;

    /// Replace the active terminal, disposing the previous one.
    ///
    /// `state` is applied to the new terminal before its `open` runs.
    async fn direct_to(&self, terminal: Box<dyn Terminal>, state: Option<Value>) -> WsResult<()>;

    /// Replace the active terminal with the default shell.
    async fn direct_to_shell(&self) -> WsResult<()>;

    /// Start a client-paced stream of a large result.
    ///
    /// Suspends terminal output for the duration of the stream; the
    /// result stays locked until the stream releases.
    async fn stream_result(
        &self,
        result: Arc<SerializedResult>,
        chunk_size: Option<u64>,
    ) -> WsResult<()>;
}

/// A buffered text writer over a [`MessageSink`].
///
/// Terminals that assemble large responses piece by piece write into
/// the buffer and send the whole thing as one message with
/// [`finish`](MessageStream::finish), keeping message boundaries
/// meaningful for the client.
pub struct MessageStream {
    sink: Arc<dyn MessageSink>,
    buffer: String,
}

impl MessageStream {
    /// Create a new empty stream over the given sink.
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            buffer: String::new(),
        }
    }

    /// Append a text fragment to the buffer.
    pub fn write(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Append a line to the buffer.
    pub fn write_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }

    /// The number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Send the buffered content as one text message.
    ///
    /// An empty buffer sends nothing.
    pub async fn finish(self) -> WsResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.sink.send_text(self.buffer).await
    }
}
