//! Deferred delivery during stream suspension.
//!
//! While a stream owns the socket, terminal output must not interleave
//! with chunk data. [`AwaitingSink`] decorates the connection's normal
//! sink: every send first awaits the resume signal, then forwards to
//! the inner sink. Callers queue up on the signal in call order, so
//! delivery order is preserved without an explicit queue.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use terminus_core::{SerializedResult, Terminal};

use crate::error::{WsError, WsResult};
use crate::sink::MessageSink;

/// A sink decorator that holds every send until the stream releases.
pub struct AwaitingSink {
    inner: Arc<dyn MessageSink>,
    resume: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl AwaitingSink {
    /// Wrap `inner` so that sends wait on `resume` becoming `true`.
    ///
    /// `cancel` is the session's cancellation signal; a cancelled
    /// session unblocks every queued send with an error instead of
    /// leaving it parked forever.
    pub fn new(
        inner: Arc<dyn MessageSink>,
        resume: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            resume,
            cancel,
        }
    }

    /// Wait until the suspension lifts.
    ///
    /// Errors if the session is cancelled or the resume channel is
    /// dropped before the signal fires.
    async fn ready(&self) -> WsResult<()> {
        let mut resume = self.resume.clone();
        tokio::select! {
            result = resume.wait_for(|resumed| *resumed) => {
                result.map(|_| ()).map_err(|_| WsError::Cancelled)
            }
            _ = self.cancel.cancelled() => Err(WsError::Cancelled),
        }
    }
}

#[async_trait]
impl MessageSink for AwaitingSink {
    async fn send_text(&self, text: String) -> WsResult<()> {
        self.ready().await?;
        self.inner.send_text(text).await
    }

    async fn send_binary(&self, data: Bytes) -> WsResult<()> {
        self.ready().await?;
        self.inner.send_binary(data).await
    }

    async fn send_json(&self, value: &Value) -> WsResult<()> {
        self.ready().await?;
        self.inner.send_json(value).await
    }

    async fn send_result(&self, result: &SerializedResult) -> WsResult<()> {
        self.ready().await?;
        self.inner.send_result(result).await
    }

    async fn send_exception(&self, message: &str) -> WsResult<()> {
        self.ready().await?;
        self.inner.send_exception(message).await
    }

    async fn direct_to(&self, terminal: Box<dyn Terminal>, state: Option<Value>) -> WsResult<()> {
        self.ready().await?;
        self.inner.direct_to(terminal, state).await
    }

    async fn direct_to_shell(&self) -> WsResult<()> {
        self.ready().await?;
        self.inner.direct_to_shell().await
    }

    async fn stream_result(
        &self,
        result: Arc<SerializedResult>,
        chunk_size: Option<u64>,
    ) -> WsResult<()> {
        self.ready().await?;
        self.inner.stream_result(result, chunk_size).await
    }
}
