//! Client-paced result streaming.
//!
//! While a stream is active the client drives delivery with short text
//! commands ([`StreamCommand`]); the server side of the exchange is a
//! [`StreamJob`] pairing the locked result body with its chunking plan.

use std::sync::Arc;

use terminus_core::SerializedResult;

use crate::error::WsResult;
use crate::manifest::StreamManifest;
use crate::message::Message;
use crate::session::Session;
use crate::status::StatusLine;

/// A pacing command received from the client during an active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    /// Resend the manifest (`MANIFEST` or `OPTIONS`).
    Manifest,
    /// Send the next `n` chunks (`NEXT`, `NEXT <n>`).
    Next(u64),
    /// Send every remaining chunk and dispose the manifest (`GET`).
    Get,
    /// Abandon the stream (`CLOSE`).
    Close,
}

impl StreamCommand {
    /// Parse a pacing command, case-insensitively.
    ///
    /// Returns `None` for anything outside the pacing grammar; the
    /// caller reflects those back to the client as a `400` notice.
    pub fn parse(input: &str) -> Option<Self> {
        let mut words = input.split_whitespace();
        let verb = words.next()?.to_ascii_uppercase();
        let argument = words.next();
        if words.next().is_some() {
            return None;
        }
        match (verb.as_str(), argument) {
            ("MANIFEST" | "OPTIONS", None) => Some(Self::Manifest),
            ("GET", None) => Some(Self::Get),
            ("NEXT", None) => Some(Self::Next(1)),
            ("NEXT", Some(count)) => count.parse().ok().filter(|n| *n > 0).map(Self::Next),
            ("CLOSE", None) => Some(Self::Close),
            _ => None,
        }
    }
}

/// How an active stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// All chunks delivered.
    Completed,
    /// The client sent `CLOSE` before completion.
    ClientClosed,
    /// A chunk send failed.
    Failed,
}

/// One active stream: the locked result and its chunking plan.
///
/// The owning connection holds the job while the session is suspended;
/// releasing the job unlocks the result and lifts the suspension.
#[derive(Debug)]
pub struct StreamJob {
    result: Arc<SerializedResult>,
    manifest: StreamManifest,
}

impl StreamJob {
    /// Create a job for a locked result.
    pub fn new(result: Arc<SerializedResult>, requested_chunk_size: u64) -> Self {
        let manifest = StreamManifest::new(result.total_length(), requested_chunk_size);
        Self { result, manifest }
    }

    /// The locked result being streamed.
    pub fn result(&self) -> &Arc<SerializedResult> {
        &self.result
    }

    /// The chunking plan and progress counters.
    pub fn manifest(&self) -> &StreamManifest {
        &self.manifest
    }

    /// Whether every chunk has been delivered.
    pub fn is_complete(&self) -> bool {
        self.manifest.is_complete()
    }

    /// A `"Streamed <x> of <y> messages"` progress suffix.
    pub fn progress_info(&self) -> String {
        StatusLine::streamed_info(self.manifest.messages_streamed, self.manifest.nr_of_messages)
    }

    /// Send the current manifest as one JSON text message.
    ///
    /// Control messages go through the session's direct channel, past
    /// the suspended terminal sink.
    pub async fn send_manifest(&self, session: &Session) -> WsResult<()> {
        session.send_json(&self.manifest.to_json()).await
    }

    /// Send up to `count` chunks in plan order.
    ///
    /// Stops early when the plan is exhausted; returns the number of
    /// chunks actually sent. A failed send leaves the failed chunk
    /// unmarked so progress counters stay truthful.
    pub async fn send_chunks(&mut self, session: &Session, count: u64) -> WsResult<u64> {
        let mut sent = 0;
        for _ in 0..count {
            let Some(chunk) = self.manifest.next_unsent() else {
                break;
            };
            let data = self.result.read_range(chunk.start_index, chunk.length)?;
            session.send(Message::binary(data)).await?;
            self.manifest.mark_sent();
            sent += 1;
        }
        Ok(sent)
    }
}
