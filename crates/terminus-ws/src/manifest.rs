//! Stream manifests.
//!
//! A [`StreamManifest`] is the precomputed chunking plan for one
//! serialized result: an ordered list of byte ranges that partition
//! `[0, total_length)` exactly, plus running progress counters. It is
//! sent to the client as JSON when a stream starts and on request
//! (`MANIFEST` / `OPTIONS`), and drives the client-paced chunk sends.

use serde::Serialize;

use crate::config::clamp_chunk_size;

/// One chunk of a streamed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Byte offset of the chunk in the result body.
    pub start_index: u64,
    /// Chunk length in bytes.
    pub length: u64,
    /// Whether the chunk has been sent.
    pub sent: bool,
}

/// The chunking plan and progress tracker for one streamed result.
///
/// Invariants: chunk ranges partition `[0, total_length)` exactly; the
/// sum of all chunk lengths equals `total_length`; the last chunk's
/// length is `total_length % chunk_size` unless that remainder is zero,
/// in which case it equals `chunk_size`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamManifest {
    /// Total length of the result body in bytes.
    pub total_length: u64,
    /// The chunk size the plan was computed with (after clamping).
    pub chunk_size: u64,
    /// Total number of chunk messages in the plan.
    pub nr_of_messages: u64,
    /// Number of chunk messages sent so far.
    pub messages_streamed: u64,
    /// Number of chunk messages not yet sent.
    pub messages_remaining: u64,
    /// Bytes sent so far.
    pub bytes_streamed: u64,
    /// Bytes not yet sent.
    pub bytes_remaining: u64,
    /// Index of the next chunk to send, `nr_of_messages` when done.
    pub current_message_index: u64,
    /// The ordered chunk plan.
    pub chunks: Vec<ChunkDescriptor>,
}

impl StreamManifest {
    /// Compute the chunking plan for a body of `total_length` bytes.
    ///
    /// The requested chunk size is clamped to
    /// [`MIN_CHUNK_SIZE`](crate::config::MIN_CHUNK_SIZE)..=[`MAX_CHUNK_SIZE`](crate::config::MAX_CHUNK_SIZE).
    /// `total_length` must be non-zero; empty results are never streamed.
    pub fn new(total_length: u64, requested_chunk_size: u64) -> Self {
        debug_assert!(total_length > 0, "empty results are sent directly");
        let chunk_size = clamp_chunk_size(requested_chunk_size);
        let nr_of_messages = total_length.div_ceil(chunk_size);

        let mut chunks = Vec::with_capacity(nr_of_messages as usize);
        let mut start_index = 0;
        while start_index < total_length {
            let length = chunk_size.min(total_length - start_index);
            chunks.push(ChunkDescriptor {
                start_index,
                length,
                sent: false,
            });
            start_index += length;
        }

        Self {
            total_length,
            chunk_size,
            nr_of_messages,
            messages_streamed: 0,
            messages_remaining: nr_of_messages,
            bytes_streamed: 0,
            bytes_remaining: total_length,
            current_message_index: 0,
            chunks,
        }
    }

    /// The next unsent chunk, if any.
    pub fn next_unsent(&self) -> Option<ChunkDescriptor> {
        self.chunks
            .get(self.current_message_index as usize)
            .copied()
            .filter(|chunk| !chunk.sent)
    }

    /// Mark the current chunk as sent and advance all counters.
    pub fn mark_sent(&mut self) {
        let index = self.current_message_index as usize;
        if let Some(chunk) = self.chunks.get_mut(index) {
            if !chunk.sent {
                chunk.sent = true;
                self.messages_streamed += 1;
                self.messages_remaining -= 1;
                self.bytes_streamed += chunk.length;
                self.bytes_remaining -= chunk.length;
                self.current_message_index += 1;
            }
        }
    }

    /// Whether every chunk has been sent.
    pub fn is_complete(&self) -> bool {
        self.messages_remaining == 0
    }

    /// Serialize the manifest to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        // Serialization of this plain struct cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
