//! Session configuration.

use std::time::Duration;

/// The smallest chunk size a client may request for a stream.
pub const MIN_CHUNK_SIZE: u64 = 512;

/// The largest chunk size a client may request for a stream (16 MiB).
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ceiling for a non-streamed result body in bytes (default: 16 MiB).
    /// Larger results must be streamed.
    pub max_message_size: u64,
    /// Chunk size used when a stream request does not specify one
    /// (default: 1 MiB).
    pub default_chunk_size: u64,
    /// Flush threshold for incremental JSON writers in the resource
    /// layer. Tuning knob, not a protocol contract (default: 15,000).
    pub json_flush_threshold: usize,
    /// How long cached binary payloads are retained. Tuning knob, not a
    /// protocol contract (default: 3 seconds).
    pub binary_cache_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MiB
            default_chunk_size: 1024 * 1024,    // 1 MiB
            json_flush_threshold: 15_000,
            binary_cache_ttl: Duration::from_secs(3),
        }
    }
}

impl SessionConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the non-streamed message size ceiling.
    pub fn max_message_size(mut self, size: u64) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the default stream chunk size.
    pub fn default_chunk_size(mut self, size: u64) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Set the JSON writer flush threshold.
    pub fn json_flush_threshold(mut self, threshold: usize) -> Self {
        self.json_flush_threshold = threshold;
        self
    }

    /// Set the binary cache retention.
    pub fn binary_cache_ttl(mut self, ttl: Duration) -> Self {
        self.binary_cache_ttl = ttl;
        self
    }
}

/// Clamp a requested chunk size to `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
pub fn clamp_chunk_size(requested: u64) -> u64 {
    requested.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}
