//! Serialized results.
//!
//! A [`SerializedResult`] is an already-materialized query result: a
//! seekable byte body plus the metadata needed to present it to a
//! client. The protocol core never serializes anything itself - the
//! resource layer hands it a finished body, and the core either sends it
//! as one message or streams it in chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{CoreError, CoreResult};

/// An already-serialized, seekable result body.
///
/// The lock flag is the sole synchronization primitive protecting the
/// body from concurrent chunk reads: a stream locks the result when it
/// starts and unlocks it only when its manifest is disposed, whether by
/// completion, client close, or error.
#[derive(Debug)]
pub struct SerializedResult {
    body: Bytes,
    content_type: String,
    status_code: u16,
    elapsed: Option<Duration>,
    error_ref: Option<String>,
    locked: AtomicBool,
}

impl SerializedResult {
    /// Create a new serialized result with a `200` status code.
    pub fn new(body: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            body,
            content_type: content_type.into(),
            status_code: 200,
            elapsed: None,
            error_ref: None,
            locked: AtomicBool::new(false),
        }
    }

    /// Set the status code of the underlying result.
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    /// Set the time the resource layer spent producing the result.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Set an error reference (e.g. a support ticket URI).
    pub fn with_error_ref(mut self, error_ref: impl Into<String>) -> Self {
        self.error_ref = Some(error_ref.into());
        self
    }

    /// The content type of the body.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The status code of the underlying result.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The time the resource layer spent producing the result.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// The error reference, if any.
    pub fn error_ref(&self) -> Option<&str> {
        self.error_ref.as_deref()
    }

    /// Total body length in bytes.
    pub fn total_length(&self) -> u64 {
        self.body.len() as u64
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The full body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Read exactly `len` bytes starting at `start`.
    ///
    /// The returned [`Bytes`] is a cheap slice of the shared body.
    pub fn read_range(&self, start: u64, len: u64) -> CoreResult<Bytes> {
        let total = self.total_length();
        let end = start.checked_add(len).filter(|end| *end <= total);
        match end {
            Some(end) => Ok(self.body.slice(start as usize..end as usize)),
            None => Err(CoreError::OutOfRange { start, len, total }),
        }
    }

    /// Try to lock the result for streaming.
    ///
    /// Returns `false` if it is already locked to another stream.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the stream lock.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Whether the result is locked to an active stream.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}
