//! Human-readable status lines.
//!
//! Outbound protocol notices are plain text lines of the form
//! `"<3-digit code>: <description>[ (<elapsed> ms)][. <info>][ (see <error-ref>)]"`,
//! e.g. `"499: Client closed request. Streamed 2 of 5 messages"`.

use std::fmt;
use std::time::Duration;

/// A builder for one outbound status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    code: u16,
    description: String,
    elapsed: Option<Duration>,
    info: Option<String>,
    error_ref: Option<String>,
}

impl StatusLine {
    /// Create a new status line.
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            elapsed: None,
            info: None,
            error_ref: None,
        }
    }

    /// A `200: OK` status.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// A `499: Client closed request` status.
    pub fn client_closed() -> Self {
        Self::new(499, "Client closed request")
    }

    /// A `500: Error during streaming` status.
    pub fn streaming_error() -> Self {
        Self::new(500, "Error during streaming")
    }

    /// Attach the time spent producing the result.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Attach an informational suffix.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Attach an error reference.
    pub fn with_error_ref(mut self, error_ref: impl Into<String>) -> Self {
        self.error_ref = Some(error_ref.into());
        self
    }

    /// The status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// A `"Streamed <x> of <y> messages"` progress suffix.
    pub fn streamed_info(streamed: u64, total: u64) -> String {
        format!("Streamed {streamed} of {total} messages")
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}: {}", self.code, self.description)?;
        if let Some(elapsed) = self.elapsed {
            write!(f, " ({} ms)", elapsed.as_millis())?;
        }
        if let Some(info) = &self.info {
            write!(f, ". {info}")?;
        }
        if let Some(error_ref) = &self.error_ref {
            write!(f, " (see {error_ref})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal() {
        assert_eq!(StatusLine::new(200, "OK").to_string(), "200: OK");
    }

    #[test]
    fn test_full_form() {
        let line = StatusLine::new(500, "Error during streaming")
            .with_elapsed(Duration::from_millis(42))
            .with_info("Streamed 2 of 5 messages")
            .with_error_ref("/errors/7");
        assert_eq!(
            line.to_string(),
            "500: Error during streaming (42 ms). Streamed 2 of 5 messages (see /errors/7)"
        );
    }

    #[test]
    fn test_code_is_zero_padded() {
        assert_eq!(StatusLine::new(99, "odd").to_string(), "099: odd");
    }

    #[test]
    fn test_streamed_info() {
        assert_eq!(
            StatusLine::streamed_info(2, 5),
            "Streamed 2 of 5 messages"
        );
    }

    #[test]
    fn test_client_closed() {
        let line = StatusLine::client_closed().with_info(StatusLine::streamed_info(2, 5));
        assert_eq!(
            line.to_string(),
            "499: Client closed request. Streamed 2 of 5 messages"
        );
    }
}
