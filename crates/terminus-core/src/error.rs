//! Error types for collaborator contracts.

use thiserror::Error;

/// Result type for collaborator operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by terminals and serialized results.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A send through the terminal's sink failed.
    #[error("sink error: {0}")]
    Sink(String),

    /// A range read fell outside the result body.
    #[error("range [{start}, {start}+{len}) out of bounds for body of {total} bytes")]
    OutOfRange {
        /// Start offset of the requested range.
        start: u64,
        /// Length of the requested range.
        len: u64,
        /// Total body length.
        total: u64,
    },

    /// The result body is locked by an active stream.
    #[error("result is locked by an active stream")]
    ResultLocked,

    /// The terminal rejected a state replacement.
    #[error("invalid terminal state: {0}")]
    InvalidState(String),

    /// The terminal does not accept this kind of input.
    #[error("terminal does not support {kind} input")]
    UnsupportedInput {
        /// The declined input kind ("text" or "binary").
        kind: &'static str,
    },
}

impl CoreError {
    /// Create a new sink error.
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink(reason.into())
    }

    /// Create a new invalid-state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Create an unsupported-input error for text input.
    pub fn unsupported_text() -> Self {
        Self::UnsupportedInput { kind: "text" }
    }

    /// Create an unsupported-input error for binary input.
    pub fn unsupported_binary() -> Self {
        Self::UnsupportedInput { kind: "binary" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_display() {
        let err = CoreError::OutOfRange {
            start: 10,
            len: 20,
            total: 15,
        };
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn test_unsupported_input_display() {
        assert!(CoreError::unsupported_text().to_string().contains("text"));
        assert!(CoreError::unsupported_binary()
            .to_string()
            .contains("binary"));
    }
}
