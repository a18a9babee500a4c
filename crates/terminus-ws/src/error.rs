//! Error types for session protocol operations.
//!
//! This module defines the error taxonomy of the protocol core: protocol
//! misuse (wrong status, double streams, unsupported input), transient
//! I/O failures during streaming, and fatal session failures.

use thiserror::Error;

use terminus_core::CoreError;

/// Result type for session protocol operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur during session protocol operations.
#[derive(Debug, Error)]
pub enum WsError {
    /// The session is closed or closing; no further sends are possible.
    #[error("not connected: the session is closed or closing")]
    NotConnected,

    /// The operation is not allowed in the session's current status.
    #[error("invalid operation for current status {status}: {operation}")]
    InvalidStatus {
        /// The session status at the time of the call.
        status: String,
        /// The attempted operation.
        operation: String,
    },

    /// A stream is already active on this session.
    #[error("a result stream is already active on this session")]
    AlreadyStreaming,

    /// The binding already has an outstanding suspend/resume cycle.
    #[error("the terminal binding is already suspended")]
    AlreadySuspended,

    /// The result body is locked to a different stream.
    #[error("the result is locked to a different stream")]
    ResultLocked,

    /// The active terminal declines this input kind.
    #[error("terminal '{terminal}' does not support {kind} input")]
    UnsupportedInput {
        /// The declined input kind ("text" or "binary").
        kind: String,
        /// The name of the terminal that declined it.
        terminal: String,
    },

    /// The operation is not supported by this send target.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A non-streamed message exceeds the configured size ceiling.
    #[error("message of {size} bytes exceeds the {max} byte limit, use streaming instead")]
    MessageTooLarge {
        /// The message size in bytes.
        size: u64,
        /// The configured ceiling in bytes.
        max: u64,
    },

    /// No session is registered under the given connection id.
    #[error("connection not found: {connection_id}")]
    ConnectionNotFound {
        /// The unknown connection id.
        connection_id: String,
    },

    /// An unrecognized global or streaming command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Failed to send a message on the transport.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Failed to receive a message from the transport.
    #[error("failed to receive message: {0}")]
    ReceiveFailed(String),

    /// One or more members of a broadcast failed.
    #[error("broadcast failed for {} member(s): {}", failures.len(), failures.join("; "))]
    Broadcast {
        /// One entry per failed member, `"<connection id>: <error>"`.
        failures: Vec<String>,
    },

    /// The session's cancellation signal fired while the operation was pending.
    #[error("operation cancelled: the session is shutting down")]
    Cancelled,

    /// An error raised by a terminal or serialized result.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tungstenite::Error),
}

impl WsError {
    /// Create a new invalid-status error.
    pub fn invalid_status(status: impl ToString, operation: impl Into<String>) -> Self {
        Self::InvalidStatus {
            status: status.to_string(),
            operation: operation.into(),
        }
    }

    /// Create a new unsupported-input error.
    pub fn unsupported_input(kind: impl Into<String>, terminal: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            kind: kind.into(),
            terminal: terminal.into(),
        }
    }

    /// Create a new unsupported-operation error.
    pub fn unsupported_operation(reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation(reason.into())
    }

    /// Create a new connection-not-found error.
    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    /// Create a new send-failed error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed(reason.into())
    }

    /// Create a new receive-failed error.
    pub fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed(reason.into())
    }

    /// Whether this error is fatal to the session.
    ///
    /// Protocol misuse is resolved locally with a reply to the client and
    /// leaves the session usable; transport failures are not recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::SendFailed(_)
                | Self::ReceiveFailed(_)
                | Self::Io(_)
                | Self::Tungstenite(_)
                // Sink errors reported by a terminal wrap a failed send.
                | Self::Core(CoreError::Sink(_))
        )
    }

    /// The status code used when reflecting this error back to the client.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MessageTooLarge { .. } => 413,
            Self::UnknownCommand(_) | Self::ConnectionNotFound { .. } => 404,
            Self::NotConnected
            | Self::SendFailed(_)
            | Self::ReceiveFailed(_)
            | Self::Io(_)
            | Self::Tungstenite(_)
            | Self::Core(CoreError::Sink(_)) => 500,
            // Malformed JSON almost always arrives in client input.
            Self::Json(_) => 400,
            _ => 400,
        }
    }
}
