//! WebSocket message types.
//!
//! One [`Message`] corresponds to one complete WebSocket message as the
//! transport delivers it: UTF-8 text, binary, a ping/pong health frame,
//! or a close frame. The protocol core never deals in partial frames.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{WsError, WsResult};

/// A complete WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Bytes),
    /// A ping frame with optional payload.
    Ping(Bytes),
    /// A pong frame with optional payload.
    Pong(Bytes),
    /// A close frame with optional code and reason.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a new text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a new binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Create a text message from a JSON-serializable value.
    pub fn from_json<T: Serialize>(value: &T) -> WsResult<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Create a close message with a code and reason.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    /// Check if this is a text message.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Check if this is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Check if this is a data message (text or binary).
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Get the payload as text, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the payload bytes, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => Some(b),
            Self::Close(_) => None,
        }
    }

    /// Parse the text payload as JSON.
    pub fn json<T: for<'de> serde::Deserialize<'de>>(&self) -> WsResult<T> {
        let text = self
            .as_text()
            .ok_or_else(|| WsError::receive_failed("not a text message"))?;
        Ok(serde_json::from_str(text)?)
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close(Some(frame)) => 2 + frame.reason.len(),
            Self::Close(None) => 0,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

/// Convert from a tungstenite message.
impl From<tungstenite::Message> for Message {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(s) => Self::Text(s.to_string()),
            tungstenite::Message::Binary(b) => Self::Binary(Bytes::from(b.to_vec())),
            tungstenite::Message::Ping(b) => Self::Ping(Bytes::from(b.to_vec())),
            tungstenite::Message::Pong(b) => Self::Pong(Bytes::from(b.to_vec())),
            tungstenite::Message::Close(frame) => Self::Close(frame.map(CloseFrame::from)),
            tungstenite::Message::Frame(_) => Self::Binary(Bytes::new()),
        }
    }
}

/// Convert to a tungstenite message.
impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(s) => Self::Text(s.into()),
            Message::Binary(b) => Self::Binary(b.to_vec().into()),
            Message::Ping(b) => Self::Ping(b.to_vec().into()),
            Message::Pong(b) => Self::Pong(b.to_vec().into()),
            Message::Close(frame) => {
                Self::Close(frame.map(tungstenite::protocol::CloseFrame::from))
            }
        }
    }
}

/// A WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close code (1000 for normal closure).
    pub code: u16,
    /// The close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Create a normal (1000) close frame.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: 1000,
            reason: reason.into(),
        }
    }
}

impl From<tungstenite::protocol::CloseFrame> for CloseFrame {
    fn from(frame: tungstenite::protocol::CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.to_string(),
        }
    }
}

impl From<CloseFrame> for tungstenite::protocol::CloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let msg = Message::text("hello");
        assert!(msg.is_text());
        assert!(msg.is_data());
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.len(), 5);
    }

    #[test]
    fn test_binary_message() {
        let msg = Message::binary(Bytes::from_static(&[1, 2, 3, 4]));
        assert!(msg.is_binary());
        assert_eq!(msg.as_bytes(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_json_round_trip() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Data {
            value: i32,
        }

        let msg = Message::from_json(&Data { value: 42 }).unwrap();
        assert!(msg.is_text());
        let parsed: Data = msg.json().unwrap();
        assert_eq!(parsed, Data { value: 42 });
    }

    #[test]
    fn test_close_frame() {
        let msg = Message::close(1000, "goodbye");
        assert!(msg.is_close());
        assert!(!msg.is_data());
        assert_eq!(msg.len(), 2 + "goodbye".len());
    }

    #[test]
    fn test_json_of_binary_fails() {
        let msg = Message::binary(Bytes::from_static(&[0xFF]));
        let result: WsResult<serde_json::Value> = msg.json();
        assert!(result.is_err());
    }
}
