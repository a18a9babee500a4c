//! Session state and send primitives.
//!
//! A [`Session`] owns one client connection: the status state machine,
//! byte accounting, the cancellation signal, the set of in-flight
//! message-handling tasks, and the low-level send path to the transport.
//! Terminal hosting and streaming sit on top of it in
//! [`Connection`](crate::connection::Connection).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use uuid::Uuid;

use terminus_core::{ClientIdentity, ConnectionEvent, SerializedResult, SessionEventSink};

use crate::config::SessionConfig;
use crate::error::{WsError, WsResult};
use crate::message::Message;
use crate::status::StatusLine;
use crate::transport::Transport;

/// A unique identifier for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a connection ID from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The session status state machine.
///
/// ```text
/// Waiting -> Open <-> Suspended
///              \         /
///               v       v
///              PendingClose -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Transport accepted, protocol handshake not yet completed.
    Waiting,
    /// Bidirectional I/O allowed.
    Open,
    /// Terminal I/O deferred while a stream owns the socket.
    Suspended,
    /// Disposal started; no further sends.
    PendingClose,
    /// Terminal state.
    Closed,
}

impl SessionStatus {
    /// Whether the given transition is allowed by the state machine.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Waiting, Self::Open)
                | (Self::Open, Self::Suspended)
                | (Self::Suspended, Self::Open)
                | (Self::Open | Self::Suspended, Self::PendingClose)
                | (Self::PendingClose, Self::Closed)
        )
    }

    /// Whether the session is past the point of sending.
    pub fn is_closing(self) -> bool {
        matches!(self, Self::PendingClose | Self::Closed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Waiting => "Waiting",
            Self::Open => "Open",
            Self::Suspended => "Suspended",
            Self::PendingClose => "PendingClose",
            Self::Closed => "Closed",
        };
        write!(f, "{name}")
    }
}

/// Context from the completed transport upgrade, supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct HandshakeContext {
    /// The host the client connected to.
    pub host: String,
    /// The client's IP address.
    pub client_ip: String,
    /// Whether the connection is TLS-encrypted.
    pub is_encrypted: bool,
    /// Custom headers carried on the upgrade request.
    pub headers: HashMap<String, String>,
}

impl HandshakeContext {
    /// Create a new handshake context.
    pub fn new(host: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client_ip: client_ip.into(),
            ..Self::default()
        }
    }

    /// Mark the connection as TLS-encrypted.
    pub fn encrypted(mut self) -> Self {
        self.is_encrypted = true;
        self
    }

    /// Attach a custom header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// One live client connection and its bookkeeping.
pub struct Session {
    id: ConnectionId,
    config: SessionConfig,
    identity: ClientIdentity,
    transport: Arc<dyn Transport>,
    status: RwLock<SessionStatus>,
    opened_at: RwLock<Option<DateTime<Utc>>>,
    closed_at: RwLock<Option<DateTime<Utc>>>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    cancel: CancellationToken,
    tasks: TaskTracker,
    events: Arc<dyn SessionEventSink>,
}

impl Session {
    /// Create a new session in `Waiting` status.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        identity: ClientIdentity,
        events: Arc<dyn SessionEventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            config,
            identity,
            transport,
            status: RwLock::new(SessionStatus::Waiting),
            opened_at: RwLock::new(None),
            closed_at: RwLock::new(None),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            events,
        })
    }

    /// The connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The owning client identity.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// The current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// When the session was opened, if it has been.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        *self.opened_at.read()
    }

    /// When the session was closed, if it has been.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        *self.closed_at.read()
    }

    /// Cumulative bytes sent to the client.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Cumulative bytes received from the client.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// The session's cancellation signal, triggered once at disposal start.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The tracker for in-flight message-handling tasks.
    pub fn task_tracker(&self) -> &TaskTracker {
        &self.tasks
    }

    /// The observability sink.
    pub fn events(&self) -> &Arc<dyn SessionEventSink> {
        &self.events
    }

    /// Record an inbound message for byte accounting.
    pub fn record_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
        self.events.input_received(&self.id.to_string(), byte_count);
    }

    /// Apply a status transition, validating it against the state machine.
    pub(crate) fn transition(&self, to: SessionStatus) -> WsResult<()> {
        let mut status = self.status.write();
        if !status.can_transition(to) {
            return Err(WsError::invalid_status(
                *status,
                format!("transition to {to}"),
            ));
        }
        debug!(connection_id = %self.id, from = %*status, to = %to, "status transition");
        *status = to;
        match to {
            SessionStatus::Open if self.opened_at.read().is_none() => {
                *self.opened_at.write() = Some(Utc::now());
            }
            SessionStatus::Closed => {
                *self.closed_at.write() = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Begin disposal: move to `PendingClose` unless already closing.
    ///
    /// Returns `false` if disposal had already started (idempotency).
    pub(crate) fn begin_close(&self) -> bool {
        let mut status = self.status.write();
        if status.is_closing() {
            return false;
        }
        debug!(connection_id = %self.id, from = %*status, "disposal started");
        *status = SessionStatus::PendingClose;
        true
    }

    /// A bookkeeping snapshot for lifecycle events.
    pub fn event_snapshot(&self) -> ConnectionEvent {
        ConnectionEvent {
            connection_id: self.id.to_string(),
            client_id: self.identity.client_id.clone(),
            opened_at: self.opened_at(),
            closed_at: self.closed_at(),
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
        }
    }

    /// Check that the session can send in its current status.
    fn ensure_sendable(&self, operation: &str) -> WsResult<()> {
        match self.status() {
            SessionStatus::Open | SessionStatus::Suspended => Ok(()),
            SessionStatus::Waiting => Err(WsError::invalid_status(SessionStatus::Waiting, operation)),
            SessionStatus::PendingClose | SessionStatus::Closed => Err(WsError::NotConnected),
        }
    }

    /// Send one message directly on the transport.
    ///
    /// This is the direct channel: it bypasses any terminal suspension,
    /// which is what stream control messages rely on.
    pub async fn send(&self, message: Message) -> WsResult<()> {
        self.ensure_sendable("send")?;
        let byte_count = message.len() as u64;
        tokio::select! {
            result = self.transport.send(message) => {
                result?;
                self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
                self.events.output_sent(&self.id.to_string(), byte_count);
                Ok(())
            }
            _ = self.cancel.cancelled() => Err(WsError::Cancelled),
        }
    }

    /// Send a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message.
    pub async fn send_binary(&self, data: impl Into<bytes::Bytes>) -> WsResult<()> {
        self.send(Message::binary(data.into())).await
    }

    /// Send a JSON value as one text message.
    pub async fn send_json(&self, value: &Value) -> WsResult<()> {
        self.send(Message::from_json(value)?).await
    }

    /// Send a status line as one text message.
    pub async fn send_status(&self, status: &StatusLine) -> WsResult<()> {
        self.send_text(status.to_string()).await
    }

    /// Send a serialized result as a status line plus its body.
    ///
    /// Bodies larger than the configured `max_message_size` are rejected
    /// with [`WsError::MessageTooLarge`]; such results must be streamed.
    pub async fn send_result(&self, result: &SerializedResult) -> WsResult<()> {
        self.ensure_sendable("send_result")?;
        let size = result.total_length();
        if size > self.config.max_message_size {
            return Err(WsError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }

        let mut status = StatusLine::new(result.status_code(), describe_code(result.status_code()));
        if let Some(elapsed) = result.elapsed() {
            status = status.with_elapsed(elapsed);
        }
        if let Some(error_ref) = result.error_ref() {
            status = status.with_error_ref(error_ref);
        }
        self.send_status(&status).await?;

        if !result.is_empty() {
            self.send(body_message(result)).await?;
        }
        Ok(())
    }

    /// Send a best-effort exception notification to the client.
    pub async fn send_exception(&self, message: &str) -> WsResult<()> {
        self.send_status(&StatusLine::new(500, message.to_string()))
            .await
    }

    /// Close the underlying transport.
    pub(crate) async fn close_transport(&self) {
        if let Err(e) = self.transport.close().await {
            debug!(connection_id = %self.id, error = %e, "transport close failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("client", &self.identity.client_id)
            .finish_non_exhaustive()
    }
}

/// Turn a result body into one outbound message, text where the content
/// type allows it.
fn body_message(result: &SerializedResult) -> Message {
    if is_textual(result.content_type()) {
        match std::str::from_utf8(result.body()) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(result.body().clone()),
        }
    } else {
        Message::binary(result.body().clone())
    }
}

fn is_textual(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
}

fn describe_code(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No content",
        400 => "Bad request",
        403 => "Forbidden",
        404 => "Not found",
        500 => "Internal server error",
        _ => "Result",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use bytes::Bytes;
    use terminus_core::TracingEventSink;

    fn make_session() -> (Arc<Session>, Arc<MockTransport>) {
        let transport = MockTransport::new();
        let session = Session::new(
            transport.clone(),
            SessionConfig::default(),
            ClientIdentity::anonymous(),
            Arc::new(TracingEventSink),
        );
        (session, transport)
    }

    #[test]
    fn test_transition_graph() {
        use SessionStatus::*;
        assert!(Waiting.can_transition(Open));
        assert!(Open.can_transition(Suspended));
        assert!(Suspended.can_transition(Open));
        assert!(Open.can_transition(PendingClose));
        assert!(Suspended.can_transition(PendingClose));
        assert!(PendingClose.can_transition(Closed));

        assert!(!Waiting.can_transition(Suspended));
        assert!(!Waiting.can_transition(Closed));
        assert!(!Closed.can_transition(Open));
        assert!(!Closed.can_transition(Waiting));
        assert!(!Closed.can_transition(PendingClose));
        assert!(!Suspended.can_transition(Waiting));
        assert!(!Open.can_transition(Closed));
    }

    #[tokio::test]
    async fn test_send_while_waiting_is_rejected() {
        let (session, transport) = make_session();
        let result = session.send_text("early").await;
        assert!(matches!(result, Err(WsError::InvalidStatus { .. })));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_open() {
        let (session, transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();

        session.send_text("hello").await.unwrap();
        assert_eq!(transport.sent_texts(), ["hello"]);
        assert_eq!(session.bytes_sent(), 5);
        assert!(session.opened_at().is_some());
    }

    #[tokio::test]
    async fn test_send_to_closed_fails_not_connected() {
        let (session, _transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();
        session.transition(SessionStatus::PendingClose).unwrap();

        assert!(matches!(
            session.send_text("late").await,
            Err(WsError::NotConnected)
        ));

        session.transition(SessionStatus::Closed).unwrap();
        assert!(matches!(
            session.send_text("later").await,
            Err(WsError::NotConnected)
        ));
        assert!(session.closed_at().is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let (session, _transport) = make_session();
        let result = session.transition(SessionStatus::Suspended);
        assert!(matches!(result, Err(WsError::InvalidStatus { .. })));
        assert_eq!(session.status(), SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_begin_close_is_idempotent() {
        let (session, _transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();

        assert!(session.begin_close());
        assert!(!session.begin_close());
        assert_eq!(session.status(), SessionStatus::PendingClose);
    }

    #[tokio::test]
    async fn test_send_result_too_large() {
        let transport = MockTransport::new();
        let session = Session::new(
            transport.clone(),
            SessionConfig::new().max_message_size(8),
            ClientIdentity::anonymous(),
            Arc::new(TracingEventSink),
        );
        session.transition(SessionStatus::Open).unwrap();

        let result = SerializedResult::new(Bytes::from(vec![0u8; 16]), "application/json");
        let err = session.send_result(&result).await.unwrap_err();
        assert!(matches!(err, WsError::MessageTooLarge { size: 16, max: 8 }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_result_status_and_body() {
        let (session, transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();

        let result = SerializedResult::new(Bytes::from_static(b"{\"a\":1}"), "application/json");
        session.send_result(&result).await.unwrap();

        let texts = transport.sent_texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "200: OK");
        assert_eq!(texts[1], "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_send_result_binary_body() {
        let (session, transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();

        let result = SerializedResult::new(
            Bytes::from_static(&[0xDE, 0xAD]),
            "application/octet-stream",
        );
        session.send_result(&result).await.unwrap();

        assert_eq!(transport.binary_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_send() {
        let (session, _transport) = make_session();
        session.transition(SessionStatus::Open).unwrap();
        session.cancellation_token().cancel();

        // The select may still pick the completed transport send; a
        // pre-cancelled token makes the cancel branch eligible, and the
        // mock resolves immediately, so accept either outcome but never
        // a hang.
        let result =
            tokio::time::timeout(std::time::Duration::from_secs(1), session.send_text("x")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_received_accounting() {
        let (session, _transport) = make_session();
        session.record_received(10);
        session.record_received(5);
        assert_eq!(session.bytes_received(), 15);
    }
}
