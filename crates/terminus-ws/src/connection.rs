//! One client connection: session, terminal binding, and stream state.
//!
//! [`Connection`] composes the pieces: the [`Session`] send path, the
//! currently bound terminal, and the active [`StreamJob`] if a result
//! stream holds the socket. It also provides [`ConnectionSink`], the
//! [`MessageSink`] handed to terminal bindings.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use terminus_core::{ClientIdentity, SerializedResult, SessionEventSink, Shell, Terminal};

use crate::binding::TerminalBinding;
use crate::config::SessionConfig;
use crate::error::{WsError, WsResult};
use crate::profile::ConnectionProfile;
use crate::session::{HandshakeContext, Session, SessionStatus};
use crate::sink::MessageSink;
use crate::status::StatusLine;
use crate::stream::{StreamCommand, StreamJob, StreamOutcome};
use crate::transport::Transport;

/// Factory for the default terminal bound on open and via `#SHELL`.
pub type ShellFactory = Box<dyn Fn() -> Box<dyn Terminal> + Send + Sync>;

/// One client connection and everything bound to it.
pub struct Connection {
    session: Arc<Session>,
    binding: Mutex<Option<Arc<TerminalBinding>>>,
    stream: Mutex<Option<StreamJob>>,
    shell_factory: ShellFactory,
    profile: RwLock<ConnectionProfile>,
}

impl Connection {
    /// Create a connection in `Waiting` status.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        identity: ClientIdentity,
        handshake: &HandshakeContext,
        events: Arc<dyn SessionEventSink>,
    ) -> Arc<Self> {
        Self::with_shell_factory(
            transport,
            config,
            identity,
            handshake,
            events,
            Box::new(|| Box::new(Shell::new())),
        )
    }

    /// Create a connection with a custom default-terminal factory.
    pub fn with_shell_factory(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        identity: ClientIdentity,
        handshake: &HandshakeContext,
        events: Arc<dyn SessionEventSink>,
        shell_factory: ShellFactory,
    ) -> Arc<Self> {
        let session = Session::new(transport, config, identity, events);
        let profile = ConnectionProfile::from_handshake(handshake, session.id());
        Arc::new(Self {
            session,
            binding: Mutex::new(None),
            stream: Mutex::new(None),
            shell_factory,
            profile: RwLock::new(profile),
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Complete the protocol handshake: move to `Open` and bind the
    /// default shell terminal.
    pub async fn open(self: &Arc<Self>) -> WsResult<()> {
        self.session.transition(SessionStatus::Open)?;
        self.session
            .events()
            .connection_opened(&self.session.event_snapshot());
        info!(connection_id = %self.session.id(), client = %self.session.identity(), "session opened");
        self.direct_to_shell().await
    }

    /// The base sink for this connection.
    ///
    /// Holds a weak reference; sends after the connection is dropped
    /// fail with [`WsError::NotConnected`].
    pub fn sink(self: &Arc<Self>) -> Arc<dyn MessageSink> {
        Arc::new(ConnectionSink {
            conn: Arc::downgrade(self),
        })
    }

    /// The currently bound terminal, if any.
    pub async fn binding(&self) -> Option<Arc<TerminalBinding>> {
        self.binding.lock().await.clone()
    }

    /// Whether a result stream currently holds the socket.
    pub async fn stream_active(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// The connection profile, with live fields refreshed.
    pub fn profile_snapshot(&self) -> ConnectionProfile {
        let mut profile = self.profile.read().clone();
        profile.opened_at = self.session.opened_at();
        profile
    }

    /// Merge a client-submitted profile update (custom headers only).
    pub fn merge_profile(&self, update: &ConnectionProfile) {
        self.profile.write().merge_update(update);
    }

    /// Bind a terminal, replacing and disposing the previous one.
    pub async fn bind_terminal(
        self: &Arc<Self>,
        terminal: Box<dyn Terminal>,
        state: Option<Value>,
    ) -> WsResult<()> {
        if self.session.status() != SessionStatus::Open
            && self.session.status() != SessionStatus::Waiting
        {
            return Err(WsError::invalid_status(self.session.status(), "bind terminal"));
        }

        let binding = TerminalBinding::new(
            terminal,
            self.sink(),
            self.session.cancellation_token().clone(),
        );
        let previous = {
            let mut slot = self.binding.lock().await;
            std::mem::replace(&mut *slot, Some(binding.clone()))
        };
        self.profile.write().terminal = binding.terminal_name().to_string();
        debug!(
            connection_id = %self.session.id(),
            terminal = binding.terminal_name(),
            "terminal bound"
        );

        // The replaced terminal may be the one whose handler requested
        // the switch, with its handler lock still held; its dispose hook
        // runs once that handler returns. Tracked, so session disposal
        // waits for it.
        if let Some(previous) = previous {
            self.session
                .task_tracker()
                .spawn(async move { previous.dispose().await });
        }

        binding.install(state).await
    }

    /// Bind the default shell terminal.
    pub async fn direct_to_shell(self: &Arc<Self>) -> WsResult<()> {
        self.bind_terminal((self.shell_factory)(), None).await
    }

    /// Forward one inbound text message to the bound terminal.
    pub async fn handle_text(&self, input: String) -> WsResult<()> {
        let binding = self
            .binding()
            .await
            .ok_or_else(|| WsError::invalid_status(self.session.status(), "text input"))?;
        binding.forward_text(input).await
    }

    /// Forward one inbound binary message to the bound terminal.
    pub async fn handle_binary(&self, input: Bytes) -> WsResult<()> {
        let binding = self
            .binding()
            .await
            .ok_or_else(|| WsError::invalid_status(self.session.status(), "binary input"))?;
        binding.forward_binary(input).await
    }

    /// Start a client-paced stream of a large result.
    ///
    /// Locks the result, suspends terminal output, moves the session to
    /// `Suspended` and sends the manifest. Empty results degrade to a
    /// single direct send with no suspension.
    pub async fn stream_result(
        self: &Arc<Self>,
        result: Arc<SerializedResult>,
        chunk_size: Option<u64>,
    ) -> WsResult<()> {
        if result.is_empty() {
            return self.session.send_result(&result).await;
        }

        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Err(WsError::AlreadyStreaming);
        }
        if self.session.status() != SessionStatus::Open {
            return Err(WsError::invalid_status(self.session.status(), "stream result"));
        }
        if !result.try_lock() {
            return Err(WsError::ResultLocked);
        }

        let suspended = match self.binding().await {
            Some(binding) => match binding.suspend() {
                Ok(()) => true,
                Err(e) => {
                    result.unlock();
                    return Err(e);
                }
            },
            None => false,
        };
        if let Err(e) = self.session.transition(SessionStatus::Suspended) {
            result.unlock();
            if suspended {
                if let Some(binding) = self.binding().await {
                    binding.unsuspend();
                }
            }
            return Err(e);
        }

        let chunk_size = chunk_size.unwrap_or(self.session.config().default_chunk_size);
        let job = StreamJob::new(result, chunk_size);
        info!(
            connection_id = %self.session.id(),
            total_length = job.manifest().total_length,
            nr_of_messages = job.manifest().nr_of_messages,
            "stream started"
        );
        job.send_manifest(&self.session).await?;
        *stream = Some(job);
        Ok(())
    }

    /// Handle one inbound text message while a stream holds the socket.
    pub async fn handle_stream_command(self: &Arc<Self>, input: &str) -> WsResult<()> {
        let Some(command) = StreamCommand::parse(input) else {
            return self
                .session
                .send_status(&StatusLine::new(
                    400,
                    "Unrecognized stream command, expected MANIFEST, OPTIONS, GET, NEXT [n] or CLOSE",
                ))
                .await;
        };

        let mut stream = self.stream.lock().await;
        let Some(job) = stream.as_mut() else {
            return Err(WsError::invalid_status(self.session.status(), "stream command"));
        };

        match command {
            StreamCommand::Manifest => job.send_manifest(&self.session).await,
            StreamCommand::Next(_) | StreamCommand::Get => {
                // GET drains the plan; NEXT sends a bounded batch.
                let count = match command {
                    StreamCommand::Next(n) => n,
                    _ => job.manifest().messages_remaining,
                };
                let outcome = job.send_chunks(&self.session, count).await;
                let complete = job.is_complete();
                match outcome {
                    Ok(_) if complete => {
                        self.release_stream(&mut stream, StreamOutcome::Completed).await
                    }
                    Ok(_) => Ok(()),
                    Err(e) => {
                        warn!(connection_id = %self.session.id(), error = %e, "chunk send failed");
                        let _ = self.session.send_exception(&e.to_string()).await;
                        // The failure ends this stream only; the session
                        // stays usable unless the release sends fail too.
                        self.release_stream(&mut stream, StreamOutcome::Failed).await
                    }
                }
            }
            StreamCommand::Close => self.release_stream(&mut stream, StreamOutcome::ClientClosed).await,
        }
    }

    /// Release the active stream: final status notice, unlock, resume.
    async fn release_stream(
        &self,
        stream: &mut Option<StreamJob>,
        outcome: StreamOutcome,
    ) -> WsResult<()> {
        let Some(job) = stream.take() else {
            return Ok(());
        };
        let progress = job.progress_info();
        let status = match outcome {
            StreamOutcome::Completed => StatusLine::ok().with_info(progress),
            StreamOutcome::ClientClosed => StatusLine::client_closed().with_info(progress),
            StreamOutcome::Failed => StatusLine::streaming_error().with_info(progress),
        };
        // Notice goes out on the direct channel before the suspension
        // lifts, so queued terminal output lands after it.
        let notice = self.session.send_status(&status).await;

        job.result().unlock();
        self.session.transition(SessionStatus::Open)?;
        if let Some(binding) = self.binding.lock().await.as_ref() {
            binding.unsuspend();
        }
        info!(connection_id = %self.session.id(), outcome = ?outcome, "stream released");
        notice
    }

    /// Dispose the connection: cancel in-flight work, unwind the stream
    /// and binding, close the transport.
    ///
    /// Idempotent; concurrent calls after the first return immediately.
    pub async fn dispose(self: &Arc<Self>) {
        if !self.session.begin_close() {
            return;
        }
        info!(connection_id = %self.session.id(), "disposing session");

        self.session.cancellation_token().cancel();
        self.session.task_tracker().close();
        self.session.task_tracker().wait().await;

        if let Some(job) = self.stream.lock().await.take() {
            job.result().unlock();
        }
        if let Some(binding) = self.binding.lock().await.take() {
            binding.dispose().await;
        }

        self.session.close_transport().await;
        if let Err(e) = self.session.transition(SessionStatus::Closed) {
            warn!(connection_id = %self.session.id(), error = %e, "close transition failed");
        }
        self.session
            .events()
            .connection_closed(&self.session.event_snapshot());
    }

    /// Dispose on a detached task.
    ///
    /// For callers running inside a tracked task, where awaiting
    /// [`dispose`](Self::dispose) would wait on their own completion.
    pub fn dispose_detached(self: &Arc<Self>) {
        let conn = self.clone();
        tokio::spawn(async move { conn.dispose().await });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.session.id())
            .field("status", &self.session.status())
            .finish_non_exhaustive()
    }
}

/// The [`MessageSink`] handed to terminal bindings.
struct ConnectionSink {
    conn: Weak<Connection>,
}

impl ConnectionSink {
    fn conn(&self) -> WsResult<Arc<Connection>> {
        self.conn.upgrade().ok_or(WsError::NotConnected)
    }
}

#[async_trait]
impl MessageSink for ConnectionSink {
    async fn send_text(&self, text: String) -> WsResult<()> {
        self.conn()?.session.send_text(text).await
    }

    async fn send_binary(&self, data: Bytes) -> WsResult<()> {
        self.conn()?.session.send_binary(data).await
    }

    async fn send_json(&self, value: &Value) -> WsResult<()> {
        self.conn()?.session.send_json(value).await
    }

    async fn send_result(&self, result: &SerializedResult) -> WsResult<()> {
        self.conn()?.session.send_result(result).await
    }

    async fn send_exception(&self, message: &str) -> WsResult<()> {
        self.conn()?.session.send_exception(message).await
    }

    async fn direct_to(&self, terminal: Box<dyn Terminal>, state: Option<Value>) -> WsResult<()> {
        self.conn()?.bind_terminal(terminal, state).await
    }

    async fn direct_to_shell(&self) -> WsResult<()> {
        self.conn()?.direct_to_shell().await
    }

    async fn stream_result(
        &self,
        result: Arc<SerializedResult>,
        chunk_size: Option<u64>,
    ) -> WsResult<()> {
        self.conn()?.stream_result(result, chunk_size).await
    }
}
