//! The terminal-to-session binding.
//!
//! A [`TerminalBinding`] owns the terminal instance bound to a session
//! and the sink it writes through. It is the suspension point: while a
//! stream holds the socket, the binding swaps its sink for an
//! [`AwaitingSink`](crate::awaiting::AwaitingSink) so terminal output
//! queues behind the resume signal instead of interleaving with chunks.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use terminus_core::{CoreError, CoreResult, Terminal, TerminalSink};

use crate::awaiting::AwaitingSink;
use crate::error::{WsError, WsResult};
use crate::sink::MessageSink;

/// A terminal bound to one session, plus its current outbound sink.
pub struct TerminalBinding {
    terminal: Mutex<Box<dyn Terminal>>,
    // Capability flags cached at bind time; terminals report them
    // statically so the binding never has to lock just to check.
    name: String,
    supports_text: bool,
    supports_binary: bool,
    base_sink: Arc<dyn MessageSink>,
    current_sink: RwLock<Arc<dyn MessageSink>>,
    suspension: SyncMutex<Option<watch::Sender<bool>>>,
    cancel: CancellationToken,
}

impl TerminalBinding {
    /// Bind a terminal to a session's sink.
    ///
    /// `cancel` is the session's cancellation signal; it unblocks sends
    /// queued behind a suspension when the session shuts down.
    pub fn new(
        terminal: Box<dyn Terminal>,
        sink: Arc<dyn MessageSink>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let name = terminal.name().to_string();
        let supports_text = terminal.supports_text_input();
        let supports_binary = terminal.supports_binary_input();
        Arc::new(Self {
            terminal: Mutex::new(terminal),
            name,
            supports_text,
            supports_binary,
            base_sink: sink.clone(),
            current_sink: RwLock::new(sink),
            suspension: SyncMutex::new(None),
            cancel,
        })
    }

    /// The bound terminal's resource name.
    pub fn terminal_name(&self) -> &str {
        &self.name
    }

    /// Whether the bound terminal accepts text input.
    pub fn supports_text_input(&self) -> bool {
        self.supports_text
    }

    /// Whether the bound terminal accepts binary input.
    pub fn supports_binary_input(&self) -> bool {
        self.supports_binary
    }

    /// The sink terminal output currently goes through.
    pub fn current_sink(&self) -> Arc<dyn MessageSink> {
        self.current_sink.read().clone()
    }

    /// Apply initial state (if any) and run the terminal's `open` hook.
    pub async fn install(&self, state: Option<Value>) -> WsResult<()> {
        let mut terminal = self.terminal.lock().await;
        if let Some(state) = state {
            terminal.set_state(state).await?;
        }
        terminal.open(&BindingSink { binding: self }).await?;
        Ok(())
    }

    /// Defer terminal output until [`unsuspend`](Self::unsuspend).
    ///
    /// Errors with [`WsError::AlreadySuspended`] if a suspension is
    /// already outstanding.
    pub fn suspend(&self) -> WsResult<()> {
        let mut suspension = self.suspension.lock();
        if suspension.is_some() {
            return Err(WsError::AlreadySuspended);
        }
        let (tx, rx) = watch::channel(false);
        *suspension = Some(tx);
        *self.current_sink.write() = Arc::new(AwaitingSink::new(
            self.base_sink.clone(),
            rx,
            self.cancel.clone(),
        ));
        debug!(terminal = %self.name, "terminal output suspended");
        Ok(())
    }

    /// Release the suspension, delivering queued output in send order.
    ///
    /// Idempotent: releasing a binding that is not suspended does nothing.
    pub fn unsuspend(&self) {
        let sender = self.suspension.lock().take();
        if let Some(sender) = sender {
            *self.current_sink.write() = self.base_sink.clone();
            // Queued sends hold their own receiver clones; fire the
            // resume signal after the base sink is restored so late
            // senders see the direct path.
            let _ = sender.send(true);
            debug!(terminal = %self.name, "terminal output resumed");
        }
    }

    /// Whether a suspension is outstanding.
    pub fn is_suspended(&self) -> bool {
        self.suspension.lock().is_some()
    }

    /// Forward one inbound text message to the terminal.
    pub async fn forward_text(&self, input: String) -> WsResult<()> {
        if !self.supports_text {
            return Err(WsError::unsupported_input("text", &self.name));
        }
        let mut terminal = self.terminal.lock().await;
        terminal
            .handle_text_input(input, &BindingSink { binding: self })
            .await?;
        Ok(())
    }

    /// Forward one inbound binary message to the terminal.
    pub async fn forward_binary(&self, input: Bytes) -> WsResult<()> {
        if !self.supports_binary {
            return Err(WsError::unsupported_input("binary", &self.name));
        }
        let mut terminal = self.terminal.lock().await;
        terminal
            .handle_binary_input(input, &BindingSink { binding: self })
            .await?;
        Ok(())
    }

    /// The terminal's state as inline JSON.
    pub async fn get_state(&self) -> Value {
        self.terminal.lock().await.get_state().await
    }

    /// Replace the terminal's state from inline JSON.
    pub async fn set_state(&self, state: Value) -> WsResult<()> {
        self.terminal.lock().await.set_state(state).await?;
        Ok(())
    }

    /// Unbind: drop any suspension and run the terminal's dispose hook.
    ///
    /// Dropping the suspension sender (rather than resuming) unwinds
    /// queued sends with an error; their output has nowhere to go.
    pub async fn dispose(&self) {
        drop(self.suspension.lock().take());
        self.terminal.lock().await.dispose().await;
    }
}

impl std::fmt::Debug for TerminalBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBinding")
            .field("terminal", &self.name)
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}

/// The send handle passed into terminal handlers.
///
/// Forwards to the binding's current sink, so output written during a
/// suspension transparently queues behind the resume signal.
struct BindingSink<'a> {
    binding: &'a TerminalBinding,
}

fn to_core(error: WsError) -> CoreError {
    CoreError::sink(error.to_string())
}

#[async_trait]
impl TerminalSink for BindingSink<'_> {
    async fn send_text(&self, text: String) -> CoreResult<()> {
        self.binding
            .current_sink()
            .send_text(text)
            .await
            .map_err(to_core)
    }

    async fn send_binary(&self, data: Bytes) -> CoreResult<()> {
        self.binding
            .current_sink()
            .send_binary(data)
            .await
            .map_err(to_core)
    }

    async fn send_json(&self, value: &Value) -> CoreResult<()> {
        self.binding
            .current_sink()
            .send_json(value)
            .await
            .map_err(to_core)
    }
}
