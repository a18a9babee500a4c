//! The terminal contract.
//!
//! A terminal is a stateful request handler bound to a session, analogous
//! to a shell/REPL context. The protocol core treats terminals as opaque:
//! it only needs to know which input kinds a terminal accepts, how to
//! forward input, and how to open/dispose it. Capabilities are expressed
//! as flags rather than through a type hierarchy, so unrelated handler
//! types can share the same binding machinery.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// The send handle a terminal writes its output through.
///
/// During a streaming operation the session substitutes this handle with
/// a suspension proxy, so terminals must not cache anything derived from
/// it between calls - each send goes through the handle it was given.
#[async_trait]
pub trait TerminalSink: Send + Sync {
    /// Send a text message to the client.
    async fn send_text(&self, text: String) -> CoreResult<()>;

    /// Send a binary message to the client.
    async fn send_binary(&self, data: Bytes) -> CoreResult<()>;

    /// Send a JSON value as one text message.
    async fn send_json(&self, value: &Value) -> CoreResult<()>;
}

/// A stateful request handler bound to a session.
///
/// Exactly one terminal is bound per session at a time. The binding
/// invokes [`open`](Terminal::open) after installation and
/// [`dispose`](Terminal::dispose) when the terminal is replaced or the
/// session closes. Input handlers are only called when the matching
/// capability flag is set; the defaults decline both kinds.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// The terminal resource name (e.g. `"Shell"`).
    fn name(&self) -> &str;

    /// Whether this terminal accepts text input.
    fn supports_text_input(&self) -> bool {
        false
    }

    /// Whether this terminal accepts binary input.
    fn supports_binary_input(&self) -> bool {
        false
    }

    /// Lifecycle hook invoked when the terminal is bound to a session.
    async fn open(&mut self, sink: &dyn TerminalSink) -> CoreResult<()> {
        let _ = sink;
        Ok(())
    }

    /// Handle one inbound text message.
    async fn handle_text_input(&mut self, input: String, sink: &dyn TerminalSink) -> CoreResult<()> {
        let _ = (input, sink);
        Err(CoreError::unsupported_text())
    }

    /// Handle one inbound binary message.
    async fn handle_binary_input(
        &mut self,
        input: Bytes,
        sink: &dyn TerminalSink,
    ) -> CoreResult<()> {
        let _ = (input, sink);
        Err(CoreError::unsupported_binary())
    }

    /// Get the terminal's state as inline JSON (for the `#TERMINAL`
    /// global command).
    async fn get_state(&self) -> Value {
        Value::Null
    }

    /// Replace the terminal's state from inline JSON.
    async fn set_state(&mut self, state: Value) -> CoreResult<()> {
        let _ = state;
        Err(CoreError::invalid_state("terminal state is read-only"))
    }

    /// Lifecycle hook invoked when the terminal is unbound.
    async fn dispose(&mut self) {}
}

/// The default terminal bound to fresh sessions and reachable via the
/// `#SHELL` / `#HOME` global commands.
///
/// The shell echoes text input back to the client and keeps an arbitrary
/// JSON state object so `#TERMINAL` round-trips work out of the box.
#[derive(Debug)]
pub struct Shell {
    state: Value,
}

impl Shell {
    /// Create a new shell terminal.
    pub fn new() -> Self {
        Self {
            state: Value::Object(serde_json::Map::new()),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Terminal for Shell {
    fn name(&self) -> &str {
        "Shell"
    }

    fn supports_text_input(&self) -> bool {
        true
    }

    async fn open(&mut self, sink: &dyn TerminalSink) -> CoreResult<()> {
        sink.send_text("Now at the shell. Type a command or switch terminals.".to_string())
            .await
    }

    async fn handle_text_input(&mut self, input: String, sink: &dyn TerminalSink) -> CoreResult<()> {
        sink.send_text(input).await
    }

    async fn get_state(&self) -> Value {
        self.state.clone()
    }

    async fn set_state(&mut self, state: Value) -> CoreResult<()> {
        if !state.is_object() {
            return Err(CoreError::invalid_state("shell state must be a JSON object"));
        }
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        texts: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                texts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TerminalSink for RecordingSink {
        async fn send_text(&self, text: String) -> CoreResult<()> {
            self.texts.lock().unwrap().push(text);
            Ok(())
        }

        async fn send_binary(&self, _data: Bytes) -> CoreResult<()> {
            Ok(())
        }

        async fn send_json(&self, value: &Value) -> CoreResult<()> {
            self.texts.lock().unwrap().push(value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shell_echoes_text() {
        let mut shell = Shell::new();
        let sink = RecordingSink::new();

        shell
            .handle_text_input("hello".to_string(), &sink)
            .await
            .unwrap();

        assert_eq!(sink.texts.lock().unwrap().as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn test_shell_capabilities() {
        let shell = Shell::new();
        assert!(shell.supports_text_input());
        assert!(!shell.supports_binary_input());
    }

    #[tokio::test]
    async fn test_shell_state_round_trip() {
        let mut shell = Shell::new();
        let state = serde_json::json!({"cwd": "/tmp", "verbose": true});

        shell.set_state(state.clone()).await.unwrap();
        assert_eq!(shell.get_state().await, state);
    }

    #[tokio::test]
    async fn test_shell_rejects_non_object_state() {
        let mut shell = Shell::new();
        let result = shell.set_state(Value::String("nope".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_default_terminal_declines_binary() {
        let mut shell = Shell::new();
        let sink = RecordingSink::new();
        let result = shell
            .handle_binary_input(Bytes::from_static(b"\x01"), &sink)
            .await;
        assert!(matches!(result, Err(CoreError::UnsupportedInput { .. })));
    }
}
