//! Inbound frame routing.
//!
//! The host's receive loop feeds every inbound frame to
//! [`Dispatcher::handle_frame`]. Routing depends on session state:
//! pacing commands while a stream holds the socket, `#`-prefixed global
//! commands, and everything else to the bound terminal. Message handling
//! runs on tracked tasks so disposal can wait for in-flight work;
//! `#DISCONNECT` and close frames are handled inline for that reason.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{WsError, WsResult};
use crate::message::Message;
use crate::profile::ConnectionProfile;
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;
use crate::status::StatusLine;

/// Routes inbound frames for registered connections.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher serves.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one inbound frame.
    ///
    /// Returns quickly: data frames are routed on a tracked task, so a
    /// slow terminal never stalls the receive loop.
    pub async fn handle_frame(&self, conn: &Arc<Connection>, message: Message) {
        let session = conn.session();
        session.record_received(message.len() as u64);

        match message {
            Message::Close(_) => {
                debug!(connection_id = %session.id(), "close frame received");
                self.shutdown(conn).await;
            }
            Message::Ping(data) => {
                let _ = session.send(Message::Pong(data)).await;
            }
            Message::Pong(_) => {}
            Message::Text(text) if is_disconnect(&text) => {
                self.shutdown(conn).await;
            }
            Message::Text(text) => {
                let dispatcher = self.clone();
                let conn = conn.clone();
                session.task_tracker().spawn(async move {
                    let result = dispatcher.route_text(&conn, text).await;
                    dispatcher.finish(&conn, result).await;
                });
            }
            Message::Binary(data) => {
                let dispatcher = self.clone();
                let conn = conn.clone();
                session.task_tracker().spawn(async move {
                    let result = conn.handle_binary(data).await;
                    dispatcher.finish(&conn, result).await;
                });
            }
        }
    }

    /// Route one inbound text message by session state.
    async fn route_text(&self, conn: &Arc<Connection>, text: String) -> WsResult<()> {
        if conn.session().status() == SessionStatus::Suspended {
            return conn.handle_stream_command(&text).await;
        }
        if let Some(command) = text.strip_prefix('#') {
            return self.run_command(conn, command).await;
        }
        conn.handle_text(text).await
    }

    /// Execute a `#`-prefixed global command.
    async fn run_command(&self, conn: &Arc<Connection>, command: &str) -> WsResult<()> {
        let command = command.trim();
        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim())),
            None => (command, None),
        };

        match name.to_ascii_uppercase().as_str() {
            "SHELL" | "HOME" => conn.direct_to_shell().await,
            "TERMINAL" => match argument {
                None => {
                    let binding = conn
                        .binding()
                        .await
                        .ok_or_else(|| WsError::invalid_status(conn.session().status(), "#TERMINAL"))?;
                    let state = binding.get_state().await;
                    conn.session().send_json(&state).await
                }
                Some(json) => {
                    let state: Value = serde_json::from_str(json)?;
                    let binding = conn
                        .binding()
                        .await
                        .ok_or_else(|| WsError::invalid_status(conn.session().status(), "#TERMINAL"))?;
                    binding.set_state(state).await
                }
            },
            "INFO" => match argument {
                None => {
                    let profile = serde_json::to_value(conn.profile_snapshot())?;
                    conn.session().send_json(&profile).await
                }
                Some(json) => {
                    let update: ConnectionProfile = serde_json::from_str(json)?;
                    conn.merge_profile(&update);
                    Ok(())
                }
            },
            _ => Err(WsError::UnknownCommand(format!("#{name}"))),
        }
    }

    /// Resolve the outcome of one routed message.
    ///
    /// Protocol misuse is reflected back as a status notice; fatal
    /// errors tear the session down.
    async fn finish(&self, conn: &Arc<Connection>, result: WsResult<()>) {
        let Err(e) = result else { return };
        if e.is_fatal() {
            warn!(connection_id = %conn.session().id(), error = %e, "fatal session error");
            let _ = conn.session().send_exception(&e.to_string()).await;
            // This runs on a tracked task; disposal must not wait on it.
            conn.dispose_detached();
            self.registry.remove(conn.session().id());
        } else {
            debug!(connection_id = %conn.session().id(), error = %e, "request rejected");
            let _ = conn
                .session()
                .send_status(&StatusLine::new(e.status_code(), e.to_string()))
                .await;
        }
    }

    /// Dispose a connection and drop it from the registry.
    async fn shutdown(&self, conn: &Arc<Connection>) {
        conn.dispose().await;
        self.registry.remove(conn.session().id());
    }
}

fn is_disconnect(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("#DISCONNECT")
}
