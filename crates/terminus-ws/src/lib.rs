//! Session protocol core for Terminus.
//!
//! This crate implements the WebSocket session protocol: the session
//! lifecycle state machine, terminal hosting with suspension, chunked
//! client-paced result streaming, the `#`-prefixed command dispatcher,
//! and multi-session broadcast.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use terminus_core::{ClientIdentity, TracingEventSink};
//! use terminus_ws::{
//!     Connection, Dispatcher, HandshakeContext, SessionConfig, SessionRegistry,
//!     TungsteniteTransport,
//! };
//!
//! // After the HTTP upgrade completes:
//! let (transport, mut receiver) = TungsteniteTransport::split(ws_stream);
//! let conn = Connection::new(
//!     Arc::new(transport),
//!     SessionConfig::default(),
//!     ClientIdentity::new(client_id),
//!     &HandshakeContext::new(host, client_ip),
//!     Arc::new(TracingEventSink),
//! );
//! conn.open().await?;
//!
//! let registry = SessionRegistry::new();
//! registry.insert(conn.clone());
//! let dispatcher = Dispatcher::new(registry);
//!
//! // Receive loop.
//! while let Some(frame) = receiver.next().await {
//!     dispatcher.handle_frame(&conn, frame?.into()).await;
//! }
//! ```
//!
//! # Session lifecycle
//!
//! ```text
//! accept ──► Waiting ──open()──► Open ◄─────────► Suspended
//!                                  │    stream        │
//!                                  ▼                  ▼
//!                             PendingClose ──────► Closed
//! ```
//!
//! While `Open`, inbound text either addresses the bound terminal or,
//! with a `#` prefix, the global command table (`#DISCONNECT`, `#SHELL`,
//! `#TERMINAL`, `#INFO`). While `Suspended`, the client paces an active
//! result stream with `MANIFEST`/`OPTIONS`/`GET`/`NEXT [n]`/`CLOSE`;
//! terminal output queues behind the suspension and is delivered in
//! order once the stream releases.
//!
//! # Streaming
//!
//! Results larger than [`SessionConfig::max_message_size`] cannot be
//! sent as one message; [`Connection::stream_result`] locks the result,
//! partitions it into a [`StreamManifest`] and lets the client pull
//! chunks at its own pace.

pub mod awaiting;
pub mod binding;
pub mod combine;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod manifest;
pub mod message;
pub mod profile;
pub mod registry;
pub mod session;
pub mod sink;
pub mod status;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use awaiting::AwaitingSink;
pub use binding::TerminalBinding;
pub use combine::Combination;
pub use config::{SessionConfig, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use connection::{Connection, ShellFactory};
pub use dispatcher::Dispatcher;
pub use error::{WsError, WsResult};
pub use manifest::{ChunkDescriptor, StreamManifest};
pub use message::{CloseFrame, Message};
pub use profile::ConnectionProfile;
pub use registry::SessionRegistry;
pub use session::{ConnectionId, HandshakeContext, Session, SessionStatus};
pub use sink::{MessageSink, MessageStream};
pub use status::StatusLine;
pub use stream::{StreamCommand, StreamJob, StreamOutcome};
pub use transport::{MockTransport, Transport, TungsteniteTransport};
