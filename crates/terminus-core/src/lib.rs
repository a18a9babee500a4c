//! Collaborator contracts for the Terminus session protocol.
//!
//! This crate defines the interfaces the protocol core consumes but does
//! not implement:
//!
//! - [`Terminal`] - a stateful request handler bound to a session,
//!   analogous to a shell/REPL context, with capability flags for text
//!   and binary input.
//! - [`SerializedResult`] - an already-materialized, seekable result body
//!   with a lock flag that protects it from concurrent chunk reads.
//! - [`ClientIdentity`] - the owning client of a session, used for
//!   per-client lookups and broadcast filtering.
//! - [`SessionEventSink`] - an observability sink receiving structured
//!   connection open/close/input/output events.
//!
//! The protocol machinery itself (sessions, terminal bindings, chunked
//! streaming, command dispatch, broadcast) lives in `terminus-ws`.

pub mod error;
pub mod events;
pub mod identity;
pub mod result;
pub mod terminal;

// Re-exports for convenience
pub use error::{CoreError, CoreResult};
pub use events::{ConnectionEvent, SessionEventSink, TracingEventSink};
pub use identity::ClientIdentity;
pub use result::SerializedResult;
pub use terminal::{Shell, Terminal, TerminalSink};
