//! Observability events.
//!
//! The protocol core raises structured events at connection open/close
//! and per inbound/outbound message. Hosts plug in their own sink; the
//! default logs through `tracing`.

use chrono::{DateTime, Utc};

/// A snapshot of one connection's bookkeeping, attached to lifecycle events.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The connection id as a string.
    pub connection_id: String,
    /// The client the session belongs to.
    pub client_id: String,
    /// When the connection was opened, if it has been.
    pub opened_at: Option<DateTime<Utc>>,
    /// When the connection was closed, if it has been.
    pub closed_at: Option<DateTime<Utc>>,
    /// Cumulative bytes sent to the client.
    pub bytes_sent: u64,
    /// Cumulative bytes received from the client.
    pub bytes_received: u64,
}

/// A sink for structured connection events.
pub trait SessionEventSink: Send + Sync {
    /// A connection completed its handshake and is now open.
    fn connection_opened(&self, event: &ConnectionEvent);

    /// A connection was disposed.
    fn connection_closed(&self, event: &ConnectionEvent);

    /// An inbound message was received on a connection.
    fn input_received(&self, connection_id: &str, byte_count: u64);

    /// An outbound message was sent on a connection.
    fn output_sent(&self, connection_id: &str, byte_count: u64);
}

/// The default event sink, logging through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl SessionEventSink for TracingEventSink {
    fn connection_opened(&self, event: &ConnectionEvent) {
        tracing::info!(
            connection_id = %event.connection_id,
            client_id = %event.client_id,
            "connection opened"
        );
    }

    fn connection_closed(&self, event: &ConnectionEvent) {
        tracing::info!(
            connection_id = %event.connection_id,
            client_id = %event.client_id,
            bytes_sent = event.bytes_sent,
            bytes_received = event.bytes_received,
            "connection closed"
        );
    }

    fn input_received(&self, connection_id: &str, byte_count: u64) {
        tracing::debug!(connection_id = %connection_id, byte_count, "input received");
    }

    fn output_sent(&self, connection_id: &str, byte_count: u64) {
        tracing::debug!(connection_id = %connection_id, byte_count, "output sent");
    }
}
