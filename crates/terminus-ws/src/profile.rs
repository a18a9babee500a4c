//! The per-connection profile served by the `#INFO` command.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{ConnectionId, HandshakeContext};

/// Connection metadata reported to (and partly editable by) the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    /// The host the client connected to.
    pub host: String,
    /// The connection's unique id.
    pub connection_id: String,
    /// Whether the connection is TLS-encrypted.
    pub is_encrypted: bool,
    /// The client's IP address.
    pub client_ip: String,
    /// When the session was opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// The name of the currently bound terminal.
    pub terminal: String,
    /// Free-form headers; the only client-writable part of the profile.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

impl ConnectionProfile {
    /// Build the initial profile from the transport handshake.
    pub fn from_handshake(context: &HandshakeContext, connection_id: ConnectionId) -> Self {
        Self {
            host: context.host.clone(),
            connection_id: connection_id.to_string(),
            is_encrypted: context.is_encrypted,
            client_ip: context.client_ip.clone(),
            opened_at: None,
            terminal: String::new(),
            custom_headers: context.headers.clone(),
        }
    }

    /// Apply a client-submitted profile update.
    ///
    /// Only `customHeaders` is writable; submitted entries are merged
    /// over the existing ones and every other field is ignored.
    pub fn merge_update(&mut self, update: &ConnectionProfile) {
        for (name, value) in &update.custom_headers {
            self.custom_headers.insert(name.clone(), value.clone());
        }
    }
}
