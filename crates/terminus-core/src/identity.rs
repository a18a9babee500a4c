//! Client identity.

use serde::{Deserialize, Serialize};

/// The owning client of a session.
///
/// The protocol core uses this only for per-client registry lookups and
/// for filtering broadcast targets (e.g. "revoke all sessions under this
/// credential"). Authentication itself happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// A client identifier (e.g. user ID or IP address).
    pub client_id: String,
    /// The credential the session was opened under, if any.
    pub credential: Option<String>,
}

impl ClientIdentity {
    /// Create a new identity.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            credential: None,
        }
    }

    /// Create an anonymous identity.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Set the credential.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Whether this identity was opened under the given credential.
    pub fn has_credential(&self, credential: &str) -> bool {
        self.credential.as_deref() == Some(credential)
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.client_id)
    }
}
