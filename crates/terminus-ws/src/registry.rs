//! The shared session registry.
//!
//! Hosts register each accepted connection here; command handlers and
//! broadcast combinations look sessions up by connection id, client id
//! or credential. The registry is cheap to clone behind an `Arc` and
//! safe to use from any task.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::connection::Connection;
use crate::session::ConnectionId;

/// A concurrent map of live connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a connection under its id.
    pub fn insert(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.session().id(), conn);
    }

    /// Look up a connection by id.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Remove a connection, returning it if it was registered.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    /// The number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The ids of all registered connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// All connections owned by the given client.
    pub fn client_connections(&self, client_id: &str) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.session().identity().client_id == client_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All connections carrying the given credential.
    pub fn credential_connections(&self, credential: &str) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| {
                entry.session().identity().credential.as_deref() == Some(credential)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Dispose and deregister every connection carrying the credential.
    ///
    /// Returns the number of connections revoked.
    pub async fn revoke_credential(&self, credential: &str) -> usize {
        let matches = self.credential_connections(credential);
        let count = matches.len();
        for conn in matches {
            conn.dispose().await;
            self.connections.remove(&conn.session().id());
        }
        if count > 0 {
            info!(revoked = count, "credential revoked");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::{HandshakeContext, SessionStatus};
    use crate::transport::MockTransport;
    use terminus_core::{ClientIdentity, TracingEventSink};

    async fn open_connection(identity: ClientIdentity) -> Arc<Connection> {
        let conn = Connection::new(
            MockTransport::new(),
            SessionConfig::default(),
            identity,
            &HandshakeContext::new("localhost", "127.0.0.1"),
            Arc::new(TracingEventSink),
        );
        conn.open().await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        let conn = open_connection(ClientIdentity::anonymous()).await;
        let id = conn.session().id();

        registry.insert(conn);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());

        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
    }

    #[tokio::test]
    async fn test_client_lookup() {
        let registry = SessionRegistry::new();
        registry.insert(open_connection(ClientIdentity::new("alpha")).await);
        registry.insert(open_connection(ClientIdentity::new("alpha")).await);
        registry.insert(open_connection(ClientIdentity::new("beta")).await);

        assert_eq!(registry.client_connections("alpha").len(), 2);
        assert_eq!(registry.client_connections("beta").len(), 1);
        assert!(registry.client_connections("gamma").is_empty());
    }

    #[tokio::test]
    async fn test_revoke_credential_disposes_matches() {
        let registry = SessionRegistry::new();
        let revoked =
            open_connection(ClientIdentity::new("alpha").with_credential("token-1")).await;
        let kept = open_connection(ClientIdentity::new("alpha").with_credential("token-2")).await;
        registry.insert(revoked.clone());
        registry.insert(kept.clone());

        let count = registry.revoke_credential("token-1").await;
        assert_eq!(count, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(revoked.session().status(), SessionStatus::Closed);
        assert_eq!(kept.session().status(), SessionStatus::Open);
    }
}
