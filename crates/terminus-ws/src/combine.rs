//! Multi-session broadcast.
//!
//! A [`Combination`] groups live connections behind one [`MessageSink`]
//! so a producer can address them as a single target. Sends fan out
//! concurrently and go through each member's current sink, so a member
//! mid-stream queues the broadcast behind its suspension instead of
//! corrupting its chunk sequence.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::{join_all, pending, select_all, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use terminus_core::{SerializedResult, Terminal};

use crate::connection::Connection;
use crate::error::{WsError, WsResult};
use crate::registry::SessionRegistry;
use crate::sink::MessageSink;

/// An ephemeral broadcast group over live connections.
///
/// Terminal rebinding and result streaming are per-session operations
/// and are rejected with [`WsError::UnsupportedOperation`].
pub struct Combination {
    members: Vec<Arc<Connection>>,
}

impl Combination {
    /// Group the given connections.
    pub fn new(members: Vec<Arc<Connection>>) -> Self {
        Self { members }
    }

    /// Group every registered connection of one client.
    pub fn for_client(registry: &SessionRegistry, client_id: &str) -> Self {
        Self::new(registry.client_connections(client_id))
    }

    /// Group every registered connection under one credential.
    pub fn for_credential(registry: &SessionRegistry, credential: &str) -> Self {
        Self::new(registry.credential_connections(credential))
    }

    /// The number of member connections.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolves as soon as any member starts disposal.
    async fn any_cancelled(&self) {
        if self.members.is_empty() {
            pending::<()>().await;
        }
        let waits = self.members.iter().map(|member| {
            let token = member.session().cancellation_token().clone();
            async move { token.cancelled_owned().await }.boxed()
        });
        select_all(waits).await;
    }

    /// Run one labelled send per member concurrently.
    ///
    /// The whole broadcast aborts if a member starts disposal mid-send;
    /// otherwise per-member failures are aggregated.
    async fn broadcast<'a>(
        &self,
        sends: Vec<(String, BoxFuture<'a, WsResult<()>>)>,
    ) -> WsResult<()> {
        let all = join_all(
            sends
                .into_iter()
                .map(|(id, send)| async move { (id, send.await) }),
        );
        let results = tokio::select! {
            results = all => results,
            _ = self.any_cancelled() => return Err(WsError::Cancelled),
        };

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| format!("{id}: {e}")))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WsError::Broadcast { failures })
        }
    }

    /// The sink a broadcast to this member should go through.
    async fn member_sink(member: &Arc<Connection>) -> Arc<dyn MessageSink> {
        match member.binding().await {
            Some(binding) => binding.current_sink(),
            None => member.sink(),
        }
    }

    async fn labelled_sends<'a, F>(&'a self, make: F) -> Vec<(String, BoxFuture<'a, WsResult<()>>)>
    where
        F: Fn(Arc<dyn MessageSink>) -> BoxFuture<'a, WsResult<()>>,
    {
        let mut sends = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let sink = Self::member_sink(member).await;
            sends.push((member.session().id().to_string(), make(sink)));
        }
        sends
    }
}

#[async_trait]
impl MessageSink for Combination {
    async fn send_text(&self, text: String) -> WsResult<()> {
        let sends = self
            .labelled_sends(|sink| {
                let text = text.clone();
                async move { sink.send_text(text).await }.boxed()
            })
            .await;
        self.broadcast(sends).await
    }

    async fn send_binary(&self, data: Bytes) -> WsResult<()> {
        let sends = self
            .labelled_sends(|sink| {
                let data = data.clone();
                async move { sink.send_binary(data).await }.boxed()
            })
            .await;
        self.broadcast(sends).await
    }

    async fn send_json(&self, value: &Value) -> WsResult<()> {
        let sends = self
            .labelled_sends(|sink| {
                let value = value.clone();
                async move { sink.send_json(&value).await }.boxed()
            })
            .await;
        self.broadcast(sends).await
    }

    async fn send_result(&self, result: &SerializedResult) -> WsResult<()> {
        let sends = self
            .labelled_sends(|sink| async move { sink.send_result(result).await }.boxed())
            .await;
        self.broadcast(sends).await
    }

    async fn send_exception(&self, message: &str) -> WsResult<()> {
        let sends = self
            .labelled_sends(|sink| {
                let message = message.to_string();
                async move { sink.send_exception(&message).await }.boxed()
            })
            .await;
        self.broadcast(sends).await
    }

    async fn direct_to(&self, _terminal: Box<dyn Terminal>, _state: Option<Value>) -> WsResult<()> {
        Err(WsError::unsupported_operation(
            "terminal rebinding is per-session",
        ))
    }

    async fn direct_to_shell(&self) -> WsResult<()> {
        Err(WsError::unsupported_operation(
            "terminal rebinding is per-session",
        ))
    }

    async fn stream_result(
        &self,
        _result: Arc<SerializedResult>,
        _chunk_size: Option<u64>,
    ) -> WsResult<()> {
        Err(WsError::unsupported_operation(
            "result streaming is per-session",
        ))
    }
}
