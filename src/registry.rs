//! Process-wide session/client registry (spec §3 "Registry", §4.E).
//!
//! Two maps, each behind its own `tokio::sync::RwLock`: `sessions` (id ->
//! [`SessionHandle`]) and `clients` (client id -> [`Client`], which holds
//! the client's outbound sender, cancellation token, and current session
//! id, mirroring spec §3's `Client` record). Per §5, "the cross-domain
//! order is: acquire registry, find session, release registry, then enter
//! session's domain" — every method below takes the relevant registry lock
//! just long enough to clone a handle or update membership, then releases
//! it before awaiting the session actor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::protocol::{ProtocolError, ServerMessage};
use crate::session::{self, ClientId, SessionHandle, SessionSnapshot};
use crate::timecode;

/// A registered connection's outbound channel, cancellation handle, and
/// current session membership (spec §3 "Client").
struct Client {
    sender: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
    session_id: Option<String>,
}

/// Owns every live session and tracks which one (if any) each connected
/// client currently belongs to. Sessions are never garbage-collected when
/// they go empty (spec §9 open question — this implementation keeps the
/// source's apparent behavior of leaving empty sessions resident; see
/// DESIGN.md).
pub struct Registry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { sessions: RwLock::new(HashMap::new()), clients: RwLock::new(HashMap::new()) })
    }

    /// Register a freshly accepted connection. `sender`/`cancel` are kept
    /// for the lifetime of the registration so `create_session` and
    /// `join_session` never need them passed in again, and so `shutdown`
    /// can close this client's channel even if it never joins a session.
    pub async fn register_client(
        &self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) {
        self.clients
            .write()
            .await
            .insert(client_id, Client { sender, cancel, session_id: None });
    }

    /// The sender/cancellation pair registered for `client_id`, if any.
    async fn client_channel(
        &self,
        client_id: &ClientId,
    ) -> Option<(mpsc::Sender<ServerMessage>, CancellationToken)> {
        self.clients
            .read()
            .await
            .get(client_id)
            .map(|client| (client.sender.clone(), client.cancel.clone()))
    }

    /// If `client_id` currently belongs to a session, remove it from that
    /// session's members (sending it `session_left`) and clear the
    /// registry's record of the membership. No-op if it has none. Shared
    /// by `create_session` and `join_session` so a client is never a
    /// member of two sessions at once (spec §3: "A client belongs to at
    /// most one session").
    async fn leave_current_session(&self, client_id: &ClientId) {
        let prior = {
            let mut clients = self.clients.write().await;
            match clients.get_mut(client_id) {
                Some(client) => client.session_id.take(),
                None => None,
            }
        };
        if let Some(prior_id) = prior {
            if let Some(prior_handle) = self.sessions.read().await.get(&prior_id).cloned() {
                prior_handle.leave(client_id.clone()).await;
            }
        }
    }

    /// Validate `framerate_key` and `initial_timecode`, spawn a fresh
    /// session, and silently add `creator` as its first member. Returns
    /// the pieces the connection handler needs to build `session_created`
    /// itself (spec §4.E).
    pub async fn create_session(
        &self,
        creator: ClientId,
        framerate_key: &str,
        initial_timecode: Option<String>,
    ) -> Result<(String, &'static str, String), ProtocolError> {
        let rate = timecode::lookup_framerate(framerate_key)
            .ok_or_else(|| ProtocolError::UnknownFramerate(framerate_key.to_string()))?;
        let text = initial_timecode.unwrap_or_else(|| timecode::DEFAULT_TIMECODE.to_string());
        let frame = timecode::parse(&text, rate)
            .map_err(|e| ProtocolError::InvalidTimecode(e.to_string()))?;

        // A client that creates a new session while already a member of
        // another one leaves the prior session first, mirroring
        // `join_session` below — otherwise it would keep receiving the
        // old session's ticks forever while also joining the new one.
        self.leave_current_session(&creator).await;

        let (sender, cancel) = self
            .client_channel(&creator)
            .await
            .ok_or_else(|| ProtocolError::InternalError("client not registered".to_string()))?;

        let handle = session::spawn_session(rate, frame);
        handle.add_member(creator.clone(), sender, cancel).await;

        let session_id = handle.id.clone();
        self.sessions.write().await.insert(session_id.clone(), handle);
        if let Some(client) = self.clients.write().await.get_mut(&creator) {
            client.session_id = Some(session_id.clone());
        }

        info!(session_id = %session_id, framerate = framerate_key, "session created");
        Ok((session_id, rate.key, timecode::format(frame, rate)))
    }

    /// Join `client_id` to `session_id`, leaving its current session (if
    /// any) first. `SessionNotFound` if the id is unknown.
    pub async fn join_session(
        &self,
        client_id: ClientId,
        session_id: &str,
    ) -> Result<(), ProtocolError> {
        let target = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProtocolError::SessionNotFound(session_id.to_string()))?;

        self.leave_current_session(&client_id).await;

        let (sender, cancel) = self
            .client_channel(&client_id)
            .await
            .ok_or_else(|| ProtocolError::InternalError("client not registered".to_string()))?;

        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            client.session_id = Some(target.id.clone());
        }

        target.join(client_id, sender, cancel).await;
        Ok(())
    }

    /// Remove `client_id` from its current session. `NotInSession` if it
    /// has none.
    pub async fn leave_session(&self, client_id: &ClientId) -> Result<(), ProtocolError> {
        let session_id = {
            let mut clients = self.clients.write().await;
            match clients.get_mut(client_id) {
                Some(client) => client.session_id.take(),
                None => None,
            }
        };

        match session_id {
            Some(id) => {
                if let Some(handle) = self.sessions.read().await.get(&id).cloned() {
                    handle.leave(client_id.clone()).await;
                }
                Ok(())
            }
            None => Err(ProtocolError::NotInSession),
        }
    }

    /// The session `client_id` currently belongs to, for dispatching
    /// `start_timecode`/`stop_timecode`/`reset_timecode`.
    pub async fn current_session(&self, client_id: &ClientId) -> Option<SessionHandle> {
        let session_id = self.clients.read().await.get(client_id)?.session_id.clone()?;
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Drop `client_id` from any session it belongs to and forget it. No
    /// `session_left` is sent — the socket is already gone.
    pub async fn on_client_disconnect(&self, client_id: &ClientId) {
        let session_id = self.clients.write().await.remove(client_id).and_then(|c| c.session_id);
        if let Some(id) = session_id {
            if let Some(handle) = self.sessions.read().await.get(&id).cloned() {
                handle.disconnect(client_id.clone()).await;
            }
        }
    }

    /// Stop every session's ticker, broadcast `server_shutdown`, and close
    /// every client's channel (spec §4.E).
    ///
    /// Session shutdown already cancels its members' cancellation tokens
    /// as part of its own teardown, but a client that never created or
    /// joined a session is invisible to that path — iterating `clients`
    /// directly here is what reaches it, per §4.E's "close every client's
    /// channel" (not just every session member's).
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }

        let mut clients = self.clients.write().await;
        for client in clients.values() {
            client.cancel.cancel();
        }
        clients.clear();
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// A snapshot of every session, for the status reporter (SPEC_FULL
    /// §10.5) only — it has no protocol visibility of its own.
    pub async fn session_snapshots(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.snapshot().await);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(16)
    }

    #[tokio::test]
    async fn create_then_join_then_leave() {
        let registry = Registry::new();
        let (tx1, _rx1) = channel();
        registry.register_client("c1".to_string(), tx1, CancellationToken::new()).await;
        let (tx2, mut rx2) = channel();
        registry.register_client("c2".to_string(), tx2, CancellationToken::new()).await;

        let (session_id, framerate, timecode) =
            registry.create_session("c1".to_string(), "24", None).await.unwrap();
        assert_eq!(framerate, "24");
        assert_eq!(timecode, "00:00:00:00");

        registry.join_session("c2".to_string(), &session_id).await.unwrap();
        let msg = rx2.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::SessionJoined { .. }));

        registry.leave_session(&"c2".to_string()).await.unwrap();
        let msg = rx2.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::SessionLeft { .. }));
    }

    #[tokio::test]
    async fn join_unknown_session_is_not_found() {
        let registry = Registry::new();
        let (tx, _rx) = channel();
        registry.register_client("c1".to_string(), tx, CancellationToken::new()).await;
        let err = registry.join_session("c1".to_string(), "nope").await.unwrap_err();
        assert!(matches!(err, ProtocolError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn leave_without_session_is_not_in_session() {
        let registry = Registry::new();
        let (tx, _rx) = channel();
        registry.register_client("c1".to_string(), tx, CancellationToken::new()).await;
        let err = registry.leave_session(&"c1".to_string()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotInSession));
    }

    #[tokio::test]
    async fn joining_a_second_session_leaves_the_first() {
        let registry = Registry::new();
        let (tx1, mut rx1) = channel();
        registry.register_client("c1".to_string(), tx1, CancellationToken::new()).await;

        let (session_a, _, _) = registry.create_session("c1".to_string(), "24", None).await.unwrap();

        let (tx_creator_b, rx_creator_b) = channel();
        registry.register_client("c2".to_string(), tx_creator_b, CancellationToken::new()).await;
        let (session_b, _, _) = registry.create_session("c2".to_string(), "30", None).await.unwrap();
        drop(rx_creator_b);

        registry.join_session("c1".to_string(), &session_b).await.unwrap();

        // c1 should have received session_left for session_a before
        // session_joined for session_b.
        let first = rx1.recv().await.unwrap();
        assert!(matches!(first, ServerMessage::SessionLeft { session_id } if session_id == session_a));
        let second = rx1.recv().await.unwrap();
        assert!(matches!(second, ServerMessage::SessionJoined { session_id, .. } if session_id == session_b));
    }

    /// Regression test for the `create_session` invariant violation: a
    /// client that is already a member of session A and sends another
    /// `create_session` must leave A rather than staying in both A and
    /// the freshly created B.
    #[tokio::test]
    async fn creating_a_second_session_leaves_the_first() {
        let registry = Registry::new();
        let (tx1, mut rx1) = channel();
        registry.register_client("c1".to_string(), tx1, CancellationToken::new()).await;

        let (session_a, _, _) = registry.create_session("c1".to_string(), "24", None).await.unwrap();
        let (session_b, _, _) = registry.create_session("c1".to_string(), "30", None).await.unwrap();

        let left = rx1.recv().await.unwrap();
        assert!(matches!(left, ServerMessage::SessionLeft { session_id } if session_id == session_a));

        let current = registry.current_session(&"c1".to_string()).await.unwrap();
        assert_eq!(current.id, session_b);
    }

    #[tokio::test]
    async fn disconnect_removes_membership_silently() {
        let registry = Registry::new();
        let (tx, mut rx) = channel();
        registry.register_client("c1".to_string(), tx, CancellationToken::new()).await;
        let (session_id, ..) = registry.create_session("c1".to_string(), "24", None).await.unwrap();

        registry.on_client_disconnect(&"c1".to_string()).await;
        assert!(registry.current_session(&"c1".to_string()).await.is_none());

        // No session_left was sent for a disconnect.
        assert!(rx.try_recv().is_err());
        let _ = session_id;
    }

    /// Regression test: a client that never creates or joins a session
    /// still has its channel closed by `shutdown` (spec §4.E), not just
    /// clients reachable through some session's member list.
    #[tokio::test]
    async fn shutdown_cancels_clients_with_no_session() {
        let registry = Registry::new();
        let (tx, _rx) = channel();
        let cancel = CancellationToken::new();
        registry.register_client("c1".to_string(), tx, cancel.clone()).await;

        registry.shutdown().await;

        assert!(cancel.is_cancelled());
    }
}
