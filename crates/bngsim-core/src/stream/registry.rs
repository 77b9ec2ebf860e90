// ── Session registry ──
//
// Tracks live sessions so shutdown can cancel them and health reporting
// can count them. Entries remove themselves through an RAII guard when
// the session task ends, whatever the reason.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{SessionId, SubscribeRequest, SubscriptionMode};

/// Public view of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub mode: SubscriptionMode,
    pub paths: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Concurrent map of live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionInfo>,
    root: CancellationToken,
    drained: Notify,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            root: CancellationToken::new(),
            drained: Notify::new(),
        }
    }

    /// Register a session. Its cancel token is a child of the registry's,
    /// so [`cancel_all`](Self::cancel_all) reaches it. The entry lives as
    /// long as the returned guard.
    pub fn register(
        self: &Arc<Self>,
        id: SessionId,
        request: &SubscribeRequest,
    ) -> (SessionGuard, CancellationToken) {
        let cancel = self.root.child_token();
        let info = SessionInfo {
            id,
            mode: request.mode,
            paths: request.selector.paths().to_vec(),
            started_at: Utc::now(),
        };
        self.sessions.insert(id, info);
        let guard = SessionGuard {
            registry: Arc::clone(self),
            id,
        };
        (guard, cancel)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self.sessions.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|s| s.started_at);
        out
    }

    /// Cancel every current and future session.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Resolve once no session is registered.
    pub async fn wait_until_empty(&self) {
        loop {
            let notified = self.drained.notified();
            if self.sessions.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn remove(&self, id: SessionId) {
        self.sessions.remove(&id);
        self.drained.notify_waiters();
    }
}

/// Removes its session from the registry on drop.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
