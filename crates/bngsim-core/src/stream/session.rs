// ── Subscription session ──
//
// Turns store generations into one client's notification sequence.
// Writes go through a bounded buffer with `try_send`: a reader that falls
// behind is disconnected instead of ever stalling the store or siblings.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Notification, SessionId, SubscribeRequest, SubscriptionMode};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::store::{TelemetryStore, WaitOutcome};

/// Why a session finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away or the simulator is shutting down.
    Cancelled,
    /// A `Once` subscription delivered its snapshot.
    Completed,
}

/// One client's subscription.
///
/// Emits the current generation immediately, then the sync marker, then
/// (in stream mode) each later generation in strictly increasing order.
/// Generations published while the session is busy are coalesced: it
/// always jumps to the newest.
pub struct StreamSession {
    id: SessionId,
    store: Arc<TelemetryStore>,
    request: SubscribeRequest,
    config: SessionConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<Notification>,
    last_generation: Option<u64>,
}

impl StreamSession {
    /// Create a session and the receiving half of its send buffer.
    pub fn new(
        id: SessionId,
        store: Arc<TelemetryStore>,
        request: SubscribeRequest,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(config.send_buffer.max(1));
        let session = Self {
            id,
            store,
            request,
            config,
            cancel,
            tx,
            last_generation: None,
        };
        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session until it is cancelled, completes, or fails.
    pub async fn run(mut self) -> Result<SessionEnd, CoreError> {
        debug!(
            session = %self.id,
            mode = %self.request.mode,
            paths = ?self.request.selector.paths(),
            "session started"
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }

            let snapshot = self.store.snapshot();
            if self
                .last_generation
                .is_none_or(|seen| snapshot.generation > seen)
            {
                let initial = self.last_generation.is_none();
                let batch = self.request.selector.batch(&snapshot, Utc::now());
                trace!(
                    session = %self.id,
                    generation = snapshot.generation,
                    updates = batch.updates.len(),
                    "emitting generation"
                );
                if let Some(end) = self.emit(Notification::Update(batch))? {
                    return Ok(end);
                }
                self.last_generation = Some(snapshot.generation);

                if initial {
                    if let Some(end) = self.emit(Notification::SyncResponse)? {
                        return Ok(end);
                    }
                }
                if self.request.mode == SubscriptionMode::Once {
                    return Ok(SessionEnd::Completed);
                }
            }

            let since = snapshot.generation;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                outcome = self.store.await_next_generation(since, self.config.keepalive) => {
                    if outcome == WaitOutcome::TimedOut && self.config.emit_keepalives {
                        let keepalive = Notification::Keepalive { timestamp: Utc::now() };
                        if let Some(end) = self.emit(keepalive)? {
                            return Ok(end);
                        }
                    }
                }
            }
        }
    }

    /// Push one notification without waiting.
    ///
    /// `Ok(Some(_))` means the session was cancelled and must stop quietly.
    fn emit(&self, notification: Notification) -> Result<Option<SessionEnd>, CoreError> {
        if self.cancel.is_cancelled() {
            return Ok(Some(SessionEnd::Cancelled));
        }
        match self.tx.try_send(notification) {
            Ok(()) => Ok(None),
            Err(TrySendError::Full(_)) => Err(CoreError::SessionOverflow {
                session: self.id,
                capacity: self.config.send_buffer,
            }),
            Err(TrySendError::Closed(_)) => Err(CoreError::SessionTransport {
                session: self.id,
                reason: "notification receiver dropped".into(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::generator::Generator;
    use crate::model::SubscriberState;
    use crate::stream::Selector;

    fn population() -> Vec<SubscriberState> {
        let mut rng = StdRng::seed_from_u64(11);
        Generator::default().populate(3, 1_700_000_000, &mut rng)
    }

    fn store() -> Arc<TelemetryStore> {
        Arc::new(TelemetryStore::new(population()))
    }

    fn session_config(send_buffer: usize) -> SessionConfig {
        SessionConfig {
            keepalive: Duration::from_secs(30),
            send_buffer,
            emit_keepalives: false,
        }
    }

    fn spawn(
        store: &Arc<TelemetryStore>,
        request: SubscribeRequest,
        config: SessionConfig,
    ) -> (
        CancellationToken,
        mpsc::Receiver<Notification>,
        tokio::task::JoinHandle<Result<SessionEnd, CoreError>>,
    ) {
        let cancel = CancellationToken::new();
        let (session, rx) = StreamSession::new(
            SessionId::new(),
            Arc::clone(store),
            request,
            config,
            cancel.clone(),
        );
        (cancel, rx, tokio::spawn(session.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn once_emits_snapshot_then_sync_then_completes() {
        let store = store();
        let (_cancel, mut rx, task) = spawn(
            &store,
            SubscribeRequest::once(Selector::All),
            session_config(4),
        );

        match rx.recv().await.unwrap() {
            Notification::Update(batch) => {
                assert_eq!(batch.generation, 1);
                assert!(!batch.is_empty());
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap(), Notification::SyncResponse);
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Completed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_follows_new_generations() {
        let store = store();
        let (cancel, mut rx, task) = spawn(
            &store,
            SubscribeRequest::stream(Selector::All),
            session_config(8),
        );

        assert_eq!(rx.recv().await.unwrap().generation(), Some(1));
        assert_eq!(rx.recv().await.unwrap(), Notification::SyncResponse);

        store.replace_all(population()).unwrap();
        assert_eq!(rx.recv().await.unwrap().generation(), Some(2));
        store.replace_all(population()).unwrap();
        assert_eq!(rx.recv().await.unwrap().generation(), Some(3));

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Cancelled);
        assert_eq!(store.waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_sends_keepalives_when_enabled() {
        let store = store();
        let config = SessionConfig {
            keepalive: Duration::from_secs(5),
            send_buffer: 8,
            emit_keepalives: true,
        };
        let (cancel, mut rx, task) =
            spawn(&store, SubscribeRequest::stream(Selector::All), config);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::Keepalive { .. }
        ));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reader_is_disconnected() {
        let store = store();
        let (_cancel, _rx, task) = spawn(
            &store,
            SubscribeRequest::stream(Selector::All),
            session_config(2),
        );
        // Wait until the snapshot and sync marker fill the buffer.
        while store.waiter_count() == 0 {
            tokio::task::yield_now().await;
        }

        store.replace_all(population()).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            CoreError::SessionOverflow { capacity: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_is_a_transport_failure() {
        let store = store();
        let (_cancel, rx, task) = spawn(
            &store,
            SubscribeRequest::stream(Selector::All),
            session_config(4),
        );
        drop(rx);
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::SessionTransport { .. }));
    }
}
