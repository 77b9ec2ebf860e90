// ── Simulator facade ──
//
// Owns the store, the refresher task, and the session registry for one
// simulated BNG. Outer surfaces (the gNMI server, the dump command) talk
// only to this type.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::thread_rng;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::error::CoreError;
use crate::generator::Generator;
use crate::refresher::{Refresher, RefresherState};
use crate::store::{Snapshot, TelemetryStore};
use crate::stream::{
    Notification, SessionEnd, SessionId, SessionRegistry, StreamSession, SubscribeRequest,
};

// ── Simulator ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SimulatorInner>`. [`new`](Self::new)
/// populates generation 1; [`start`](Self::start) spawns the refresher;
/// [`shutdown`](Self::shutdown) drains sessions and stops it.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<SimulatorInner>,
}

struct SimulatorInner {
    config: SimulatorConfig,
    store: Arc<TelemetryStore>,
    refresher: Arc<Refresher>,
    refresher_state: watch::Receiver<RefresherState>,
    sessions: Arc<SessionRegistry>,
    cancel: CancellationToken,
    accepting: AtomicBool,
    started: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulator {
    /// Validate `config` and build the startup population.
    ///
    /// Does NOT start refreshing; call [`start`](Self::start).
    pub fn new(config: SimulatorConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let generator = Generator::from_config(&config);
        let now = chrono::Utc::now().timestamp();
        let population = generator.populate(config.subscriber_count, now, &mut thread_rng());
        let store = Arc::new(TelemetryStore::new(population));
        let refresher = Refresher::new(Arc::clone(&store), generator, &config);
        let refresher_state = refresher.subscribe_state();

        info!(
            subscribers = config.subscriber_count,
            refresh_interval = ?config.refresh_interval,
            "simulator initialised"
        );

        Ok(Self {
            inner: Arc::new(SimulatorInner {
                config,
                store,
                refresher: Arc::new(refresher),
                refresher_state,
                sessions: Arc::new(SessionRegistry::new()),
                cancel: CancellationToken::new(),
                accepting: AtomicBool::new(true),
                started: AtomicBool::new(false),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.inner.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.inner.sessions
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.store.snapshot()
    }

    pub fn refresher_state(&self) -> RefresherState {
        *self.inner.refresher_state.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the background refresher. Calling it twice is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if !self.is_accepting() {
            return Err(CoreError::ShuttingDown);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("simulator already started");
            return Ok(());
        }

        let refresher = Arc::clone(&self.inner.refresher);
        let cancel = self.inner.cancel.child_token();
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(refresher.run(cancel)));

        info!("refresher started");
        Ok(())
    }

    /// Advance and publish one generation right now, outside the timer.
    pub async fn refresh_now(&self) -> Result<u64, CoreError> {
        if !self.is_accepting() {
            return Err(CoreError::ShuttingDown);
        }
        self.inner.refresher.tick().await
    }

    /// Open a subscription session.
    ///
    /// The session runs on its own task and starts emitting immediately.
    pub fn subscribe(&self, request: SubscribeRequest) -> Result<SessionHandle, CoreError> {
        if !self.is_accepting() {
            return Err(CoreError::ShuttingDown);
        }

        let id = SessionId::new();
        let (guard, cancel) = self.inner.sessions.register(id, &request);
        let (session, notifications) = StreamSession::new(
            id,
            Arc::clone(&self.inner.store),
            request,
            self.inner.config.session.clone(),
            cancel.clone(),
        );

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = session.run().await;
            match &result {
                Ok(end) => info!(session = %id, ?end, "session ended"),
                Err(e) => warn!(
                    session = %id,
                    kind = %e.kind(),
                    error = %e,
                    "session terminated"
                ),
            }
            result
        });

        info!(session = %id, active = self.inner.sessions.len(), "session opened");
        Ok(SessionHandle {
            id,
            notifications,
            cancel,
            task,
        })
    }

    /// Stop accepting sessions, cancel the live ones, and stop the
    /// refresher. Each wait is bounded by the shutdown grace period.
    pub async fn shutdown(&self) {
        if !self.inner.accepting.swap(false, Ordering::AcqRel) {
            debug!("shutdown already in progress");
            return;
        }
        let grace = self.inner.config.shutdown_grace;
        info!(sessions = self.inner.sessions.len(), "shutting down simulator");

        self.inner.sessions.cancel_all();
        if tokio::time::timeout(grace, self.inner.sessions.wait_until_empty())
            .await
            .is_err()
        {
            warn!(
                remaining = self.inner.sessions.len(),
                "sessions still open after shutdown grace period"
            );
        }

        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            // The refresher applies the grace period to its own in-flight
            // tick, so this only waits for the loop to unwind.
            if let Err(e) = handle.await {
                warn!(error = %e, "background task failed during shutdown");
            }
        }
        debug!("simulator stopped");
    }
}

// ── SessionHandle ────────────────────────────────────────────────

/// Caller's side of one subscription.
pub struct SessionHandle {
    id: SessionId,
    notifications: mpsc::Receiver<Notification>,
    cancel: CancellationToken,
    task: JoinHandle<Result<SessionEnd, CoreError>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Next notification, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    /// Ask the session to stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that ends this session when cancelled.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the session task and return how it ended.
    pub async fn join(self) -> Result<SessionEnd, CoreError> {
        drop(self.notifications);
        self.task.await.map_err(|e| CoreError::SessionTransport {
            session: self.id,
            reason: format!("session task failed: {e}"),
        })?
    }
}
