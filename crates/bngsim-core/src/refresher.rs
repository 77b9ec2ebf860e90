// ── Background refresh ──
//
// One process-wide task that advances every subscriber on a fixed
// cadence and publishes the result as a new store generation. A failed
// tick publishes nothing; the previous generation stays visible and the
// next attempt is scheduled after a short backoff.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::error::CoreError;
use crate::generator::{Advance, Generator};
use crate::store::TelemetryStore;

/// Refresher lifecycle, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    /// Not started, or stopped.
    Idle,
    /// Advancing subscribers on the blocking pool.
    Computing,
    /// The last tick published this generation; waiting for the next fire.
    Published { generation: u64 },
    /// The last `failures` ticks failed; waiting out the retry backoff.
    BackingOff { failures: u32 },
}

/// Drives the store forward one generation per tick.
pub struct Refresher<M: Advance = Generator> {
    store: Arc<TelemetryStore>,
    model: Arc<M>,
    interval: Duration,
    retry_backoff: Duration,
    shutdown_grace: Duration,
    state: watch::Sender<RefresherState>,
    /// Held from snapshot to publish so ticks never interleave.
    tick_lock: Mutex<()>,
}

impl<M: Advance> Refresher<M> {
    pub fn new(store: Arc<TelemetryStore>, model: M, config: &SimulatorConfig) -> Self {
        let (state, _) = watch::channel(RefresherState::Idle);
        Self {
            store,
            model: Arc::new(model),
            interval: config.refresh_interval,
            retry_backoff: config.retry_backoff,
            shutdown_grace: config.shutdown_grace,
            state,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> RefresherState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RefresherState> {
        self.state.subscribe()
    }

    /// Advance every subscriber once and publish the result.
    ///
    /// The model runs on the blocking pool so a panic inside it surfaces
    /// here as [`CoreError::GenerationFailed`] instead of unwinding the
    /// refresh loop. Nothing is published unless the whole table was
    /// computed. Concurrent calls queue behind each other, so every tick
    /// builds on the generation the one before it published.
    pub async fn tick(&self) -> Result<u64, CoreError> {
        let _serial = self.tick_lock.lock().await;
        let previous = self.store.snapshot();
        let model = Arc::clone(&self.model);
        let now = Utc::now();

        let next = tokio::task::spawn_blocking(move || model.advance_all(&previous, now))
            .await
            .map_err(join_failure)??;

        self.store.replace_all(next)
    }

    /// Run until `cancel` fires.
    ///
    /// The first refresh happens one full interval after start; the store
    /// already holds the startup generation. A tick in flight when
    /// `cancel` fires gets at most the shutdown grace period to finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.state.send_replace(RefresherState::Computing);
            let outcome = tokio::select! {
                biased;
                result = self.tick() => Some(result),
                () = grace_expired(&cancel, self.shutdown_grace) => None,
            };

            match outcome {
                Some(Ok(generation)) => {
                    failures = 0;
                    self.state
                        .send_replace(RefresherState::Published { generation });
                    info!(
                        generation,
                        subscribers = self.store.subscriber_count(),
                        "published telemetry generation"
                    );
                }
                Some(Err(e)) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        kind = %e.kind(),
                        error = %e,
                        failures,
                        kept_generation = self.store.generation(),
                        retry_in = ?self.retry_backoff,
                        "refresh tick failed"
                    );
                    self.state
                        .send_replace(RefresherState::BackingOff { failures });
                    interval.reset_after(self.retry_backoff);
                }
                None => {
                    warn!(
                        grace = ?self.shutdown_grace,
                        "abandoning in-flight refresh at shutdown"
                    );
                    break;
                }
            }
        }

        self.state.send_replace(RefresherState::Idle);
        debug!("refresher stopped");
    }
}

/// Resolves once `cancel` has fired and `grace` has passed since.
async fn grace_expired(cancel: &CancellationToken, grace: Duration) {
    cancel.cancelled().await;
    tokio::time::sleep(grace).await;
}

fn join_failure(err: JoinError) -> CoreError {
    let message = if err.is_panic() {
        format!("advance panicked: {}", panic_message(err.into_panic()))
    } else {
        format!("advance task aborted: {err}")
    };
    CoreError::GenerationFailed { message }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
