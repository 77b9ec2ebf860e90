// ── Central telemetry store ──
//
// Copy-on-write ownership of the whole subscriber table. Readers load an
// `Arc<Snapshot>` without locking; the single writer publishes a complete
// new table with one atomic pointer swap, then bumps the generation
// `watch` channel that idle sessions park on.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::CoreError;
use crate::model::{SubscriberId, SubscriberState, UpdateBatch};

/// An immutable, fully-materialized copy of every subscriber at one generation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub published_at: DateTime<Utc>,
    /// Sorted by subscriber id.
    pub subscribers: Arc<[SubscriberState]>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn get(&self, id: SubscriberId) -> Option<&SubscriberState> {
        self.subscribers
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .and_then(|idx| self.subscribers.get(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriberState> {
        self.subscribers.iter()
    }

    /// Flatten into an update batch stamped with `timestamp`.
    pub fn to_batch(&self, timestamp: DateTime<Utc>) -> UpdateBatch {
        UpdateBatch::from_subscribers(self.generation, timestamp, self.subscribers.iter())
    }
}

/// Result of waiting for the next generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The store moved past the awaited generation; carries the latest one.
    Advanced(u64),
    /// The deadline passed first.
    TimedOut,
}

/// Owner of all subscriber state.
///
/// One writer (the Refresher) calls [`replace_all`](Self::replace_all);
/// any number of readers call [`snapshot`](Self::snapshot) concurrently.
pub struct TelemetryStore {
    current: ArcSwap<Snapshot>,
    generation: watch::Sender<u64>,
}

impl TelemetryStore {
    /// Build a store holding the startup population as generation 1.
    pub fn new(mut initial: Vec<SubscriberState>) -> Self {
        initial.sort_by_key(|s| s.id);
        let snapshot = Snapshot {
            generation: 1,
            published_at: Utc::now(),
            subscribers: initial.into(),
        };
        let (generation, _) = watch::channel(snapshot.generation);

        Self {
            current: ArcSwap::from_pointee(snapshot),
            generation,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current generation, complete. Never blocks.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn subscriber_count(&self) -> usize {
        self.current.load().len()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Publish a complete new subscriber table as the next generation.
    ///
    /// The subscriber id set is fixed for the lifetime of the store; a
    /// table with different ids is rejected and nothing is published.
    /// Returns the generation that was published.
    pub fn replace_all(&self, mut states: Vec<SubscriberState>) -> Result<u64, CoreError> {
        states.sort_by_key(|s| s.id);
        {
            let current = self.current.load();
            let same_ids = current.len() == states.len()
                && current.iter().zip(&states).all(|(a, b)| a.id == b.id);
            if !same_ids {
                return Err(CoreError::SubscriberSetChanged {
                    expected: current.len(),
                    actual: states.len(),
                });
            }
        }

        let subscribers: Arc<[SubscriberState]> = states.into();
        let published_at = Utc::now();
        let previous = self.current.rcu(|prev| Snapshot {
            generation: prev.generation + 1,
            published_at,
            subscribers: Arc::clone(&subscribers),
        });
        let generation = previous.generation + 1;

        // `send_if_modified` updates even with zero receivers and keeps the
        // channel monotonic if two publishes ever race.
        self.generation.send_if_modified(|g| {
            if generation > *g {
                *g = generation;
                true
            } else {
                false
            }
        });
        Ok(generation)
    }

    // ── Waiting ──────────────────────────────────────────────────────

    /// Park until the generation moves past `since`, or `deadline` elapses.
    ///
    /// The waiter registration is a `watch::Receiver` owned by the returned
    /// future, so dropping the future (cancellation) deregisters it.
    pub async fn await_next_generation(&self, since: u64, deadline: Duration) -> WaitOutcome {
        let mut rx = self.generation.subscribe();
        match tokio::time::timeout(deadline, rx.wait_for(|g| *g > since)).await {
            Ok(Ok(latest)) => WaitOutcome::Advanced(*latest),
            // The sender lives as long as `self`, so `Err` here is
            // unreachable; treat it like a deadline.
            Ok(Err(_)) | Err(_) => WaitOutcome::TimedOut,
        }
    }

    /// Number of callers currently parked in
    /// [`await_next_generation`](Self::await_next_generation).
    pub fn waiter_count(&self) -> usize {
        self.generation.receiver_count()
    }
}
