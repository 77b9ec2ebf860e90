#![allow(clippy::unwrap_used)]
// End-to-end properties of the store, generator, refresher and sessions.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use bngsim_core::{
    CoreError, Generator, IpFamily, Notification, SessionConfig, SessionEnd, SessionId,
    SessionState, SimulatorConfig, Simulator, StreamSession, SubscribeRequest, SubscriberState,
    TelemetryStore, TelemetryValue,
};

// ── Helpers ─────────────────────────────────────────────────────────

const NOW: i64 = 1_700_000_000;

fn population(count: u32, seed: u64) -> Vec<SubscriberState> {
    let mut rng = StdRng::seed_from_u64(seed);
    Generator::default().populate(count, NOW, &mut rng)
}

/// Every subscriber's input octets set to `generation`, so a torn read
/// would show mixed values.
fn stamped(base: &[SubscriberState], generation: u64) -> Vec<SubscriberState> {
    base.iter()
        .cloned()
        .map(|mut s| {
            s.traffic.input_octets = generation;
            s
        })
        .collect()
}

fn session_config(send_buffer: usize, keepalive: Duration) -> SessionConfig {
    SessionConfig {
        keepalive,
        send_buffer,
        emit_keepalives: false,
    }
}

// ── Store properties ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_never_mix_generations() {
    let base = population(50, 1);
    let store = Arc::new(TelemetryStore::new(stamped(&base, 1)));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let snap = store.snapshot();
                    let stamp = snap.subscribers[0].traffic.input_octets;
                    assert_eq!(stamp, snap.generation);
                    assert!(snap.iter().all(|s| s.traffic.input_octets == stamp));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for generation in 2..=500 {
        assert_eq!(
            store.replace_all(stamped(&base, generation)).unwrap(),
            generation
        );
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

#[test]
fn test_snapshot_is_idempotent_between_publishes() {
    let store = TelemetryStore::new(population(20, 2));
    let a = store.snapshot();
    let b = store.snapshot();
    assert_eq!(a.generation, b.generation);
    assert_eq!(a.subscribers, b.subscribers);
    assert_eq!(a.to_batch(a.published_at), b.to_batch(a.published_at));
}

// ── Generator properties ────────────────────────────────────────────

#[test]
fn test_counters_follow_activation_state() {
    let generator = Generator::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut current = population(200, 3);

    for tick in 1..=20 {
        let next: Vec<SubscriberState> = current
            .iter()
            .map(|s| generator.advance(s, NOW + tick * 30, 30, &mut rng))
            .collect();

        for (prev, cur) in current.iter().zip(&next) {
            assert_eq!(prev.identity, cur.identity);
            if cur.state == SessionState::Active {
                assert!(cur.traffic.input_octets >= prev.traffic.input_octets);
                assert!(cur.traffic.output_octets >= prev.traffic.output_octets);
                assert!(cur.traffic.input_packets >= prev.traffic.input_packets);
                assert!(cur.traffic.output_packets >= prev.traffic.output_packets);
            } else {
                assert_eq!(cur.traffic, prev.traffic);
                for &family in cur.families() {
                    assert_eq!(cur.dhcp(family).release, prev.dhcp(family).release + 1);
                }
                assert!(cur.sessions.iter().all(|s| s.state == SessionState::Inactive));
            }
            for family in [IpFamily::Ipv4, IpFamily::Ipv6] {
                let dhcp = cur.dhcp(family);
                assert!(dhcp.ack <= dhcp.request, "{family}: {dhcp:?}");
            }
        }
        current = next;
    }
}

#[test]
fn test_fifty_subscribers_show_a_few_inactive_per_tick() {
    let generator = Generator::default();
    let mut rng = StdRng::seed_from_u64(4);
    let mut current = population(50, 4);
    let mut inactive_total = 0u32;
    let ticks: i64 = 30;

    for tick in 1..=ticks {
        let next: Vec<SubscriberState> = current
            .iter()
            .map(|s| generator.advance(s, NOW + tick * 10, 10, &mut rng))
            .collect();

        for (prev, cur) in current.iter().zip(&next) {
            if !cur.is_active() {
                inactive_total += 1;
                // Only the release counters move.
                assert_eq!(cur.radius, prev.radius);
                assert_eq!(cur.dhcp_v4.request, prev.dhcp_v4.request);
                assert_eq!(cur.dhcp_v4.release, prev.dhcp_v4.release + 1);
            }
        }
        current = next;
    }

    // p(inactive) = 0.05 over 50 subscribers is 2.5 per tick on average.
    let mean = f64::from(inactive_total) / 30.0;
    assert!((0.5..=6.0).contains(&mean), "mean inactive per tick: {mean}");
}

// ── Session properties ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_first_batch_arrives_before_any_wait() {
    let store = Arc::new(TelemetryStore::new(population(5, 5)));
    let (session, mut rx) = StreamSession::new(
        SessionId::new(),
        Arc::clone(&store),
        SubscribeRequest::default(),
        session_config(8, Duration::from_secs(3600)),
        CancellationToken::new(),
    );
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(session.run());

    let first = rx.recv().await.unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);
    let Notification::Update(batch) = first else {
        panic!("expected an update first");
    };
    assert_eq!(batch.generation, 1);
    assert_eq!(batch.updates.len(), store.snapshot().to_batch(batch.timestamp).updates.len());
    assert!(batch.updates.iter().any(|u| u.path == "state/current-state"
        && matches!(&u.value, TelemetryValue::String(s) if s == "ACTIVE" || s == "INACTIVE")));

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_batches_arrive_in_increasing_generation_order() {
    let base = population(5, 6);
    let store = Arc::new(TelemetryStore::new(base.clone()));
    let cancel = CancellationToken::new();
    let (session, mut rx) = StreamSession::new(
        SessionId::new(),
        Arc::clone(&store),
        SubscribeRequest::default(),
        session_config(64, Duration::from_secs(30)),
        cancel.clone(),
    );
    let task = tokio::spawn(session.run());

    for _ in 0..10 {
        store.replace_all(base.clone()).unwrap();
        tokio::task::yield_now().await;
    }
    cancel.cancel();
    task.await.unwrap().unwrap();

    let mut generations = Vec::new();
    while let Some(n) = rx.recv().await {
        generations.extend(n.generation());
    }
    assert!(!generations.is_empty());
    assert_eq!(generations.last(), Some(&11));
    assert!(generations.windows(2).all(|w| w[0] < w[1]), "{generations:?}");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_session_leaves_no_waiter() {
    let store = Arc::new(TelemetryStore::new(population(5, 7)));
    let cancel = CancellationToken::new();
    let keepalive = Duration::from_secs(30);
    let (session, mut rx) = StreamSession::new(
        SessionId::new(),
        Arc::clone(&store),
        SubscribeRequest::default(),
        session_config(8, keepalive),
        cancel.clone(),
    );
    let task = tokio::spawn(session.run());

    rx.recv().await.unwrap();
    rx.recv().await.unwrap();
    while store.waiter_count() == 0 {
        tokio::task::yield_now().await;
    }

    cancel.cancel();
    let end = tokio::time::timeout(keepalive, task).await.unwrap().unwrap();
    assert_eq!(end.unwrap(), SessionEnd::Cancelled);
    assert_eq!(store.waiter_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_disconnects_without_blocking_publish() {
    let base = population(5, 8);
    let store = Arc::new(TelemetryStore::new(base.clone()));

    // A session nobody reads from.
    let (stalled, _stalled_rx) = StreamSession::new(
        SessionId::new(),
        Arc::clone(&store),
        SubscribeRequest::default(),
        session_config(2, Duration::from_secs(30)),
        CancellationToken::new(),
    );
    let stalled = tokio::spawn(stalled.run());

    // A healthy sibling.
    let sibling_cancel = CancellationToken::new();
    let (sibling, mut sibling_rx) = StreamSession::new(
        SessionId::new(),
        Arc::clone(&store),
        SubscribeRequest::default(),
        session_config(16, Duration::from_secs(30)),
        sibling_cancel.clone(),
    );
    let sibling = tokio::spawn(sibling.run());

    sibling_rx.recv().await.unwrap();
    sibling_rx.recv().await.unwrap();
    while store.waiter_count() < 2 {
        tokio::task::yield_now().await;
    }

    // Publishing is synchronous and returns regardless of the stalled reader.
    assert_eq!(store.replace_all(base.clone()).unwrap(), 2);

    let err = stalled.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::SessionOverflow { capacity: 2, .. }));

    assert_eq!(sibling_rx.recv().await.unwrap().generation(), Some(2));
    sibling_cancel.cancel();
    assert_eq!(sibling.await.unwrap().unwrap(), SessionEnd::Cancelled);
}

// ── Simulator lifecycle ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_sessions_and_stops_refresher() {
    let sim = Simulator::new(SimulatorConfig {
        subscriber_count: 50,
        refresh_interval: Duration::from_secs(10),
        ..SimulatorConfig::default()
    })
    .unwrap();
    sim.start().await.unwrap();

    let mut handles: Vec<_> = (0..3)
        .map(|_| sim.subscribe(SubscribeRequest::default()).unwrap())
        .collect();
    for handle in &mut handles {
        assert_eq!(handle.recv().await.unwrap().generation(), Some(1));
    }
    assert_eq!(sim.sessions().len(), 3);

    sim.shutdown().await;
    assert!(sim.sessions().is_empty());
    let generation = sim.snapshot().generation;

    for handle in handles {
        assert_eq!(handle.join().await.unwrap(), SessionEnd::Cancelled);
    }
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sim.snapshot().generation, generation);
}
