//! Drives the `/gnmi` WebSocket endpoint and `/healthz` over real sockets.
#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use bngsim::protocol::{ErrorCode, Health, SubscribeResponse};
use bngsim::server::{self, ServerOptions};
use bngsim_core::{SessionConfig, Simulator, SimulatorConfig, SubscriptionMode};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    sim: Simulator,
    addr: SocketAddr,
    stop: CancellationToken,
}

impl Harness {
    async fn start(refresh_interval: Duration) -> Self {
        Self::start_with(
            SimulatorConfig {
                subscriber_count: 4,
                refresh_interval,
                shutdown_grace: Duration::from_secs(1),
                ..SimulatorConfig::default()
            },
            ServerOptions::default(),
        )
        .await
    }

    async fn start_with(config: SimulatorConfig, options: ServerOptions) -> Self {
        let sim = Simulator::new(config).unwrap();
        sim.start().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = CancellationToken::new();
        tokio::spawn(server::serve(listener, sim.clone(), options, stop.clone()));
        Self { sim, addr, stop }
    }

    async fn wait_for_sessions(&self, count: usize, within: Duration) {
        tokio::time::timeout(within, async {
            while self.sim.sessions().len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn health(&self) -> Health {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        tokio::time::timeout(STEP, stream.read_to_end(&mut raw))
            .await
            .unwrap()
            .unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");

        let (_, body) = raw.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    async fn connect(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/gnmi", self.addr))
            .await
            .unwrap();
        ws
    }

    async fn subscribe(&self, request: serde_json::Value) -> Client {
        let mut ws = self.connect().await;
        ws.send(Message::text(request.to_string())).await.unwrap();
        ws
    }
}

/// Next JSON frame, or `None` once the server closes.
async fn next_frame(ws: &mut Client) -> Option<SubscribeResponse> {
    loop {
        let msg = tokio::time::timeout(STEP, ws.next()).await.unwrap();
        match msg {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(_)) | Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

fn expect_update(frame: Option<SubscribeResponse>) -> u64 {
    match frame {
        Some(SubscribeResponse::Update(n)) => {
            assert!(!n.update.is_empty());
            assert_eq!(n.prefix, "bng-telemetry/subscribers");
            n.generation
        }
        other => panic!("expected an update, got {other:?}"),
    }
}

// ── Subscribe ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_once_sends_snapshot_then_closes() {
    let h = Harness::start(Duration::from_secs(3600)).await;
    let mut ws = h
        .subscribe(serde_json::json!({
            "prefix": "bng-telemetry",
            "subscription": [{"path": "subscribers"}],
            "mode": "once"
        }))
        .await;

    let first = next_frame(&mut ws).await;
    if let Some(SubscribeResponse::Update(n)) = &first {
        assert!(
            n.update
                .iter()
                .any(|u| u.path == "subscriber[id=1]/state/current-state")
        );
    }
    assert_eq!(expect_update(first), 1);
    assert_eq!(
        next_frame(&mut ws).await,
        Some(SubscribeResponse::SyncResponse(true))
    );
    assert_eq!(next_frame(&mut ws).await, None);

    h.stop.cancel();
}

#[tokio::test]
async fn test_stream_delivers_later_generations() {
    let h = Harness::start(Duration::from_millis(100)).await;
    let mut ws = h.subscribe(serde_json::json!({"mode": "stream"})).await;

    let first = expect_update(next_frame(&mut ws).await);
    assert_eq!(
        next_frame(&mut ws).await,
        Some(SubscribeResponse::SyncResponse(true))
    );
    let second = expect_update(next_frame(&mut ws).await);
    let third = expect_update(next_frame(&mut ws).await);
    assert!(first < second && second < third, "{first} {second} {third}");

    ws.close(None).await.unwrap();
    h.wait_for_sessions(0, STEP).await;

    h.stop.cancel();
}

#[tokio::test]
async fn test_client_that_stops_reading_is_dropped() {
    // Large frames on a fast cadence fill the socket buffers quickly; the
    // deep session buffer keeps the session itself from overflowing first.
    let h = Harness::start_with(
        SimulatorConfig {
            subscriber_count: 500,
            refresh_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(1),
            session: SessionConfig {
                send_buffer: 10_000,
                ..SessionConfig::default()
            },
            ..SimulatorConfig::default()
        },
        ServerOptions {
            write_timeout: Duration::from_millis(300),
        },
    )
    .await;

    // Subscribe, then never read another byte.
    let _silent = h.subscribe(serde_json::json!({"mode": "stream"})).await;
    h.wait_for_sessions(1, STEP).await;
    h.wait_for_sessions(0, Duration::from_secs(60)).await;

    tokio::time::timeout(STEP, h.sim.shutdown()).await.unwrap();
    h.stop.cancel();
}

#[tokio::test]
async fn test_invalid_request_gets_error_frame() {
    let h = Harness::start(Duration::from_secs(3600)).await;
    let mut ws = h.connect().await;
    ws.send(Message::text("{\"mode\": \"sample\"}")).await.unwrap();

    match next_frame(&mut ws).await {
        Some(SubscribeResponse::Error(err)) => assert_eq!(err.code, ErrorCode::InvalidArgument),
        other => panic!("expected an error frame, got {other:?}"),
    }
    assert_eq!(next_frame(&mut ws).await, None);
    assert!(h.sim.sessions().is_empty());

    h.stop.cancel();
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let h = Harness::start(Duration::from_secs(3600)).await;
    let mut ws = h.subscribe(serde_json::json!({})).await;
    expect_update(next_frame(&mut ws).await);
    next_frame(&mut ws).await;

    h.sim.shutdown().await;
    assert_eq!(next_frame(&mut ws).await, None);

    // Server still accepts sockets, but the simulator refuses sessions.
    let mut late = h.subscribe(serde_json::json!({})).await;
    match next_frame(&mut late).await {
        Some(SubscribeResponse::Error(err)) => assert_eq!(err.code, ErrorCode::Unavailable),
        other => panic!("expected an error frame, got {other:?}"),
    }

    h.stop.cancel();
}

#[tokio::test]
async fn test_healthz_reports_store_state() {
    let h = Harness::start(Duration::from_secs(3600)).await;

    let health = h.health().await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.generation, 1);
    assert_eq!(health.subscribers, 4);
    assert_eq!(health.sessions, 0);
    assert!(health.active_sessions.is_empty());

    h.stop.cancel();
}

#[tokio::test]
async fn test_healthz_lists_live_sessions() {
    let h = Harness::start(Duration::from_secs(3600)).await;
    let mut ws = h
        .subscribe(serde_json::json!({
            "subscription": [{"path": "subscriber[id=2]"}],
            "mode": "stream"
        }))
        .await;
    expect_update(next_frame(&mut ws).await);
    h.wait_for_sessions(1, STEP).await;

    let health = h.health().await;
    assert_eq!(health.sessions, 1);
    assert_eq!(health.active_sessions.len(), 1);
    let live = &health.active_sessions[0];
    assert_eq!(live.mode, SubscriptionMode::Stream);
    assert_eq!(live.paths.len(), 1);

    ws.close(None).await.unwrap();
    h.wait_for_sessions(0, STEP).await;
    assert!(h.health().await.active_sessions.is_empty());

    h.stop.cancel();
}
