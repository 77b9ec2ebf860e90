// ── Subscription server ──
//
// axum router exposing `GET /gnmi` (WebSocket subscriptions) and
// `GET /healthz`. Each socket maps to exactly one core session; the
// socket task only translates frames, all pacing lives in the session.

use std::io;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bngsim_core::{Simulator, SubscribeRequest};

use crate::protocol::{
    ErrorCode, Health, SessionSummary, SubscribeRequestMsg, SubscribeResponse, refresher_label,
};

/// How long a client has to send its subscribe request after connecting.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Default bound on a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Transport limits applied to every socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// A peer that accepts no frame for this long is dropped.
    pub write_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
struct AppState {
    sim: Simulator,
    options: ServerOptions,
}

pub fn router(sim: Simulator, options: ServerOptions) -> Router {
    Router::new()
        .route("/gnmi", get(handle_websocket))
        .route("/healthz", get(health))
        .with_state(AppState { sim, options })
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    sim: Simulator,
    options: ServerOptions,
    shutdown: CancellationToken,
) -> io::Result<()> {
    axum::serve(listener, router(sim, options))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let sim = &state.sim;
    let snapshot = sim.snapshot();
    let active_sessions: Vec<SessionSummary> = sim
        .sessions()
        .list()
        .into_iter()
        .map(SessionSummary::from)
        .collect();
    Json(Health {
        status: if sim.is_accepting() { "ok" } else { "shutting_down" }.into(),
        generation: snapshot.generation,
        subscribers: snapshot.len(),
        sessions: active_sessions.len(),
        active_sessions,
        last_refresh: snapshot.published_at,
        refresher: refresher_label(sim.refresher_state()),
    })
}

async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.sim, state.options))
}

async fn handle_socket(socket: WebSocket, sim: Simulator, options: ServerOptions) {
    let (sink, mut receiver) = socket.split();
    let mut out = Outbound {
        sink,
        timeout: options.write_timeout,
    };

    let request = match read_request(&mut receiver).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!("client left before subscribing");
            return;
        }
        Err(rejection) => {
            let _ = out.frame(&rejection).await;
            out.close().await;
            return;
        }
    };

    let mut handle = match sim.subscribe(request) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = out.frame(&SubscribeResponse::from_core_error(&e)).await;
            out.close().await;
            return;
        }
    };
    let session = handle.id();
    let mut unresponsive = false;

    loop {
        let written = tokio::select! {
            notification = handle.recv() => {
                let Some(notification) = notification else { break };
                out.frame_until(&SubscribeResponse::from(&notification), handle.cancel_token())
                    .await
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(%session, "client closed connection");
                    handle.cancel();
                    break;
                }
                Some(Ok(Message::Ping(data))) => {
                    out.send_until(Message::Pong(data), handle.cancel_token()).await
                }
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => {
                    warn!(%session, error = %e, "websocket read failed");
                    handle.cancel();
                    break;
                }
            }
        };

        match written {
            Ok(()) => {}
            Err(WriteError::Cancelled) => break,
            Err(e) => {
                warn!(%session, error = %e, "websocket write failed");
                unresponsive = true;
                handle.cancel();
                break;
            }
        }
    }

    let end = handle.join().await;
    if unresponsive {
        info!(%session, "dropped unresponsive client");
        return;
    }
    if let Err(e) = end {
        let _ = out.frame(&SubscribeResponse::from_core_error(&e)).await;
    }
    out.close().await;
    info!(%session, "websocket session closed");
}

/// Wait for the client's subscribe request.
///
/// `Ok(None)` means the client went away first; `Err` carries the error
/// frame to send back.
async fn read_request(
    receiver: &mut WsReceiver,
) -> Result<Option<SubscribeRequest>, SubscribeResponse> {
    let first_text = tokio::time::timeout(REQUEST_DEADLINE, async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    })
    .await
    .map_err(|_| {
        SubscribeResponse::error(
            ErrorCode::DeadlineExceeded,
            format!("no subscribe request within {}s", REQUEST_DEADLINE.as_secs()),
        )
    })?;

    let Some(text) = first_text else {
        return Ok(None);
    };
    let msg: SubscribeRequestMsg = serde_json::from_str(text.as_str()).map_err(|e| {
        SubscribeResponse::error(
            ErrorCode::InvalidArgument,
            format!("invalid subscribe request: {e}"),
        )
    })?;
    Ok(Some(msg.into_request()))
}

// ── Outbound frames ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("peer accepted no data for {0:?}")]
    TimedOut(Duration),

    #[error("session cancelled during write")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] axum::Error),
}

/// Write half of a socket. Every write is bounded by `timeout`.
struct Outbound {
    sink: WsSender,
    timeout: Duration,
}

impl Outbound {
    async fn send(&mut self, msg: Message) -> Result<(), WriteError> {
        match tokio::time::timeout(self.timeout, self.sink.send(msg)).await {
            Ok(sent) => Ok(sent?),
            Err(_) => Err(WriteError::TimedOut(self.timeout)),
        }
    }

    /// Like [`send`](Self::send), but gives up as soon as `cancel` fires.
    async fn send_until(
        &mut self,
        msg: Message,
        cancel: &CancellationToken,
    ) -> Result<(), WriteError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WriteError::Cancelled),
            sent = self.send(msg) => sent,
        }
    }

    async fn frame(&mut self, frame: &SubscribeResponse) -> Result<(), WriteError> {
        match encode(frame) {
            Some(msg) => self.send(msg).await,
            None => Ok(()),
        }
    }

    async fn frame_until(
        &mut self,
        frame: &SubscribeResponse,
        cancel: &CancellationToken,
    ) -> Result<(), WriteError> {
        match encode(frame) {
            Some(msg) => self.send_until(msg, cancel).await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        let _ = self.send(Message::Close(None)).await;
    }
}

fn encode(frame: &SubscribeResponse) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!(error = %e, "failed to serialize frame");
            None
        }
    }
}
