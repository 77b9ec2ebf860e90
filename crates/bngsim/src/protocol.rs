// ── Wire envelope ──
//
// JSON messages exchanged on the `/gnmi` WebSocket. Shapes follow gNMI's
// SubscribeRequest / SubscribeResponse: one request frame from the
// client, then a sequence of update, sync_response, keepalive and error
// frames from the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use bngsim_core::{
    CoreError, Notification, RefresherState, Selector, SessionId, SessionInfo, SubscribeRequest,
    SubscriptionMode, TelemetryValue, Update, UpdateBatch,
};

/// Path prefix every update is reported under.
pub const PREFIX: &str = "bng-telemetry/subscribers";

// ── Requests ────────────────────────────────────────────────────────

/// First (and only) client frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequestMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub subscription: Vec<SubscriptionMsg>,
    #[serde(default)]
    pub mode: SubscriptionMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMsg {
    #[serde(default)]
    pub path: String,
}

impl SubscribeRequestMsg {
    /// Decode into the core request. Subscription paths are joined onto
    /// the optional prefix.
    pub fn into_request(self) -> SubscribeRequest {
        let prefix = self.prefix.unwrap_or_default();
        let prefix = prefix.trim_matches('/');
        let paths = self.subscription.into_iter().map(|s| {
            let path = s.path.trim_matches('/').to_owned();
            match (prefix.is_empty(), path.is_empty()) {
                (true, _) => path,
                (false, true) => prefix.to_owned(),
                (false, false) => format!("{prefix}/{path}"),
            }
        });
        let paths: Vec<String> = paths.collect();
        SubscribeRequest {
            selector: if paths.is_empty() && !prefix.is_empty() {
                Selector::from_paths([prefix])
            } else {
                Selector::from_paths(paths)
            },
            mode: self.mode,
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────

/// One server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeResponse {
    Update(WireNotification),
    SyncResponse(bool),
    Keepalive { timestamp: i64 },
    Error(WireError),
}

/// A gNMI-style notification: one timestamp, one prefix, many leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNotification {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub generation: u64,
    pub prefix: String,
    pub update: Vec<WireUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireUpdate {
    pub path: String,
    pub val: TypedValue,
}

/// gNMI `TypedValue`, restricted to the scalar kinds the simulator emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedValue {
    UintVal(u64),
    IntVal(i64),
    BoolVal(bool),
    StringVal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    DeadlineExceeded,
    ResourceExhausted,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl SubscribeResponse {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(WireError {
            code,
            message: message.into(),
        })
    }

    /// Error frame reporting why a session ended.
    pub fn from_core_error(err: &CoreError) -> Self {
        let code = match err {
            CoreError::SessionOverflow { .. } => ErrorCode::ResourceExhausted,
            CoreError::SessionTransport { .. } | CoreError::ShuttingDown => ErrorCode::Unavailable,
            CoreError::InvalidConfig { .. } => ErrorCode::InvalidArgument,
            CoreError::GenerationFailed { .. } | CoreError::SubscriberSetChanged { .. } => {
                ErrorCode::Internal
            }
        };
        Self::error(code, err.to_string())
    }
}

impl From<&Notification> for SubscribeResponse {
    fn from(notification: &Notification) -> Self {
        match notification {
            Notification::Update(batch) => Self::Update(WireNotification::from(batch)),
            Notification::SyncResponse => Self::SyncResponse(true),
            Notification::Keepalive { timestamp } => Self::Keepalive {
                timestamp: unix_nanos(*timestamp),
            },
        }
    }
}

impl From<&UpdateBatch> for WireNotification {
    fn from(batch: &UpdateBatch) -> Self {
        Self {
            timestamp: unix_nanos(batch.timestamp),
            generation: batch.generation,
            prefix: PREFIX.to_owned(),
            update: batch.updates.iter().map(WireUpdate::from).collect(),
        }
    }
}

impl From<&Update> for WireUpdate {
    fn from(update: &Update) -> Self {
        Self {
            path: format!("subscriber[id={}]/{}", update.subscriber, update.path),
            val: TypedValue::from(&update.value),
        }
    }
}

impl From<&TelemetryValue> for TypedValue {
    fn from(value: &TelemetryValue) -> Self {
        match value {
            TelemetryValue::Uint(v) => Self::UintVal(*v),
            TelemetryValue::Int(v) => Self::IntVal(*v),
            TelemetryValue::Bool(v) => Self::BoolVal(*v),
            TelemetryValue::String(v) => Self::StringVal(v.clone()),
        }
    }
}

fn unix_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// ── Health ──────────────────────────────────────────────────────────

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub generation: u64,
    pub subscribers: usize,
    pub sessions: usize,
    /// Live subscriptions, oldest first.
    pub active_sessions: Vec<SessionSummary>,
    pub last_refresh: DateTime<Utc>,
    pub refresher: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub mode: SubscriptionMode,
    pub paths: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl From<SessionInfo> for SessionSummary {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.id,
            mode: info.mode,
            paths: info.paths,
            started_at: info.started_at,
        }
    }
}

pub(crate) fn refresher_label(state: RefresherState) -> String {
    match state {
        RefresherState::Idle => "idle".into(),
        RefresherState::Computing => "computing".into(),
        RefresherState::Published { generation } => format!("published({generation})"),
        RefresherState::BackingOff { failures } => format!("backing_off({failures})"),
    }
}
