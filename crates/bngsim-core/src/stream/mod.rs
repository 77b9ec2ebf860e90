// ── Subscription streams ──
//
// Per-client sessions that turn store generations into an ordered
// notification sequence, plus the registry that tracks them.

mod registry;
mod selector;
mod session;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::model::UpdateBatch;

pub use registry::{SessionGuard, SessionInfo, SessionRegistry};
pub use selector::Selector;
pub use session::{SessionEnd, StreamSession};

/// Identifier of one subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How long a subscription lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SubscriptionMode {
    /// Send the current tree, then every new generation until cancelled.
    #[default]
    Stream,
    /// Send the current tree and the sync marker, then end.
    Once,
}

/// A client's subscription request, already decoded from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub selector: Selector,
    pub mode: SubscriptionMode,
}

impl SubscribeRequest {
    pub fn stream(selector: Selector) -> Self {
        Self {
            selector,
            mode: SubscriptionMode::Stream,
        }
    }

    pub fn once(selector: Selector) -> Self {
        Self {
            selector,
            mode: SubscriptionMode::Once,
        }
    }
}

/// One message on a session's outbound sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Every selected leaf at one generation.
    Update(UpdateBatch),
    /// Marks the end of the initial snapshot. Sent exactly once.
    SyncResponse,
    /// Liveness signal after an idle keepalive period.
    Keepalive { timestamp: DateTime<Utc> },
}

impl Notification {
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Update(batch) => Some(batch.generation),
            Self::SyncResponse | Self::Keepalive { .. } => None,
        }
    }
}
