// ── Core error types ──
//
// Failures raised by the telemetry engine. Generation and session failures
// are local: they are logged and isolated, never propagated to siblings.
// Only `InvalidConfig` is fatal, and only at startup.

use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::stream::SessionId;

/// Coarse classification used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    StartupConfig,
    Generation,
    SessionTransport,
    Lifecycle,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Startup ──────────────────────────────────────────────────────
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ── Refresh ──────────────────────────────────────────────────────
    #[error("Telemetry generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Subscriber set changed: expected {expected} subscribers, got {actual}")]
    SubscriberSetChanged { expected: usize, actual: usize },

    // ── Sessions ─────────────────────────────────────────────────────
    #[error("Session {session} exceeded its send buffer of {capacity} notifications")]
    SessionOverflow { session: SessionId, capacity: usize },

    #[error("Session {session} transport failed: {reason}")]
    SessionTransport { session: SessionId, reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Simulator is shutting down")]
    ShuttingDown,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } => ErrorKind::StartupConfig,
            Self::GenerationFailed { .. } | Self::SubscriberSetChanged { .. } => {
                ErrorKind::Generation
            }
            Self::SessionOverflow { .. } | Self::SessionTransport { .. } => {
                ErrorKind::SessionTransport
            }
            Self::ShuttingDown => ErrorKind::Lifecycle,
        }
    }

    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
