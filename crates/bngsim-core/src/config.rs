// ── Runtime simulator configuration ──
//
// These types describe *what* to simulate and how sessions behave.
// They never touch disk: the CLI loads a file, builds a
// `SimulatorConfig`, and hands it in. Immutable once the core starts.

use std::time::Duration;

use crate::error::CoreError;

/// Largest subscriber population. Subscriber ids are packed into two MAC
/// octets, so anything above `u16::MAX` would collide.
pub const MAX_SUBSCRIBERS: u32 = 65_535;

/// Smallest send buffer that fits the initial update plus its sync marker.
pub const MIN_SEND_BUFFER: usize = 2;

/// Per-session streaming behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long an idle session waits for a new generation before the
    /// keepalive deadline fires.
    pub keepalive: Duration,
    /// Capacity of the bounded send-side buffer. A session whose reader
    /// falls this far behind is disconnected.
    pub send_buffer: usize,
    /// Emit a liveness notification when the keepalive deadline passes
    /// without new data. Off by default.
    pub emit_keepalives: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            send_buffer: 16,
            emit_keepalives: false,
        }
    }
}

/// Configuration for one simulator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Number of simulated subscribers; ids are `1..=subscriber_count`.
    pub subscriber_count: u32,
    /// Refresher cadence.
    pub refresh_interval: Duration,
    /// Probability that a subscriber is ACTIVE on a given tick.
    pub activation_probability: f64,
    /// Fraction of subscribers that also hold an IPv6 session.
    pub dual_stack_ratio: f64,
    /// Delay before retrying after a failed tick.
    pub retry_backoff: Duration,
    /// Upper bound on how long shutdown waits for in-flight work.
    pub shutdown_grace: Duration,
    pub session: SessionConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            subscriber_count: 50,
            refresh_interval: Duration::from_secs(30),
            activation_probability: 0.95,
            dual_stack_ratio: 0.5,
            retry_backoff: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.subscriber_count == 0 {
            return Err(CoreError::invalid_config(
                "subscriber_count",
                "must be at least 1",
            ));
        }
        if self.subscriber_count > MAX_SUBSCRIBERS {
            return Err(CoreError::invalid_config(
                "subscriber_count",
                format!("must be at most {MAX_SUBSCRIBERS}"),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(CoreError::invalid_config(
                "refresh_interval",
                "must be greater than zero",
            ));
        }
        if self.retry_backoff.is_zero() {
            return Err(CoreError::invalid_config(
                "retry_backoff",
                "must be greater than zero",
            ));
        }
        check_probability("activation_probability", self.activation_probability)?;
        check_probability("dual_stack_ratio", self.dual_stack_ratio)?;
        if self.session.keepalive.is_zero() {
            return Err(CoreError::invalid_config(
                "session.keepalive",
                "must be greater than zero",
            ));
        }
        if self.session.send_buffer < MIN_SEND_BUFFER {
            return Err(CoreError::invalid_config(
                "session.send_buffer",
                format!("must hold at least {MIN_SEND_BUFFER} notifications"),
            ));
        }
        Ok(())
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), CoreError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::invalid_config(
            field,
            format!("expected a probability in [0, 1], got {value}"),
        ))
    }
}
