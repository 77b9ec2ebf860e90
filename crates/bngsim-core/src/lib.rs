//! Telemetry engine for a simulated broadband network gateway (BNG).
//!
//! This crate owns the subscriber model, the shared telemetry store, and
//! the streaming machinery that the `bngsim` binary exposes over its
//! gNMI-style interface:
//!
//! - **[`Simulator`]**: Central facade. [`new()`](Simulator::new) validates
//!   configuration and publishes the startup population as generation 1;
//!   [`start()`](Simulator::start) spawns the background refresher;
//!   [`subscribe()`](Simulator::subscribe) opens a session;
//!   [`shutdown()`](Simulator::shutdown) drains everything within a grace
//!   period.
//!
//! - **[`TelemetryStore`]**: Copy-on-write subscriber table built on
//!   `arc-swap`. Readers always see one complete generation; a
//!   `tokio::sync::watch` channel wakes sessions parked on the next one.
//!
//! - **[`Refresher`]**: Single periodic task that advances every subscriber
//!   through the [`Generator`] and publishes the result. A failed tick
//!   keeps the previous generation and retries after a backoff.
//!
//! - **[`StreamSession`]**: One client subscription. Emits the current
//!   generation immediately, a sync marker, then every later generation in
//!   order. A client that cannot keep up is disconnected, never waited on.
//!
//! - **Domain model** ([`model`]): Subscriber identity, IP sessions,
//!   traffic, DHCP and RADIUS counters, policy attributes, and their
//!   flattened path/value form.

pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod refresher;
pub mod simulator;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{MAX_SUBSCRIBERS, SessionConfig, SimulatorConfig};
pub use error::{CoreError, ErrorKind};
pub use generator::{Advance, Generator};
pub use refresher::{Refresher, RefresherState};
pub use simulator::{SessionHandle, Simulator};
pub use store::{Snapshot, TelemetryStore, WaitOutcome};
pub use stream::{
    Notification, SessionEnd, SessionId, SessionInfo, SessionRegistry, Selector, StreamSession,
    SubscribeRequest, SubscriptionMode,
};

pub use model::{
    DhcpCounters, Identity, IpFamily, IpSession, MacAddress, PolicyAttributes, RadiusCounters,
    SessionState, SubscriberId, SubscriberState, TelemetryValue, TrafficCounters, Update,
    UpdateBatch,
};
