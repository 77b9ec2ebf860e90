// ── Subscriber domain model ──
//
// Every type in this module describes simulated BNG subscriber state or
// its flattened telemetry form. Consumers (store, sessions, transport)
// depend only on these.

pub mod identity;
pub mod subscriber;
pub mod telemetry;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use bngsim_core::model::*` gives you everything.

pub use identity::{MacAddress, SubscriberId};
pub use subscriber::{
    DhcpCounters, Identity, IpFamily, IpSession, PolicyAttributes, RadiusCounters, SessionState,
    SubscriberState, TrafficCounters,
};
pub use telemetry::{TelemetryValue, Update, UpdateBatch};
