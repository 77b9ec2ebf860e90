// ── Telemetry store ──
//
// Copy-on-write subscriber table with generation-based change notification.

mod telemetry_store;

pub use telemetry_store::{Snapshot, TelemetryStore, WaitOutcome};
