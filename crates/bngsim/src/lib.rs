//! Network surface of the bngsim simulator.
//!
//! - **[`server`]**: axum router serving WebSocket subscriptions on
//!   `/gnmi` and a health check on `/healthz`.
//! - **[`protocol`]**: the JSON request/response envelope, shaped after
//!   gNMI's `SubscribeRequest` / `SubscribeResponse`.

pub mod protocol;
pub mod server;
