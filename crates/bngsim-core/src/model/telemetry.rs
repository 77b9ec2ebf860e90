// ── Flattened telemetry ──
//
// The transport-neutral form of a snapshot: an ordered list of
// (subscriber-id, field-path, typed value) triples plus one batch
// timestamp. Schema and wire layers re-encode from this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::SubscriberId;
use super::subscriber::{IpFamily, SubscriberState};

/// A typed leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryValue {
    Uint(u64),
    Int(i64),
    Bool(bool),
    String(String),
}

impl From<u64> for TelemetryValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<u32> for TelemetryValue {
    fn from(v: u32) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<u16> for TelemetryValue {
    fn from(v: u16) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<u8> for TelemetryValue {
    fn from(v: u8) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// One leaf of one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub subscriber: SubscriberId,
    pub path: String,
    pub value: TelemetryValue,
}

/// Everything a session emits for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
    pub updates: Vec<Update>,
}

impl UpdateBatch {
    /// Flatten a set of subscribers, stamped with the given wall-clock time.
    pub fn from_subscribers<'a>(
        generation: u64,
        timestamp: DateTime<Utc>,
        subscribers: impl IntoIterator<Item = &'a SubscriberState>,
    ) -> Self {
        let updates = subscribers
            .into_iter()
            .flat_map(SubscriberState::to_updates)
            .collect();
        Self {
            generation,
            timestamp,
            updates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

struct Leaves {
    subscriber: SubscriberId,
    out: Vec<Update>,
}

impl Leaves {
    fn push(&mut self, path: impl Into<String>, value: impl Into<TelemetryValue>) {
        self.out.push(Update {
            subscriber: self.subscriber,
            path: path.into(),
            value: value.into(),
        });
    }
}

impl SubscriberState {
    /// Flatten this subscriber into leaf updates.
    pub fn to_updates(&self) -> Vec<Update> {
        let mut leaves = Leaves {
            subscriber: self.id,
            out: Vec::with_capacity(48),
        };

        leaves.push("mac-address", self.identity.mac.as_str());
        leaves.push("identity/s-vlan", self.identity.s_vlan);
        leaves.push("identity/c-vlan", self.identity.c_vlan);
        leaves.push("identity/interface-name", self.identity.interface_name.as_str());
        leaves.push("identity/option82", self.identity.option82.as_str());

        leaves.push("state/current-state", <&str>::from(self.state));
        leaves.push("state/activation-timestamp", self.activation_timestamp);

        for session in &self.sessions {
            let base = format!("sessions/session[{}]", session.session_id);
            leaves.push(format!("{base}/family"), <&str>::from(session.family));
            leaves.push(format!("{base}/state"), <&str>::from(session.state));
            leaves.push(format!("{base}/ip-address"), session.address.to_string());
            leaves.push(format!("{base}/prefix-length"), session.prefix_length);
            leaves.push(format!("{base}/lease-time"), session.lease_time);
            leaves.push(format!("{base}/lease-remaining"), session.lease_remaining);
        }

        leaves.push("statistics/input-octets", self.traffic.input_octets);
        leaves.push("statistics/output-octets", self.traffic.output_octets);
        leaves.push("statistics/input-packets", self.traffic.input_packets);
        leaves.push("statistics/output-packets", self.traffic.output_packets);

        for family in [IpFamily::Ipv4, IpFamily::Ipv6] {
            let dhcp = self.dhcp(family);
            let base = format!("statistics/dhcp/{family}");
            leaves.push(format!("{base}/discover"), dhcp.discover);
            leaves.push(format!("{base}/offer"), dhcp.offer);
            leaves.push(format!("{base}/request"), dhcp.request);
            leaves.push(format!("{base}/ack"), dhcp.ack);
            leaves.push(format!("{base}/release"), dhcp.release);
        }

        leaves.push("statistics/radius/access-request", self.radius.access_request);
        leaves.push("statistics/radius/access-accept", self.radius.access_accept);
        leaves.push("statistics/radius/interim", self.radius.interim);

        leaves.push("policies/control-policy-id", self.policy.control_policy_id);
        leaves.push("policies/gx-enabled", self.policy.gx_enabled);
        leaves.push(
            "policies/dynamic-policy-name",
            self.policy.dynamic_policy_name.as_str(),
        );

        leaves.out
    }
}
