// ── Subscriber state ──
//
// One simulated BNG subscriber: immutable identity, per-tick session
// state, and cumulative counters. Passive data; the Generator produces
// new values and the TelemetryStore owns the published copies.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::identity::{MacAddress, SubscriberId};

/// Subscriber activation state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    Inactive,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// IP address family of a session record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

/// Access-side identity, assigned once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub mac: MacAddress,
    pub s_vlan: u16,
    pub c_vlan: u16,
    pub interface_name: String,
    pub option82: String,
    /// Whether this subscriber is provisioned with an IPv6 session too.
    pub dual_stack: bool,
}

/// One IP session (IPoE lease or delegated prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSession {
    pub session_id: u32,
    pub family: IpFamily,
    pub state: SessionState,
    pub address: IpAddr,
    pub prefix_length: u8,
    /// Granted lease time in seconds.
    pub lease_time: u32,
    /// Seconds left on the lease; 0 while inactive.
    pub lease_remaining: u32,
}

/// Interface counters. Cumulative: they never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub input_octets: u64,
    pub output_octets: u64,
    pub input_packets: u64,
    pub output_packets: u64,
}

/// DHCP message counters for one address family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpCounters {
    pub discover: u64,
    pub offer: u64,
    pub request: u64,
    pub ack: u64,
    pub release: u64,
}

/// RADIUS message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusCounters {
    pub access_request: u64,
    pub access_accept: u64,
    pub interim: u64,
}

/// Policy attributes pushed at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAttributes {
    pub control_policy_id: u32,
    pub gx_enabled: bool,
    pub dynamic_policy_name: String,
}

/// Full telemetry state of one subscriber at one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberState {
    pub id: SubscriberId,
    pub identity: Identity,
    pub state: SessionState,
    /// Seconds since the Unix epoch.
    pub activation_timestamp: i64,
    pub sessions: Vec<IpSession>,
    pub traffic: TrafficCounters,
    pub dhcp_v4: DhcpCounters,
    pub dhcp_v6: DhcpCounters,
    pub radius: RadiusCounters,
    pub policy: PolicyAttributes,
}

impl SubscriberState {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn dhcp(&self, family: IpFamily) -> &DhcpCounters {
        match family {
            IpFamily::Ipv4 => &self.dhcp_v4,
            IpFamily::Ipv6 => &self.dhcp_v6,
        }
    }

    pub(crate) fn dhcp_mut(&mut self, family: IpFamily) -> &mut DhcpCounters {
        match family {
            IpFamily::Ipv4 => &mut self.dhcp_v4,
            IpFamily::Ipv6 => &mut self.dhcp_v6,
        }
    }

    /// Address families this subscriber is provisioned for.
    pub fn families(&self) -> &'static [IpFamily] {
        if self.identity.dual_stack {
            &[IpFamily::Ipv4, IpFamily::Ipv6]
        } else {
            &[IpFamily::Ipv4]
        }
    }
}
