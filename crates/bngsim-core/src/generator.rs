// ── Synthetic subscriber generator ──
//
// Stateless value producers. Identity is seeded from the subscriber id
// so MACs, VLANs and option-82 strings are reproducible across restarts;
// everything else is drawn from the caller's RNG. All arithmetic
// saturates, so `advance` is total for any prior state.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulatorConfig;
use crate::error::CoreError;
use crate::model::{
    DhcpCounters, Identity, IpFamily, IpSession, MacAddress, PolicyAttributes, RadiusCounters,
    SessionState, SubscriberId, SubscriberState, TrafficCounters,
};
use crate::store::Snapshot;

const MAC_OUI: [u8; 3] = [0x00, 0x10, 0x94];
const IDENTITY_SEED: u64 = 0x626e_6773_696d_0001;
const IPV4_LEASE_SECS: u32 = 86_400;
const IPV6_LEASE_SECS: u32 = 43_200;
const SESSION_IDS: std::ops::RangeInclusive<u32> = 10_000..=99_999;

/// Computes the next subscriber table from the previous one.
///
/// This is the Refresher's seam: [`Generator`] is the production model,
/// tests substitute models that fail on demand.
pub trait Advance: Send + Sync + 'static {
    fn advance_all(
        &self,
        previous: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriberState>, CoreError>;
}

/// Produces initial and incremental subscriber values.
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    /// Probability that a subscriber is ACTIVE on any tick.
    pub activation_probability: f64,
    /// Fraction of subscribers provisioned with an IPv6 session.
    pub dual_stack_ratio: f64,
}

impl Default for Generator {
    fn default() -> Self {
        Self::from_config(&SimulatorConfig::default())
    }
}

impl Generator {
    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self {
            activation_probability: config.activation_probability,
            dual_stack_ratio: config.dual_stack_ratio,
        }
    }

    /// Build the full startup population `1..=count`.
    pub fn populate(&self, count: u32, now: i64, rng: &mut impl Rng) -> Vec<SubscriberState> {
        SubscriberId::range(count)
            .map(|id| self.initial_state(id, now, rng))
            .collect()
    }

    /// Deterministic access identity for `id`.
    pub fn identity(&self, id: SubscriberId) -> Identity {
        let mut rng = StdRng::seed_from_u64(IDENTITY_SEED ^ u64::from(id.get()));
        let [_, _, hi, lo] = id.get().to_be_bytes();
        let [a, b, c] = MAC_OUI;

        Identity {
            mac: MacAddress::from_octets([a, b, c, hi, lo, rng.gen_range(0..=255)]),
            s_vlan: rng.gen_range(100..=4000),
            c_vlan: rng.gen_range(1..=4094),
            interface_name: format!("Bundle-Ether1.{id}"),
            option82: format!("option82-{id}"),
            dual_stack: rng.gen_bool(self.dual_stack_ratio),
        }
    }

    /// A freshly provisioned subscriber with plausible accumulated counters.
    pub fn initial_state(&self, id: SubscriberId, now: i64, rng: &mut impl Rng) -> SubscriberState {
        let identity = self.identity(id);
        let state = self.roll_state(rng);

        let input_octets = rng.gen_range(1_000_000..=50_000_000);
        let output_octets = scale(input_octets, rng.gen_range(0.1..0.8));
        let traffic = TrafficCounters {
            input_octets,
            output_octets,
            input_packets: packets_for(input_octets, rng),
            output_packets: packets_for(output_octets, rng),
        };

        let dhcp_v4 = initial_dhcp(rng);
        let dhcp_v6 = if identity.dual_stack {
            initial_dhcp(rng)
        } else {
            DhcpCounters::default()
        };

        let access_request = rng.gen_range(1..=3);
        let radius = RadiusCounters {
            access_request,
            access_accept: access_request - rng.gen_range(0..access_request),
            interim: rng.gen_range(0..=10),
        };

        let mut subscriber = SubscriberState {
            id,
            sessions: Vec::new(),
            identity,
            state,
            activation_timestamp: now - rng.gen_range(0..=86_400),
            traffic,
            dhcp_v4,
            dhcp_v6,
            radius,
            policy: random_policy(rng),
        };
        subscriber.sessions = fresh_sessions(subscriber.families(), state, rng);
        subscriber
    }

    /// Produce the next tick's state from the previous one.
    ///
    /// One activation decision is made per call. ACTIVE subscribers gain
    /// traffic and age their leases by `elapsed_secs`, renewing at half
    /// life; a subscriber coming back from INACTIVE is re-provisioned with
    /// new sessions. INACTIVE subscribers keep their traffic counters and
    /// count one release per address family.
    pub fn advance(
        &self,
        prev: &SubscriberState,
        now: i64,
        elapsed_secs: u32,
        rng: &mut impl Rng,
    ) -> SubscriberState {
        let mut next = prev.clone();

        if self.roll_state(rng).is_active() {
            if prev.is_active() {
                continue_session(&mut next, elapsed_secs, rng);
            } else {
                reactivate(&mut next, now, rng);
            }
            add_traffic(&mut next.traffic, rng);
        } else {
            deactivate(&mut next);
        }
        next
    }

    fn roll_state(&self, rng: &mut impl Rng) -> SessionState {
        if rng.gen_bool(self.activation_probability) {
            SessionState::Active
        } else {
            SessionState::Inactive
        }
    }

}

impl Advance for Generator {
    fn advance_all(
        &self,
        previous: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriberState>, CoreError> {
        let mut rng = rand::thread_rng();
        let now = now.timestamp();
        // Whole seconds crossed since the last publish. Summed over ticks
        // this tracks wall time even when the interval is sub-second.
        let elapsed = now.saturating_sub(previous.published_at.timestamp()).max(0);
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        Ok(previous
            .iter()
            .map(|sub| self.advance(sub, now, elapsed, &mut rng))
            .collect())
    }
}

// ── Tick transitions ────────────────────────────────────────────────

fn continue_session(sub: &mut SubscriberState, elapsed_secs: u32, rng: &mut impl Rng) {
    let mut renewals = Vec::new();

    for session in &mut sub.sessions {
        session.state = SessionState::Active;
        session.lease_remaining = session.lease_remaining.saturating_sub(elapsed_secs);
        // Renew at T1, half the lease.
        if session.lease_remaining <= session.lease_time / 2 {
            session.lease_remaining = session.lease_time;
            renewals.push(session.family);
        }
    }

    for &family in sub.families() {
        let extra = u64::from(renewals.contains(&family));
        record_requests(sub.dhcp_mut(family), extra + rng.gen_range(0..=1), rng);
    }
    sub.radius.interim = sub.radius.interim.saturating_add(1);
}

fn reactivate(sub: &mut SubscriberState, now: i64, rng: &mut impl Rng) {
    sub.state = SessionState::Active;
    sub.activation_timestamp = now;
    sub.sessions = fresh_sessions(sub.families(), SessionState::Active, rng);

    // Full DORA per family, then RADIUS access for the new session.
    for &family in sub.families() {
        let dhcp = sub.dhcp_mut(family);
        dhcp.discover = dhcp.discover.saturating_add(1);
        dhcp.offer = dhcp.offer.saturating_add(1);
        record_requests(dhcp, 1, rng);
    }
    sub.radius.access_request = sub.radius.access_request.saturating_add(1);
    sub.radius.access_accept = sub.radius.access_accept.saturating_add(1);
    sub.policy = random_policy(rng);
}

fn deactivate(sub: &mut SubscriberState) {
    sub.state = SessionState::Inactive;
    for session in &mut sub.sessions {
        session.state = SessionState::Inactive;
        session.lease_remaining = 0;
    }
    for &family in sub.families() {
        let dhcp = sub.dhcp_mut(family);
        dhcp.release = dhcp.release.saturating_add(1);
    }
}

/// Count `count` new requests; acks trail requests by at most one.
fn record_requests(dhcp: &mut DhcpCounters, count: u64, rng: &mut impl Rng) {
    dhcp.request = dhcp.request.saturating_add(count);
    let lagging = dhcp.request.saturating_sub(rng.gen_range(0..=1));
    dhcp.ack = dhcp.ack.max(lagging);
}

fn add_traffic(traffic: &mut TrafficCounters, rng: &mut impl Rng) {
    let input = rng.gen_range(100_000..=5_000_000);
    let output = scale(input, rng.gen_range(0.1..0.8));
    traffic.input_octets = traffic.input_octets.saturating_add(input);
    traffic.output_octets = traffic.output_octets.saturating_add(output);
    traffic.input_packets = traffic
        .input_packets
        .saturating_add(packets_for(input, rng));
    traffic.output_packets = traffic
        .output_packets
        .saturating_add(packets_for(output, rng));
}

// ── Value helpers ───────────────────────────────────────────────────

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::as_conversions
)]
fn scale(octets: u64, ratio: f64) -> u64 {
    (octets as f64 * ratio) as u64
}

/// Packet count for an octet volume, at a random mean packet size.
fn packets_for(octets: u64, rng: &mut impl Rng) -> u64 {
    (octets / rng.gen_range(400..=1400)).max(1)
}

fn initial_dhcp(rng: &mut impl Rng) -> DhcpCounters {
    let discover = rng.gen_range(1..=5);
    let mut dhcp = DhcpCounters {
        discover,
        offer: discover,
        request: 0,
        ack: 0,
        release: rng.gen_range(0..=2),
    };
    record_requests(&mut dhcp, discover + rng.gen_range(0..=5), rng);
    dhcp
}

fn random_policy(rng: &mut impl Rng) -> PolicyAttributes {
    PolicyAttributes {
        control_policy_id: rng.gen_range(1000..=9999),
        gx_enabled: rng.gen_bool(0.5),
        dynamic_policy_name: format!("policy-{}", rng.gen_range(1..=10)),
    }
}

/// A session id not already in `taken`. Draws from the range shrunk by
/// `taken.len()` and steps over each taken id, so it never retries.
fn unique_session_id(taken: &mut Vec<u32>, rng: &mut impl Rng) -> u32 {
    taken.sort_unstable();
    let free = u32::try_from(taken.len()).unwrap_or(u32::MAX);
    let mut id = rng.gen_range(*SESSION_IDS.start()..=SESSION_IDS.end().saturating_sub(free));
    for &used in taken.iter() {
        if id >= used {
            id = id.saturating_add(1);
        }
    }
    taken.push(id);
    id
}

fn fresh_sessions(
    families: &[IpFamily],
    state: SessionState,
    rng: &mut impl Rng,
) -> Vec<IpSession> {
    let mut taken = Vec::with_capacity(families.len());
    families
        .iter()
        .map(|&family| {
            let (address, prefix_length, lease_time) = match family {
                IpFamily::Ipv4 => (
                    IpAddr::V4(Ipv4Addr::new(
                        10,
                        rng.gen_range(1..=254),
                        rng.gen_range(1..=254),
                        rng.gen_range(1..=254),
                    )),
                    32,
                    IPV4_LEASE_SECS,
                ),
                // Delegated /56 out of the documentation range.
                IpFamily::Ipv6 => (
                    IpAddr::V6(Ipv6Addr::new(
                        0x2001,
                        0x0db8,
                        rng.gen_range(0..=u16::MAX),
                        rng.gen_range(0..=u16::MAX) & 0xff00,
                        0,
                        0,
                        0,
                        0,
                    )),
                    56,
                    IPV6_LEASE_SECS,
                ),
            };
            IpSession {
                session_id: unique_session_id(&mut taken, rng),
                family,
                state,
                address,
                prefix_length,
                lease_time,
                lease_remaining: if state.is_active() { lease_time } else { 0 },
            }
        })
        .collect()
}
