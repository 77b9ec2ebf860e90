//! Output formatting for `bngsim dump`: table, JSON, plain.
//!
//! Table uses `tabled`, structured formats use serde, plain emits one
//! subscriber id per line.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use bngsim_core::{IpFamily, Snapshot, SubscriberState};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

fn paint_state(state: &SubscriberState, color: bool) -> String {
    let label: &'static str = state.state.into();
    match (color, state.is_active()) {
        (false, _) => label.to_owned(),
        (true, true) => label.green().to_string(),
        (true, false) => label.red().to_string(),
    }
}

// ── Row types ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct SubscriberRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "VLAN")]
    vlan: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
    #[tabled(rename = "IPv6")]
    ipv6: String,
    #[tabled(rename = "In (octets)")]
    input_octets: u64,
    #[tabled(rename = "Out (octets)")]
    output_octets: u64,
    #[tabled(rename = "Policy")]
    policy: String,
}

impl SubscriberRow {
    fn new(s: &SubscriberState, color: bool) -> Self {
        let address = |family: IpFamily| {
            s.sessions
                .iter()
                .find(|session| session.family == family)
                .map_or_else(
                    || "-".into(),
                    |session| format!("{}/{}", session.address, session.prefix_length),
                )
        };
        Self {
            id: s.id.to_string(),
            mac: s.identity.mac.to_string(),
            vlan: format!("{}.{}", s.identity.s_vlan, s.identity.c_vlan),
            state: paint_state(s, color),
            ipv4: address(IpFamily::Ipv4),
            ipv6: address(IpFamily::Ipv6),
            input_octets: s.traffic.input_octets,
            output_octets: s.traffic.output_octets,
            policy: s.policy.dynamic_policy_name.clone(),
        }
    }
}

/// JSON shape of a dumped snapshot.
#[derive(Serialize)]
struct DumpDocument<'a> {
    generation: u64,
    published_at: DateTime<Utc>,
    subscribers: &'a [SubscriberState],
}

// ── Render dispatcher ────────────────────────────────────────────────

/// Render a snapshot in the chosen format.
pub fn render_snapshot(
    format: OutputFormat,
    snapshot: &Snapshot,
    color: bool,
) -> Result<String, CliError> {
    let doc = DumpDocument {
        generation: snapshot.generation,
        published_at: snapshot.published_at,
        subscribers: &snapshot.subscribers,
    };
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<SubscriberRow> = snapshot
                .iter()
                .map(|s| SubscriberRow::new(s, color))
                .collect();
            let active = snapshot.iter().filter(|s| s.is_active()).count();
            format!(
                "{}\n{} subscribers, {active} active, generation {}",
                render_table(&rows),
                snapshot.len(),
                snapshot.generation,
            )
        }
        OutputFormat::Json => serde_json::to_string_pretty(&doc)?,
        OutputFormat::JsonCompact => serde_json::to_string(&doc)?,
        OutputFormat::Plain => snapshot
            .iter()
            .map(|s| s.id.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
