//! Clap derive structures for the `bngsim` CLI.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// bngsim -- simulated BNG subscriber telemetry over a gNMI-style stream
#[derive(Debug, Parser)]
#[command(
    name = "bngsim",
    version,
    about = "Simulate BNG subscriber telemetry and stream it to gNMI-style clients",
    long_about = "Simulates a broadband network gateway's subscriber table and serves\n\
        its telemetry over a WebSocket subscription endpoint.\n\n\
        Running without a subcommand is the same as `bngsim serve`.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, short = 'c', env = "BNGSIM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the simulator and serve subscriptions (default)
    Serve(ServeArgs),

    /// Advance the simulation offline and print the resulting table
    Dump(DumpArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Simulation overrides shared by `serve` and `dump`.
#[derive(Debug, Default, Args)]
pub struct SimulationArgs {
    /// Number of simulated subscribers
    #[arg(long, short = 'n')]
    pub subscribers: Option<u32>,

    /// Refresh cadence, e.g. `30s` or `500ms`
    #[arg(long)]
    pub refresh_interval: Option<humantime::Duration>,

    /// Probability a subscriber is ACTIVE on each tick (0.0-1.0)
    #[arg(long)]
    pub activation_probability: Option<f64>,

    /// Fraction of subscribers holding an IPv6 session too (0.0-1.0)
    #[arg(long)]
    pub dual_stack_ratio: Option<f64>,
}

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub listen: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Idle time before a session re-checks for data, e.g. `30s`
    #[arg(long)]
    pub keepalive: Option<humantime::Duration>,

    /// Send keepalive frames to idle streams
    #[arg(long)]
    pub emit_keepalives: bool,

    #[command(flatten)]
    pub simulation: SimulationArgs,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Refresh ticks to run before printing
    #[arg(long, short = 't', default_value = "0")]
    pub ticks: u32,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto")]
    pub color: ColorMode,

    #[command(flatten)]
    pub simulation: SimulationArgs,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// One subscriber id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}
