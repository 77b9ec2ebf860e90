//! Shared configuration for the bngsim binary.
//!
//! TOML file + environment loading via figment, validation, and
//! translation to `bngsim_core::SimulatorConfig`. The CLI layers its
//! flag overrides on top before translating.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bngsim_core::{CoreError, SessionConfig, SimulatorConfig};

/// Environment variable prefix; nested keys use `__`, e.g.
/// `BNGSIM_SIMULATION__SUBSCRIBERS=200`.
pub const ENV_PREFIX: &str = "BNGSIM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<CoreError> for ConfigError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig { field, reason } => Self::Validation { field, reason },
            other => Self::Validation {
                field: "config".into(),
                reason: other.to_string(),
            },
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub simulation: SimulationSection,
    pub sessions: SessionsSection,
    pub log: LogSection,
}

/// Where the subscription server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: IpAddr,
    pub port: u16,
    /// Longest a single frame write may block before the session is dropped.
    pub write_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 50051,
            write_timeout_secs: 10,
        }
    }
}

/// What to simulate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
    pub subscribers: u32,
    pub refresh_interval_secs: u64,
    pub activation_probability: f64,
    pub dual_stack_ratio: f64,
    pub retry_backoff_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        let core = SimulatorConfig::default();
        Self {
            subscribers: core.subscriber_count,
            refresh_interval_secs: core.refresh_interval.as_secs(),
            activation_probability: core.activation_probability,
            dual_stack_ratio: core.dual_stack_ratio,
            retry_backoff_secs: core.retry_backoff.as_secs(),
            shutdown_grace_secs: core.shutdown_grace.as_secs(),
        }
    }
}

/// Per-session streaming behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionsSection {
    pub keepalive_secs: u64,
    pub send_buffer: usize,
    pub emit_keepalives: bool,
}

impl Default for SessionsSection {
    fn default() -> Self {
        let core = SessionConfig::default();
        Self {
            keepalive_secs: core.keepalive.as_secs(),
            send_buffer: core.send_buffer,
            emit_keepalives: core.emit_keepalives,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Resolved listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub write_timeout: Duration,
}

impl Config {
    /// Translate into the core's runtime config, rejecting invalid values.
    pub fn to_simulator_config(&self) -> Result<SimulatorConfig, ConfigError> {
        let config = self.simulator_config();
        config.validate()?;
        Ok(config)
    }

    /// Translate without validating, for callers that layer further
    /// overrides first.
    pub fn simulator_config(&self) -> SimulatorConfig {
        let sim = &self.simulation;
        SimulatorConfig {
            subscriber_count: sim.subscribers,
            refresh_interval: Duration::from_secs(sim.refresh_interval_secs),
            activation_probability: sim.activation_probability,
            dual_stack_ratio: sim.dual_stack_ratio,
            retry_backoff: Duration::from_secs(sim.retry_backoff_secs),
            shutdown_grace: Duration::from_secs(sim.shutdown_grace_secs),
            session: SessionConfig {
                keepalive: Duration::from_secs(self.sessions.keepalive_secs),
                send_buffer: self.sessions.send_buffer,
                emit_keepalives: self.sessions.emit_keepalives,
            },
        }
    }

    pub fn server_settings(&self) -> Result<ServerSettings, ConfigError> {
        if self.server.write_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "write_timeout_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(ServerSettings {
            addr: SocketAddr::new(self.server.listen, self.server.port),
            write_timeout: Duration::from_secs(self.server.write_timeout_secs),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "bngsim").map_or_else(
        || PathBuf::from("bngsim.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered provider: defaults, then the TOML file, then the environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound { path: p.to_owned() });
        }
        Some(p) => p.to_owned(),
        None => config_path(),
    };
    Ok(figment(&path).extract()?)
}
