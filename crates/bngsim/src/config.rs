//! Resolve the effective configuration: file and environment via
//! `bngsim-config`, then command-line overrides on top.

use bngsim_config::{Config, ConfigError, ServerSettings};
use bngsim_core::SimulatorConfig;

use crate::cli::{GlobalOpts, ServeArgs, SimulationArgs};
use crate::error::CliError;

/// Load the layered file config for this invocation.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = bngsim_config::load_config(global.config.as_deref())?;
    if global.log_json {
        cfg.log.json = true;
    }
    Ok(cfg)
}

/// Settings for `bngsim serve`.
pub fn resolve_serve(
    cfg: &Config,
    args: &ServeArgs,
) -> Result<(SimulatorConfig, ServerSettings), CliError> {
    let mut settings = cfg.server_settings()?;
    if let Some(listen) = args.listen {
        settings.addr.set_ip(listen);
    }
    if let Some(port) = args.port {
        settings.addr.set_port(port);
    }

    let mut sim = cfg.simulator_config();
    apply_simulation(&mut sim, &args.simulation);
    if let Some(keepalive) = args.keepalive {
        sim.session.keepalive = keepalive.into();
    }
    if args.emit_keepalives {
        sim.session.emit_keepalives = true;
    }
    sim.validate().map_err(ConfigError::from)?;
    Ok((sim, settings))
}

/// Settings for `bngsim dump`.
pub fn resolve_simulation(
    cfg: &Config,
    args: &SimulationArgs,
) -> Result<SimulatorConfig, CliError> {
    let mut sim = cfg.simulator_config();
    apply_simulation(&mut sim, args);
    sim.validate().map_err(ConfigError::from)?;
    Ok(sim)
}

fn apply_simulation(sim: &mut SimulatorConfig, args: &SimulationArgs) {
    if let Some(count) = args.subscribers {
        sim.subscriber_count = count;
    }
    if let Some(interval) = args.refresh_interval {
        sim.refresh_interval = interval.into();
    }
    if let Some(p) = args.activation_probability {
        sim.activation_probability = p;
    }
    if let Some(ratio) = args.dual_stack_ratio {
        sim.dual_stack_ratio = ratio;
    }
}
