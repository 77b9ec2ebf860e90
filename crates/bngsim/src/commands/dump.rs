//! `bngsim dump`: advance the simulation offline and print the table.

use bngsim_config::Config;
use bngsim_core::Simulator;

use crate::cli::DumpArgs;
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &DumpArgs, cfg: &Config) -> Result<(), CliError> {
    let sim_config = config::resolve_simulation(cfg, &args.simulation)?;
    let sim = Simulator::new(sim_config)?;

    for _ in 0..args.ticks {
        let generation = sim.refresh_now().await?;
        tracing::debug!(generation, "dump tick");
    }

    let snapshot = sim.snapshot();
    let rendered =
        output::render_snapshot(args.output, &snapshot, output::should_color(args.color))?;
    output::print_output(&rendered);
    Ok(())
}
