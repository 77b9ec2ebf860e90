mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bngsim_config::LogSection;

use crate::cli::{Cli, Command, ServeArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Install the global subscriber. `RUST_LOG` wins, then `-v`, then the
/// config file's `[log] level`. Logs go to stderr so `dump` output stays
/// clean on stdout.
fn init_tracing(verbosity: u8, log: &LogSection) {
    let fallback = match verbosity {
        0 => log.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let command = cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    // Completions need neither config nor logging
    if let Command::Completions(args) = &command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Cli::command();
        generate(args.shell, &mut cmd, "bngsim", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load(&cli.global)?;
    init_tracing(cli.global.verbose, &cfg.log);
    tracing::debug!(command = ?command, "dispatching command");

    match &command {
        Command::Serve(args) => commands::serve::handle(args, &cfg).await,
        Command::Dump(args) => commands::dump::handle(args, &cfg).await,
        Command::Completions(_) => Ok(()),
    }
}
