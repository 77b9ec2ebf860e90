//! `bngsim serve`: run the refresher and the subscription server until a
//! shutdown signal arrives.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bngsim::server;
use bngsim_config::Config;
use bngsim_core::Simulator;

use crate::cli::ServeArgs;
use crate::config;
use crate::error::CliError;

/// Extra time the listener gets to flush close frames after sessions end.
const SERVER_DRAIN: Duration = Duration::from_secs(1);

pub async fn handle(args: &ServeArgs, cfg: &Config) -> Result<(), CliError> {
    let (sim_config, settings) = config::resolve_serve(cfg, args)?;
    let grace = sim_config.shutdown_grace;
    let sim = Simulator::new(sim_config)?;

    let listener = TcpListener::bind(settings.addr)
        .await
        .map_err(|source| CliError::Bind {
            addr: settings.addr,
            source,
        })?;
    let local = listener.local_addr()?;

    sim.start().await?;

    let stop_server = CancellationToken::new();
    let options = server::ServerOptions {
        write_timeout: settings.write_timeout,
    };
    let mut server = tokio::spawn(server::serve(
        listener,
        sim.clone(),
        options,
        stop_server.clone(),
    ));
    info!(addr = %local, subscribers = sim.snapshot().len(), "listening for subscriptions");

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            signal?;
            info!("shutdown signal received");
        }
        result = &mut server => {
            // The server only returns on its own if the listener failed.
            sim.shutdown().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(std::io::Error::other(e).into()),
            };
        }
    }

    sim.shutdown().await;
    stop_server.cancel();
    match tokio::time::timeout(grace + SERVER_DRAIN, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "server exited with error"),
        Ok(Err(e)) => warn!(error = %e, "server task failed"),
        Err(_) => warn!("server did not stop within the shutdown grace period"),
    }
    info!("shutdown complete");
    Ok(())
}

// ── Signals ──────────────────────────────────────────────────────────

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
