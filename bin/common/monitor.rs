//! Exit signal monitor

use std::io;

use log::info;

/// Completes when the process receives a termination request.
#[cfg(unix)]
pub async fn create_signal_monitor() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let signal_name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    info!("received {}, starting shutdown", signal_name);
    Ok(())
}

/// Completes when the process receives a termination request.
#[cfg(not(unix))]
pub async fn create_signal_monitor() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, starting shutdown");
    Ok(())
}
