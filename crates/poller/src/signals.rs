//! OS signal handling.
//!
//! On Unix, SIGINT (Ctrl-C), SIGTERM and SIGQUIT request a stop; elsewhere
//! only Ctrl-C does.

use tokio::sync::watch;
use tracing::{error, info};

/// Wait for the next stop signal and name it
#[cfg(unix)]
async fn next_stop_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            "SIGINT"
        }
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn next_stop_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

/// Raise `stop` once a stop signal arrives.
///
/// Failing to install the handlers also raises it.
pub async fn forward_shutdown(stop: watch::Sender<bool>) {
    match next_stop_signal().await {
        Ok(name) => info!("Received {}, finishing current tick", name),
        Err(err) => error!("Failed to listen for shutdown signals, stopping: {}", err),
    }
    let _ = stop.send(true);
}
