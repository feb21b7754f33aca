//! Vehicle Telemetry Poller - Main Entry Point

use poller::{init_logging, signals, LogFormat, PollerConfig, EXIT_FATAL};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let loaded = PollerConfig::from_env();

    let (verbose, format) = match &loaded {
        Ok(config) => (config.verbose, config.log_format),
        Err(_) => (false, LogFormat::Text),
    };
    if let Err(err) = init_logging(verbose, format) {
        eprintln!("Failed to set tracing subscriber: {}", err);
    }

    info!("=== Vehicle Telemetry Poller v{} ===", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to get settings: {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(signals::forward_shutdown(stop_tx));

    match poller::run(config, stop_rx).await {
        Ok(exit) => {
            info!("Poller exited: {:?}", exit);
            ExitCode::from(exit.exit_code())
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
