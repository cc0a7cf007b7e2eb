use std::time::Duration;

use torthread_core::{TOR_LAUNCHER, TorController, error::Result};
use tracing::{info, warn};

use crate::LaunchArgs;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(launch: LaunchArgs, control_timeout: u64) -> Result<()> {
    let options = launch.resolve()?;

    // A stale file from a previous run would be read as the new address.
    if tokio::fs::try_exists(&options.control_port_file).await? {
        tokio::fs::remove_file(&options.control_port_file).await?;
    }

    TOR_LAUNCHER.start(&options.to_arguments())?;
    info!(state = ?TOR_LAUNCHER.state(), "Tor thread started");

    let controller =
        match TorController::attach(&options, Duration::from_secs(control_timeout)).await {
            Ok(controller) => Some(controller),
            Err(error) => {
                warn!(%error, "Tor control port not available; daemon logs and shutdown are unavailable");
                None
            }
        };

    tokio::select! {
        result = TOR_LAUNCHER.wait_until_stopped(STATUS_POLL_INTERVAL, None) => result?,
        _ = tokio::signal::ctrl_c() => {
            let Some(controller) = &controller else {
                warn!("Interrupted without a control connection; exiting");
                return Ok(());
            };
            info!("Interrupted; asking Tor to shut down");
            controller.shutdown().await?;
            TOR_LAUNCHER
                .wait_until_stopped(STATUS_POLL_INTERVAL, None)
                .await?;
        }
    }

    info!(state = ?TOR_LAUNCHER.state(), "Tor thread finished");
    Ok(())
}
