use std::{fmt, path::Path, time::Duration};

use tokio::{
    fs,
    time::{Instant, sleep},
};
use tracing::debug;

use crate::error::{ControlPortError, Result};

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Address the daemon's control listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPortAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ControlPortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses the `PORT=<host>:<port>` line written by `ControlPortWriteToFile`.
pub fn parse_control_port(contents: &str) -> Result<ControlPortAddress> {
    let trimmed = contents.trim();
    let address = trimmed
        .strip_prefix("PORT=")
        .ok_or_else(|| ControlPortError::MissingPrefix {
            contents: trimmed.to_string(),
        })?;

    let (host, port) = address
        .rsplit_once(':')
        .filter(|(host, _)| !host.is_empty())
        .ok_or_else(|| ControlPortError::InvalidAddress {
            contents: trimmed.to_string(),
        })?;

    let port = port.parse().map_err(|_| ControlPortError::InvalidPort {
        value: port.to_string(),
    })?;

    Ok(ControlPortAddress {
        host: host.to_string(),
        port,
    })
}

impl ControlPortAddress {
    /// Host without the brackets Tor puts around IPv6 literals.
    pub fn socket_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

/// Waits for the daemon to write its control port file, then parses it.
pub async fn wait_for_control_port(path: &Path, timeout: Duration) -> Result<ControlPortAddress> {
    let contents = wait_for_file(path, timeout)
        .await?
        .ok_or_else(|| ControlPortError::Timeout {
            path: path.display().to_string(),
            timeout,
        })?;
    let contents = String::from_utf8_lossy(&contents);
    debug!(path = %path.display(), contents = contents.trim(), "control port file ready");
    parse_control_port(&contents)
}

/// Polls until `path` exists with non-empty contents. `None` on timeout.
pub(crate) async fn wait_for_file(path: &Path, timeout: Duration) -> Result<Option<Vec<u8>>> {
    let started = Instant::now();
    loop {
        if fs::try_exists(path).await? {
            let contents = fs::read(path).await?;
            if !contents.is_empty() {
                return Ok(Some(contents));
            }
        }

        if started.elapsed() >= timeout {
            return Ok(None);
        }
        debug!(path = %path.display(), "file does not exist yet");
        sleep(POLL_INTERVAL).await;
    }
}
