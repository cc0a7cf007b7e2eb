use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

#[cfg(feature = "tor")]
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

#[cfg(feature = "tor")]
use crate::tor_api::TorLibrary;
use crate::{
    arguments::StartupArguments,
    daemon_library::DaemonLibrary,
    error::{LaunchError, Result},
};

pub const WORKER_THREAD_NAME: &str = "tor-main";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LauncherState {
    Idle,
    Running,
}

/// Runs a daemon's blocking main entry point on a dedicated thread, one
/// instance at a time.
pub struct Launcher<L: DaemonLibrary> {
    library: Arc<L>,
    running: Arc<AtomicBool>,
}

impl<L: DaemonLibrary> Clone for Launcher<L> {
    fn clone(&self) -> Self {
        Self {
            library: Arc::clone(&self.library),
            running: Arc::clone(&self.running),
        }
    }
}

/// Clears the running flag when the worker is done with everything it owns.
struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl<L: DaemonLibrary> Launcher<L> {
    pub fn new(library: L) -> Self {
        Self {
            library: Arc::new(library),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Copies `arguments` and starts the daemon on a background thread.
    ///
    /// Returns as soon as the thread is spawned. Fails with
    /// [`LaunchError::AlreadyRunning`] if a previous start has not finished;
    /// the running instance is left untouched.
    pub fn start<S: AsRef<str>>(&self, arguments: &[S]) -> Result<()> {
        if self.is_running() {
            warn!("Cannot start daemon as it is already running");
            return Err(LaunchError::AlreadyRunning.into());
        }

        let arguments = StartupArguments::copy_from(arguments)?;

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Cannot start daemon as it is already running");
            return Err(LaunchError::AlreadyRunning.into());
        }
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
        };

        info!(argc = arguments.len(), "Starting daemon thread");
        debug!(arguments = ?arguments.to_strings(), "daemon command line");

        let library = Arc::clone(&self.library);
        // On spawn failure the closure is dropped, and the guard with it.
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                run_worker(library.as_ref(), arguments);
            })
            .map_err(|error| LaunchError::SpawnFailed {
                reason: error.to_string(),
            })?;

        Ok(())
    }

    /// Snapshot of the running flag. May be stale as soon as it returns.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LauncherState {
        if self.is_running() {
            LauncherState::Running
        } else {
            LauncherState::Idle
        }
    }

    /// Polls until the worker has exited. Does not ask the daemon to stop.
    pub async fn wait_until_stopped(
        &self,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();
        while self.is_running() {
            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Err(LaunchError::Timeout { timeout }.into());
                }
            }
            sleep(poll_interval).await;
        }
        Ok(())
    }
}

fn run_worker<L: DaemonLibrary>(library: &L, arguments: StartupArguments) {
    let mut configuration = match library.create_configuration() {
        Ok(configuration) => configuration,
        Err(error) => {
            error!(%error, "Failed to create daemon configuration");
            return;
        }
    };

    match library.set_command_line(&mut configuration, arguments) {
        Ok(()) => {
            let code = library.run_main(&configuration);
            if code == 0 {
                info!(code, "Daemon exited");
            } else {
                warn!(code, "Daemon exited with non-zero status");
            }
        }
        Err(error) => error!(%error, "Failed to install daemon command line"),
    }

    library.release_configuration(configuration);
}

/// The process-wide Tor launcher. Tor supports a single instance per process.
#[cfg(feature = "tor")]
pub static TOR_LAUNCHER: Lazy<Launcher<TorLibrary>> = Lazy::new(|| Launcher::new(TorLibrary));

#[cfg(feature = "tor")]
pub fn start_tor_in_thread<S: AsRef<str>>(arguments: &[S]) -> Result<()> {
    TOR_LAUNCHER.start(arguments)
}

#[cfg(feature = "tor")]
pub fn is_tor_running() -> bool {
    TOR_LAUNCHER.is_running()
}
