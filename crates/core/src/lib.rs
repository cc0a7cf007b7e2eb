//! Runs an embedded Tor daemon on a background thread.
//!
//! [`Launcher`] copies a command line, hands it to a [`DaemonLibrary`] on a
//! dedicated thread and tracks whether that thread is still inside the
//! daemon's main loop. With the `tor` feature the library is Tor's embedding
//! API and a process-wide launcher is available as `TOR_LAUNCHER`.
//!
//! [`TorController`] attaches to the running daemon's control port: it
//! authenticates with the cookie, takes ownership, forwards the daemon's log
//! events to `tracing`, and stops the daemon with `SIGNAL SHUTDOWN`.

pub mod arguments;
pub mod config;
pub mod control;
pub mod control_port;
pub mod daemon_library;
pub mod error;
pub mod launcher;
#[cfg(feature = "tor")]
pub mod tor_api;

pub use arguments::StartupArguments;
pub use config::TorLaunchOptions;
pub use control::TorController;
pub use control_port::{ControlPortAddress, parse_control_port, wait_for_control_port};
pub use daemon_library::DaemonLibrary;
pub use launcher::{Launcher, LauncherState};
#[cfg(feature = "tor")]
pub use launcher::{TOR_LAUNCHER, is_tor_running, start_tor_in_thread};
#[cfg(feature = "tor")]
pub use tor_api::TorLibrary;
