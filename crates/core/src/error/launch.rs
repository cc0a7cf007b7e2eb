use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("daemon already running")]
    AlreadyRunning,

    #[error("startup arguments are empty")]
    EmptyArguments,

    #[error("invalid startup argument at index {index}: {reason}")]
    InvalidArgument { index: usize, reason: String },

    #[error("failed to spawn daemon thread: {reason}")]
    SpawnFailed { reason: String },

    #[error("daemon configuration could not be created")]
    ConfigurationUnavailable,

    #[error("daemon rejected the command line (code {code})")]
    CommandLineRejected { code: i32 },

    #[error("daemon still running after {timeout:?}")]
    Timeout { timeout: Duration },
}
