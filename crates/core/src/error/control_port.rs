use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlPortError {
    #[error("control port file has no PORT= prefix: {contents}")]
    MissingPrefix { contents: String },

    #[error("invalid control port address: {contents}")]
    InvalidAddress { contents: String },

    #[error("invalid control port number: {value}")]
    InvalidPort { value: String },

    #[error("control port file {path} not written after {timeout:?}")]
    Timeout { path: String, timeout: Duration },
}
