use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to connect to tor control port {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("malformed control reply line: {line:?}")]
    MalformedReply { line: String },

    #[error("unknown control reply separator {separator:?}")]
    UnknownSeparator { separator: char },

    #[error("{command} failed: {status} - {reply}")]
    CommandFailed {
        command: String,
        status: u16,
        reply: String,
    },

    #[error("unexpected control reply: {reason}")]
    UnexpectedReply { reason: String },

    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("invalid HMAC key: {reason}")]
    InvalidKey { reason: String },

    #[error("tor server hash does not match the authentication cookie")]
    ServerHashMismatch,

    #[error("authentication cookie {path} not written after {timeout:?}")]
    CookieUnavailable { path: String, timeout: Duration },

    #[error("tor control connection closed")]
    Disconnected,
}
