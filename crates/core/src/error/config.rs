use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cache directory not available")]
    CacheDirectoryNotAvailable,

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration file: {reason}")]
    InvalidFile { reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
