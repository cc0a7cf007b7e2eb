mod config;
mod control;
mod control_port;
mod launch;

pub use config::ConfigurationError;
pub use control::ControlError;
pub use control_port::ControlPortError;
pub use launch::LaunchError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    InputOutput(#[from] std::io::Error),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ControlPort(#[from] ControlPortError),

    #[error(transparent)]
    Control(#[from] ControlError),
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
