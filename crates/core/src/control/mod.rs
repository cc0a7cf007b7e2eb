//! Controller for the embedded daemon's control port.

mod client;
mod protocol;

pub use client::{
    CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY, COOKIE_FILE_NAME, SUBSCRIBED_EVENTS, TorController,
};
pub use protocol::{ControlParser, ControlReply, ControlRequest, ControlResponse};
