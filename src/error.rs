//! Transport failures of the live feed
//!
//! None of these reach the owner of a client: they are logged and turned
//! into a reconnect by the connection state machine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("stream closed by server")]
    Closed,
}

#[cfg(all(feature = "cli", not(target_arch = "wasm32")))]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}
