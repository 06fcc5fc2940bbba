//! Client facade error types.

use rimori_bridge::BridgeError;
use rimori_bus::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
