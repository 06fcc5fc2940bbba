//! Bridge error types.

use rimori_bus::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid connection context: {0}")]
    InvalidContext(String),

    #[error("channel closed before the host answered")]
    ChannelClosed,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_transport() {
        let err = BridgeError::Transport("no tokio runtime".into());
        assert_eq!(err.to_string(), "transport error: no tokio runtime");
    }

    #[test]
    fn test_display_invalid_context() {
        let err = BridgeError::InvalidContext("relative URL without a base".into());
        assert_eq!(
            err.to_string(),
            "invalid connection context: relative URL without a base"
        );
    }

    #[test]
    fn test_display_channel_closed() {
        assert_eq!(
            BridgeError::ChannelClosed.to_string(),
            "channel closed before the host answered"
        );
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_bus_error() {
        let err: BridgeError = BusError::invalid_topic("EventBus", "x").into();
        assert!(matches!(err, BridgeError::Bus(_)));
        assert_eq!(err.to_string(), "event bus error: [EventBus] Invalid topic: x");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    // ── Error trait source chain ──────────────────────────────────────

    #[test]
    fn test_error_source_bus() {
        use std::error::Error;
        let err: BridgeError = BusError::Remote("denied".into()).into();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_source_string_variants() {
        use std::error::Error;
        assert!(BridgeError::Transport("x".into()).source().is_none());
        assert!(BridgeError::ChannelClosed.source().is_none());
    }
}
