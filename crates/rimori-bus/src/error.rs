//! Event bus error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("[{bus}] Invalid topic: {topic}")]
    InvalidTopic { bus: String, topic: String },

    #[error("request timed out: no response on {topic} for event {event_id}")]
    Timeout { topic: String, event_id: u64 },

    #[error("request dropped: pending entry for event {event_id} on {topic} was discarded")]
    Dropped { topic: String, event_id: u64 },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Build an invalid-topic error for the named bus.
    pub fn invalid_topic(bus: &str, topic: &str) -> Self {
        Self::InvalidTopic {
            bus: bus.to_string(),
            topic: topic.to_string(),
        }
    }
}
