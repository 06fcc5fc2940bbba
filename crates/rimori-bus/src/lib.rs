//! Rimori event bus
//!
//! In-process publish/subscribe engine shared by a plugin and its host.
//! Topics are dot-separated `<scope>.<area>.<action>` strings; listeners
//! may subscribe to exact topics or to prefix wildcards. Requests are
//! correlated with their responses through the event ID.

pub mod bus;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod id;
pub mod registry;
pub mod topic;

pub use bus::{
    EventBus, Handler, IntoTopics, ListenerId, PendingRequest, Responder, ResponseFuture,
    Subscription, DEBUG_TOPIC, ERROR_TOPIC,
};
pub use config::BusConfig;
pub use dedup::DedupWindow;
pub use error::BusError;
pub use event::{payload_or_empty, Event, GLOBAL_SENDER};
pub use id::IdGenerator;
pub use registry::BusRegistry;
pub use topic::{is_local_topic, is_valid_topic, topic_matches, validate_topic, Strictness};
