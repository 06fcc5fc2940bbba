//! Topic grammar and wildcard matching.
//!
//! Topics follow `<scope>.<area>.<action>` where `scope` is a plugin id,
//! `global` or `self`. The action must be `*` or start with one of the
//! [`VALID_ACTIONS`]. Two wildcard shapes are also accepted: `*` on its
//! own and `<scope>.*`.

use std::fmt;

use crate::error::BusError;

/// Action prefixes a topic's third segment may start with.
pub const VALID_ACTIONS: &[&str] = &["request", "create", "update", "delete", "trigger"];

/// The global wildcard topic.
pub const WILDCARD: &str = "*";

/// Prefix of topics that never leave the local execution context.
pub const SELF_PREFIX: &str = "self.";

/// Prefix of topics addressed to the host or every plugin.
pub const GLOBAL_PREFIX: &str = "global.";

/// Whether a failed validation is reported as an error or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Log and return `Ok(false)`. Used at emit time.
    Lenient,
    /// Log and return `Err(BusError::InvalidTopic)`. Used at subscribe and
    /// request time.
    Strict,
}

/// Why a topic was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicViolation {
    SegmentCount(usize),
    EmptySegment,
    InvalidAction(String),
}

impl fmt::Display for TopicViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCount(n) => write!(
                f,
                "event topic must consist of 3 parts <pluginId>.<area>.<action>, got {n}"
            ),
            Self::EmptySegment => write!(f, "event topic must not contain empty segments"),
            Self::InvalidAction(action) => write!(
                f,
                "invalid action '{action}', must be or start with one of: {}",
                VALID_ACTIONS.join(", ")
            ),
        }
    }
}

/// Check a topic against the grammar without logging.
pub fn check_topic(topic: &str) -> Result<(), TopicViolation> {
    let parts: Vec<&str> = topic.split('.').collect();

    match parts.as_slice() {
        [scope] if *scope == WILDCARD => Ok(()),
        [scope, area] if *scope != WILDCARD && !scope.is_empty() && *area == WILDCARD => Ok(()),
        [scope, area, action] => {
            if scope.is_empty() || area.is_empty() || action.is_empty() {
                return Err(TopicViolation::EmptySegment);
            }
            if *action == WILDCARD || VALID_ACTIONS.iter().any(|a| action.starts_with(a)) {
                Ok(())
            } else {
                Err(TopicViolation::InvalidAction(action.to_string()))
            }
        }
        other => Err(TopicViolation::SegmentCount(other.len())),
    }
}

/// Returns `true` if `topic` satisfies the grammar.
pub fn is_valid_topic(topic: &str) -> bool {
    check_topic(topic).is_ok()
}

/// Validate a topic on behalf of the bus named `bus`.
///
/// Violations are always logged. Only [`Strictness::Strict`] turns them
/// into an error; lenient callers get `Ok(false)` so a producer cannot be
/// crashed by a topic typo.
pub fn validate_topic(bus: &str, topic: &str, strictness: Strictness) -> Result<bool, BusError> {
    match check_topic(topic) {
        Ok(()) => Ok(true),
        Err(violation) => {
            tracing::error!(bus = %bus, topic = %topic, "Invalid topic: {violation}");
            match strictness {
                Strictness::Lenient => Ok(false),
                Strictness::Strict => Err(BusError::invalid_topic(bus, topic)),
            }
        }
    }
}

/// Returns `true` if a listener registered on `pattern` should receive an
/// event emitted on `topic`.
///
/// A pattern ending in `*` matches every topic that starts with the
/// pattern minus its trailing `*`; any other pattern must match exactly.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

/// Returns `true` if `topic` stays inside the local execution context.
pub fn is_local_topic(topic: &str) -> bool {
    topic.starts_with(SELF_PREFIX)
}
