//! Event module: bus operations scoped to the owning plugin.
//!
//! Relative topics are qualified with the plugin id before they reach the
//! bus: `"card.triggerFlip"` becomes `"pl001.card.triggerFlip"`. Topics
//! starting with `global.` or `self.` pass through unchanged.

use std::time::Duration;

use rimori_bus::{Event, EventBus, IntoTopics, Responder, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

const GLOBAL_SCOPE: &str = "global";
const SELF_SCOPE: &str = "self";

/// Qualify `topic` for `plugin_id`.
///
/// Rejects topics with more than three segments, and three-segment topics
/// whose scope is neither the plugin itself, `global` nor `self`.
pub fn normalize_topic(plugin_id: &str, topic: &str) -> Result<String, ClientError> {
    let segments: Vec<&str> = topic.split('.').collect();
    if segments.len() > 3 {
        return Err(ClientError::InvalidTopic(format!(
            "{topic} has more than three segments"
        )));
    }

    match segments[0] {
        GLOBAL_SCOPE | SELF_SCOPE if segments.len() > 1 => Ok(topic.to_string()),
        scope if segments.len() == 3 => {
            if scope == plugin_id {
                Ok(topic.to_string())
            } else {
                Err(ClientError::InvalidTopic(format!(
                    "{topic} must start with {plugin_id} or {GLOBAL_SCOPE}"
                )))
            }
        }
        _ => Ok(format!("{plugin_id}.{topic}")),
    }
}

// ─── Accomplishments ────────────────────────────────────────────────────

pub const MICRO_ACCOMPLISHMENT_TOPIC: &str = "global.accomplishment.triggerMicro";
pub const MACRO_ACCOMPLISHMENT_TOPIC: &str = "global.accomplishment.triggerMacro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccomplishmentKind {
    /// Small step, e.g. one exercise answered.
    Micro,
    /// Milestone, e.g. a lesson finished.
    Macro,
}

impl AccomplishmentKind {
    pub fn topic(self) -> &'static str {
        match self {
            Self::Micro => MICRO_ACCOMPLISHMENT_TOPIC,
            Self::Macro => MACRO_ACCOMPLISHMENT_TOPIC,
        }
    }

    fn from_topic(topic: &str) -> Option<Self> {
        match topic {
            MICRO_ACCOMPLISHMENT_TOPIC => Some(Self::Micro),
            MACRO_ACCOMPLISHMENT_TOPIC => Some(Self::Macro),
            _ => None,
        }
    }
}

fn check_accomplishment(payload: &Value) -> Result<(), ClientError> {
    match payload.get("type").and_then(Value::as_str) {
        Some(kind) if !kind.trim().is_empty() => Ok(()),
        _ => Err(ClientError::InvalidPayload(
            "accomplishment needs a non-empty \"type\"".into(),
        )),
    }
}

// ─── Module ─────────────────────────────────────────────────────────────

/// Bus access on behalf of one plugin.
#[derive(Debug, Clone)]
pub struct EventModule {
    bus: EventBus,
    plugin_id: String,
    request_timeout: Option<Duration>,
}

impl EventModule {
    pub(crate) fn new(bus: EventBus, plugin_id: String, request_timeout: Option<Duration>) -> Self {
        Self {
            bus,
            plugin_id,
            request_timeout,
        }
    }

    /// Publish on `topic` as this plugin.
    pub fn emit(&self, topic: &str, data: Option<Value>) -> Result<(), ClientError> {
        let topic = normalize_topic(&self.plugin_id, topic)?;
        self.bus.emit(&self.plugin_id, &topic, data, None);
        Ok(())
    }

    /// Send a request and wait for the response payload's event.
    pub async fn request(&self, topic: &str, data: Option<Value>) -> Result<Event, ClientError> {
        let topic = normalize_topic(&self.plugin_id, topic)?;
        let event = self
            .bus
            .request_with_timeout(&self.plugin_id, &topic, data, self.request_timeout)?
            .await?;
        Ok(event)
    }

    pub fn on<F>(&self, topics: impl IntoTopics, handler: F) -> Result<Subscription, ClientError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topics = self.normalize_all(topics)?;
        Ok(self.bus.on(topics, handler)?)
    }

    pub fn once<F>(&self, topic: &str, handler: F) -> Result<Subscription, ClientError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = normalize_topic(&self.plugin_id, topic)?;
        Ok(self.bus.once(&topic, handler)?)
    }

    /// Answer requests on `topics` as this plugin.
    pub fn respond(
        &self,
        topics: impl IntoTopics,
        responder: impl Into<Responder>,
    ) -> Result<Subscription, ClientError> {
        let topics = self.normalize_all(topics)?;
        Ok(self.bus.respond(&self.plugin_id, topics, responder)?)
    }

    /// Report learning progress to the host.
    ///
    /// `payload` must carry a non-empty `type` string.
    pub fn emit_accomplishment(
        &self,
        kind: AccomplishmentKind,
        payload: Value,
    ) -> Result<(), ClientError> {
        check_accomplishment(&payload)?;
        self.bus.emit(&self.plugin_id, kind.topic(), Some(payload), None);
        Ok(())
    }

    /// Listen to accomplishments from every plugin.
    pub fn on_accomplishment<F>(&self, handler: F) -> Result<Subscription, ClientError>
    where
        F: Fn(AccomplishmentKind, &Event) + Send + Sync + 'static,
    {
        let sub = self.bus.on(
            [MICRO_ACCOMPLISHMENT_TOPIC, MACRO_ACCOMPLISHMENT_TOPIC],
            move |event: &Event| {
                if let Some(kind) = AccomplishmentKind::from_topic(&event.topic) {
                    handler(kind, event);
                }
            },
        )?;
        Ok(sub)
    }

    fn normalize_all(&self, topics: impl IntoTopics) -> Result<Vec<String>, ClientError> {
        topics
            .into_topics()
            .iter()
            .map(|t| normalize_topic(&self.plugin_id, t))
            .collect()
    }
}
