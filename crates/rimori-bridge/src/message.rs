//! Wire messages exchanged with the host.
//!
//! Two channels carry traffic:
//! - the parent channel (window `postMessage` / worker `self.postMessage`)
//!   carries the `hello` / `init` / `acknowledged` handshake;
//! - the dedicated port established by `init` carries bus events,
//!   responses and error responses.

use std::collections::HashMap;

use rimori_bus::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

// ─── Handshake messages ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum HostMessage {
    /// Plugin → host, sent when the bridge is constructed.
    Hello { plugin_id: String },
    /// Host → plugin, accompanied by the dedicated port.
    Init {
        plugin_id: String,
        #[serde(default)]
        query_params: HashMap<String, String>,
        /// Connection context, parsed by the bridge on acceptance.
        #[serde(default)]
        rimori_info: Option<Value>,
    },
    /// Plugin → host, sent once the plugin finished initialising.
    Acknowledged { plugin_id: String },
}

impl HostMessage {
    pub fn decode(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn encode(&self) -> Result<Value, BridgeError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Hello { plugin_id }
            | Self::Init { plugin_id, .. }
            | Self::Acknowledged { plugin_id } => plugin_id,
        }
    }
}

// ─── Port messages ──────────────────────────────────────────────────────

/// `response.topic` / `response.data` of a response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub topic: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum TypedPortMessage {
    Response { event_id: u64, response: ResponseBody },
    Error { event_id: u64, error: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EventEnvelope {
    event: Event,
}

/// A message on the dedicated port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortMessage {
    /// `{event}`: ordinary bus traffic.
    Event(Event),
    /// `{type: "response", eventId, response: {topic, data}}`
    Response { event_id: u64, topic: String, data: Value },
    /// `{type: "error", eventId, error}`
    Error { event_id: u64, error: Value },
}

impl PortMessage {
    pub fn decode(value: &Value) -> Result<Self, BridgeError> {
        if value.get("type").is_some() {
            let typed: TypedPortMessage = serde_json::from_value(value.clone())?;
            return Ok(match typed {
                TypedPortMessage::Response { event_id, response } => Self::Response {
                    event_id,
                    topic: response.topic,
                    data: response.data,
                },
                TypedPortMessage::Error { event_id, error } => Self::Error { event_id, error },
            });
        }
        if value.get("event").is_some() {
            let envelope: EventEnvelope = serde_json::from_value(value.clone())?;
            return Ok(Self::Event(envelope.event));
        }
        Err(BridgeError::Transport(format!(
            "unrecognised port message: {value}"
        )))
    }

    pub fn encode(&self) -> Result<Value, BridgeError> {
        let value = match self {
            Self::Event(event) => serde_json::to_value(EventEnvelope {
                event: event.clone(),
            })?,
            Self::Response {
                event_id,
                topic,
                data,
            } => serde_json::to_value(TypedPortMessage::Response {
                event_id: *event_id,
                response: ResponseBody {
                    topic: topic.clone(),
                    data: data.clone(),
                },
            })?,
            Self::Error { event_id, error } => serde_json::to_value(TypedPortMessage::Error {
                event_id: *event_id,
                error: error.clone(),
            })?,
        };
        Ok(value)
    }
}
