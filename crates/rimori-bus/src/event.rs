//! The event record that travels over the bus and across contexts.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Sender identity used for events produced by the host or on behalf of
/// every plugin.
pub const GLOBAL_SENDER: &str = "global";

/// A bus event.
///
/// Serialized in camelCase so the same JSON crosses the channel to the
/// host unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Creation time, RFC 3339 with millisecond precision.
    pub timestamp: String,
    pub event_id: u64,
    /// Plugin id or `"global"`. Events a worker relays to its host carry
    /// a `worker.` prefix.
    pub sender: String,
    pub topic: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Whether verbose tracing was active on the emitting bus.
    #[serde(default)]
    pub debug: bool,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        sender: impl Into<String>,
        topic: impl Into<String>,
        data: serde_json::Value,
        event_id: u64,
        debug: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_id,
            sender: sender.into(),
            topic: topic.into(),
            data,
            debug,
        }
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Normalize an optional payload: absent data becomes an empty object.
pub fn payload_or_empty(data: Option<serde_json::Value>) -> serde_json::Value {
    match data {
        Some(serde_json::Value::Null) | None => serde_json::Value::Object(Default::default()),
        Some(value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_creation() {
        let event = Event::new("pl001", "pl001.card.triggerCreate", json!({"id": 3}), 42, false);
        assert_eq!(event.sender, "pl001");
        assert_eq!(event.topic, "pl001.card.triggerCreate");
        assert_eq!(event.event_id, 42);
        assert_eq!(event.data["id"], 3);
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_event_wire_field_names() {
        let event = Event::new(GLOBAL_SENDER, "global.system.requestDebug", json!({}), 9, true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventId"], 9);
        assert_eq!(value["sender"], "global");
        assert_eq!(value["debug"], true);
        assert!(value.get("event_id").is_none());
    }

    #[test]
    fn test_event_deserialize_without_optional_fields() {
        let value = json!({
            "timestamp": "2026-01-01T00:00:00.000Z",
            "eventId": 11,
            "sender": "host",
            "topic": "pl001.card.requestNew"
        });
        let event: Event = serde_json::from_value(value).unwrap();
        assert!(event.data.is_null());
        assert!(!event.debug);
    }

    #[test]
    fn test_data_as() {
        #[derive(Deserialize)]
        struct Access {
            token: String,
        }
        let event = Event::new("host", "global.supabase.requestAccess", json!({"token": "abc"}), 1, false);
        let access: Access = event.data_as().unwrap();
        assert_eq!(access.token, "abc");
    }

    #[test]
    fn test_payload_or_empty() {
        assert_eq!(payload_or_empty(None), json!({}));
        assert_eq!(payload_or_empty(Some(serde_json::Value::Null)), json!({}));
        assert_eq!(payload_or_empty(Some(json!([1, 2]))), json!([1, 2]));
    }
}
