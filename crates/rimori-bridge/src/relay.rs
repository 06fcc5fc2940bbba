//! Worker relay: wires a worker's bus directly to its parent channel.
//!
//! Used when a worker has no dedicated port. Every non-local event on the
//! worker bus is posted to the host as `{event}`, and raw messages from
//! the host (`{topic, eventId, data, sender}` or `{event}`) are re-emitted
//! on the bus. Outbound events carry the sender prefixed with
//! [`WORKER_SENDER_PREFIX`].
//!
//! An inbound message whose event ID belongs to a pending request only
//! reaches the bus when its topic is the request's topic.

use std::sync::Arc;

use rimori_bus::{
    is_local_topic, payload_or_empty, DedupWindow, Event, EventBus, Subscription, GLOBAL_SENDER,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::BridgeError;
use crate::message::PortMessage;
use crate::transport::{HostTransport, InboundMessage};

/// Prepended to the sender of every event posted to the host.
pub const WORKER_SENDER_PREFIX: &str = "worker.";

/// Message shape the host uses when answering a worker directly.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkerMessage {
    topic: String,
    event_id: u64,
    #[serde(default)]
    data: Value,
    #[serde(default = "global_sender")]
    sender: String,
}

fn global_sender() -> String {
    GLOBAL_SENDER.to_string()
}

/// Installed relay; [`WorkerRelay::uninstall`] stops forwarding.
pub struct WorkerRelay {
    forwarder: Subscription,
    transport: Arc<dyn HostTransport>,
}

impl std::fmt::Debug for WorkerRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRelay")
            .field("forwarder", &self.forwarder)
            .field("kind", &self.transport.kind())
            .finish()
    }
}

impl WorkerRelay {
    pub fn install(bus: &EventBus, transport: Arc<dyn HostTransport>) -> Result<Self, BridgeError> {
        // Events that came from the host must not be posted back to it.
        let inbound = Arc::new(DedupWindow::default());

        let outbound = Arc::clone(&transport);
        let seen = Arc::clone(&inbound);
        let forwarder = bus.on("*", move |event: &Event| {
            if is_local_topic(&event.topic) {
                return;
            }
            if !seen.insert(event.event_id, &event.sender) {
                trace!(topic = %event.topic, "not relaying event received from host");
                return;
            }
            let mut outgoing = event.clone();
            if !outgoing.sender.starts_with(WORKER_SENDER_PREFIX) {
                outgoing.sender = format!("{WORKER_SENDER_PREFIX}{}", event.sender);
            }
            let sent = PortMessage::Event(outgoing)
                .encode()
                .and_then(|message| outbound.post_to_host(message));
            if let Err(e) = sent {
                warn!(topic = %event.topic, "failed to relay event to host: {e}");
            }
        })?;

        let target = bus.clone();
        transport.on_host_message(Arc::new(move |message: InboundMessage| {
            let Some(event) = decode_inbound(message.data) else {
                return;
            };
            if let Some(expected) = target.pending_topic(event.event_id) {
                if expected != event.topic {
                    warn!(
                        event_id = event.event_id,
                        topic = %event.topic,
                        expected = %expected,
                        "dropping response whose topic does not match its request"
                    );
                    return;
                }
            }
            inbound.insert(event.event_id, &event.sender);
            target.emit_event(event);
        }))?;

        Ok(Self {
            forwarder,
            transport,
        })
    }

    /// Stop posting bus events to the host. The parent channel stays open.
    pub fn uninstall(&self) {
        self.forwarder.off();
    }

    pub fn transport(&self) -> &Arc<dyn HostTransport> {
        &self.transport
    }
}

fn decode_inbound(data: Value) -> Option<Event> {
    // Handshake traffic is not bus traffic.
    if data.get("type").is_some() {
        return None;
    }
    if data.get("event").is_some() {
        return match PortMessage::decode(&data) {
            Ok(PortMessage::Event(event)) => Some(event),
            _ => None,
        };
    }
    match serde_json::from_value::<RawWorkerMessage>(data) {
        Ok(raw) => Some(Event::new(
            raw.sender,
            raw.topic,
            payload_or_empty(Some(raw.data)),
            raw.event_id,
            false,
        )),
        Err(e) => {
            trace!("ignoring non-bus worker message: {e}");
            None
        }
    }
}
