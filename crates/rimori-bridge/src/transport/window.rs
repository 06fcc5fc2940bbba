//! Iframe adapter: the parent is the embedding window.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::channel::{HostEndpoint, Inbox};
use super::{HostHandler, HostTransport, InboundMessage, TransportKind};
use crate::error::BridgeError;

/// Parent channel of a plugin running in an iframe.
///
/// Like `window.addEventListener("message", ..)`, every registered
/// handler sees every message.
pub struct WindowTransport {
    to_host: mpsc::UnboundedSender<Value>,
    inbox: Inbox<InboundMessage>,
}

impl WindowTransport {
    /// Create the plugin side together with the host's endpoint.
    pub fn connect() -> (Arc<WindowTransport>, HostEndpoint) {
        let (to_host, from_plugin) = mpsc::unbounded_channel();
        let (to_plugin, inbound) = mpsc::unbounded_channel();
        let transport = Arc::new(WindowTransport {
            to_host,
            inbox: Inbox::new(inbound),
        });
        (transport, HostEndpoint::new(to_plugin, from_plugin))
    }
}

impl HostTransport for WindowTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Window
    }

    fn post_to_host(&self, message: Value) -> Result<(), BridgeError> {
        self.to_host
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed)
    }

    fn on_host_message(&self, handler: HostHandler) -> Result<(), BridgeError> {
        self.inbox.add(handler)
    }
}
