//! Transport abstraction between a plugin context and its host.
//!
//! The bridge never touches a concrete messaging API. It talks to a
//! [`HostTransport`] (the parent channel used for the handshake) and to
//! the [`MessagePort`] the host hands over in `init`. Two adapters cover
//! the two kinds of plugin context: [`WindowTransport`] for iframes and
//! [`WorkerTransport`] for background workers.

mod channel;
mod window;
mod worker;

use std::sync::Arc;

use serde_json::Value;

use crate::error::BridgeError;

pub use channel::{ChannelPort, HostEndpoint};
pub use window::WindowTransport;
pub use worker::WorkerTransport;

/// Callback receiving messages from the parent channel.
pub type HostHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Callback receiving messages from a port.
pub type PortHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A message from the parent context, with any ports transferred alongside.
#[derive(Clone)]
pub struct InboundMessage {
    pub data: Value,
    pub ports: Vec<Arc<dyn MessagePort>>,
}

impl InboundMessage {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ports: Vec::new(),
        }
    }
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("data", &self.data)
            .field("ports", &self.ports.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Window,
    Worker,
}

/// One endpoint of a dedicated message channel.
pub trait MessagePort: Send + Sync {
    fn post_message(&self, message: Value) -> Result<(), BridgeError>;

    /// Install the receiving callback, replacing any previous one.
    /// Messages posted before this call are delivered once it is made.
    fn set_on_message(&self, handler: PortHandler) -> Result<(), BridgeError>;
}

/// The parent channel of a plugin context.
pub trait HostTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn post_to_host(&self, message: Value) -> Result<(), BridgeError>;

    fn on_host_message(&self, handler: HostHandler) -> Result<(), BridgeError>;
}
