//! In-process channel primitives backing the transport adapters.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use super::{InboundMessage, MessagePort, PortHandler};
use crate::error::BridgeError;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Receiving side shared by ports and transports.
///
/// Messages queue in an unbounded channel until the first callback is
/// installed; a pump task then delivers them in order to every callback.
pub(crate) struct Inbox<T> {
    rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
    callbacks: Arc<RwLock<Vec<Callback<T>>>>,
}

impl<T: Clone + Send + 'static> Inbox<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            rx: Mutex::new(Some(rx)),
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a callback next to the existing ones.
    pub(crate) fn add(&self, callback: Callback<T>) -> Result<(), BridgeError> {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
        self.start()
    }

    /// Replace every callback with `callback`.
    pub(crate) fn replace(&self, callback: Callback<T>) -> Result<(), BridgeError> {
        *self.callbacks.write().unwrap_or_else(PoisonError::into_inner) = vec![callback];
        self.start()
    }

    /// Pull the next message directly. Returns `None` once a pump owns
    /// the channel or every sender is gone.
    pub(crate) async fn recv(&self) -> Option<T> {
        let mut guard = self.rx.lock().await;
        guard.as_mut()?.recv().await
    }

    fn start(&self) -> Result<(), BridgeError> {
        let mut guard = self
            .rx
            .try_lock()
            .map_err(|_| BridgeError::Transport("inbox is being read directly".into()))?;
        if guard.is_none() {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Transport(format!("no tokio runtime: {e}")))?;
        let Some(mut rx) = guard.take() else {
            return Ok(());
        };

        let callbacks = Arc::clone(&self.callbacks);
        handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                let snapshot = callbacks
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for callback in snapshot {
                    callback(message.clone());
                }
            }
            tracing::trace!("inbox closed");
        });
        Ok(())
    }
}

// ─── Ports ──────────────────────────────────────────────────────────────

/// One end of an in-process message channel.
pub struct ChannelPort {
    peer: mpsc::UnboundedSender<Value>,
    inbox: Inbox<Value>,
}

impl ChannelPort {
    /// Create two entangled ports; what one posts the other receives.
    pub fn pair() -> (ChannelPort, ChannelPort) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ChannelPort {
                peer: b_tx,
                inbox: Inbox::new(a_rx),
            },
            ChannelPort {
                peer: a_tx,
                inbox: Inbox::new(b_rx),
            },
        )
    }

    /// Await the next message when no callback is installed.
    pub async fn recv(&self) -> Option<Value> {
        self.inbox.recv().await
    }
}

impl std::fmt::Debug for ChannelPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPort")
            .field("closed", &self.peer.is_closed())
            .finish()
    }
}

impl MessagePort for ChannelPort {
    fn post_message(&self, message: Value) -> Result<(), BridgeError> {
        self.peer
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed)
    }

    fn set_on_message(&self, handler: PortHandler) -> Result<(), BridgeError> {
        self.inbox.replace(handler)
    }
}

// ─── Host side ──────────────────────────────────────────────────────────

/// The host's end of a parent channel.
///
/// Embedders and tests use it to read what the plugin posts and to post
/// messages (with transferred ports) back into the plugin context.
pub struct HostEndpoint {
    to_plugin: mpsc::UnboundedSender<InboundMessage>,
    from_plugin: Inbox<Value>,
}

impl HostEndpoint {
    pub(crate) fn new(
        to_plugin: mpsc::UnboundedSender<InboundMessage>,
        from_plugin: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self {
            to_plugin,
            from_plugin: Inbox::new(from_plugin),
        }
    }

    /// Post a message into the plugin context.
    pub fn post(&self, data: Value, ports: Vec<Arc<dyn MessagePort>>) -> Result<(), BridgeError> {
        self.to_plugin
            .send(InboundMessage { data, ports })
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Await the next message the plugin posted to its parent.
    pub async fn recv(&self) -> Option<Value> {
        self.from_plugin.recv().await
    }
}

impl std::fmt::Debug for HostEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEndpoint")
            .field("closed", &self.to_plugin.is_closed())
            .finish()
    }
}
