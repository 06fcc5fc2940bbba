//! Worker adapter: the parent is the page that spawned the worker.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::channel::{HostEndpoint, Inbox};
use super::{HostHandler, HostTransport, InboundMessage, TransportKind};
use crate::error::BridgeError;

/// Parent channel of a plugin running in a background worker.
///
/// Mirrors `self.onmessage`: installing a handler replaces the previous one.
pub struct WorkerTransport {
    to_host: mpsc::UnboundedSender<Value>,
    inbox: Inbox<InboundMessage>,
}

impl WorkerTransport {
    /// Create the worker side together with the host's endpoint.
    pub fn connect() -> (Arc<WorkerTransport>, HostEndpoint) {
        let (to_host, from_plugin) = mpsc::unbounded_channel();
        let (to_plugin, inbound) = mpsc::unbounded_channel();
        let transport = Arc::new(WorkerTransport {
            to_host,
            inbox: Inbox::new(inbound),
        });
        (transport, HostEndpoint::new(to_plugin, from_plugin))
    }
}

impl HostTransport for WorkerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Worker
    }

    fn post_to_host(&self, message: Value) -> Result<(), BridgeError> {
        self.to_host
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed)
    }

    fn on_host_message(&self, handler: HostHandler) -> Result<(), BridgeError> {
        self.inbox.replace(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_latest_handler_wins() {
        let (transport, host) = WorkerTransport::connect();
        assert_eq!(transport.kind(), TransportKind::Worker);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&first);
        transport
            .on_host_message(Arc::new(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        let s = Arc::clone(&second);
        transport
            .on_host_message(Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        host.post(json!({"topic": "pl001.x.triggerY"}), Vec::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_after_host_dropped_fails() {
        let (transport, host) = WorkerTransport::connect();
        drop(host);
        assert!(transport.post_to_host(json!({})).is_err());
    }
}
