//! Rimori bridge
//!
//! Extends a plugin's event bus across the iframe/worker boundary to the
//! Rimori host. The bridge performs the `hello` / `init` / `acknowledged`
//! handshake over an abstract parent transport, relays bus traffic over
//! the dedicated port it receives, and owns the connection context
//! (`RimoriInfo`) together with the data-service client built from it.

pub mod bridge;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod message;
pub mod relay;
pub mod transport;

pub use bridge::{Bridge, BridgePhase, UpdateCallback, UpdateHandle, INIT_FINISHED_TOPIC};
pub use config::BridgeConfig;
pub use context::{Guild, PluginInfo, RimoriInfo, UserProfile};
pub use data::DataClient;
pub use error::BridgeError;
pub use message::{HostMessage, PortMessage};
pub use relay::{WorkerRelay, WORKER_SENDER_PREFIX};
pub use transport::{
    ChannelPort, HostEndpoint, HostTransport, InboundMessage, MessagePort, TransportKind,
    WindowTransport, WorkerTransport,
};
