//! Rimori client
//!
//! Typed facade over the event bus and the host bridge for one plugin:
//! topic scoping, request helpers, and modules for the plugin's context,
//! its database tables and AI text generation.

pub mod ai;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod logging;
pub mod plugin;

pub use ai::{AiModule, Message, Role};
pub use client::RimoriClient;
pub use config::ClientConfig;
pub use db::DbModule;
pub use error::ClientError;
pub use event::{normalize_topic, AccomplishmentKind, EventModule};
pub use logging::{init_tracing, BusLogBuffer, BusLogEntry, BusLogLayer, BUS_LOG_BUFFER};
pub use plugin::PluginModule;

pub use rimori_bridge::{
    Bridge, BridgeConfig, HostTransport, RimoriInfo, WindowTransport, WorkerTransport,
};
pub use rimori_bus::{BusConfig, BusRegistry, Event, EventBus, Responder, Subscription};
