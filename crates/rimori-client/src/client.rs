//! `RimoriClient`: the facade a plugin talks to.

use std::sync::Arc;

use rimori_bridge::{Bridge, HostTransport, INIT_FINISHED_TOPIC};
use rimori_bus::{BusRegistry, EventBus};
use tracing::info;

use crate::ai::AiModule;
use crate::config::ClientConfig;
use crate::db::DbModule;
use crate::error::ClientError;
use crate::event::EventModule;
use crate::plugin::PluginModule;

/// Entry point of the SDK, scoped to one plugin identity.
///
/// Cloning is cheap; clones share the bridge and bus.
#[derive(Debug, Clone)]
pub struct RimoriClient {
    bridge: Bridge,
    event: EventModule,
    plugin: PluginModule,
    db: DbModule,
    ai: AiModule,
}

impl RimoriClient {
    /// Create a client with its own bus, handshaking over `transport`.
    pub fn new(
        config: ClientConfig,
        transport: Option<Arc<dyn HostTransport>>,
    ) -> Result<Self, ClientError> {
        let bus = EventBus::new(config.bus.clone());
        Self::with_bus(config, bus, transport)
    }

    /// Create a client on the bus of `context` in `registry`.
    pub fn in_context(
        registry: &BusRegistry,
        context: &str,
        config: ClientConfig,
        transport: Option<Arc<dyn HostTransport>>,
    ) -> Result<Self, ClientError> {
        let bus_config = config.bus.clone();
        let bus = registry.get_or_create_with(context, || bus_config);
        Self::with_bus(config, bus, transport)
    }

    /// Client without a host channel; the context is requested over the bus.
    pub fn standalone(config: ClientConfig, bus: EventBus) -> Result<Self, ClientError> {
        let mut config = config;
        config.bridge.standalone = true;
        Self::with_bus(config, bus, None)
    }

    fn with_bus(
        config: ClientConfig,
        bus: EventBus,
        transport: Option<Arc<dyn HostTransport>>,
    ) -> Result<Self, ClientError> {
        let request_timeout = config.bridge.request_timeout;
        let bridge = Bridge::new(config.bridge, bus.clone(), transport)?;
        let plugin_id = bridge.plugin_id().to_string();
        info!(plugin = %plugin_id, bus = %bus.name(), "rimori client created");

        Ok(Self {
            event: EventModule::new(bus, plugin_id, request_timeout),
            plugin: PluginModule::new(bridge.clone()),
            db: DbModule::new(bridge.clone()),
            ai: AiModule::new(bridge.clone(), config.ai_function),
            bridge,
        })
    }

    pub fn event(&self) -> &EventModule {
        &self.event
    }

    pub fn plugin(&self) -> &PluginModule {
        &self.plugin
    }

    pub fn db(&self) -> &DbModule {
        &self.db
    }

    pub fn ai(&self) -> &AiModule {
        &self.ai
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn bus(&self) -> &EventBus {
        self.bridge.bus()
    }

    /// Tell the host the plugin finished initialising.
    pub fn init_finished(&self) {
        self.bus()
            .emit(self.bridge.plugin_id(), INIT_FINISHED_TOPIC, None, None);
    }
}
