// Shared test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rimori_bridge::{
    Bridge, BridgeConfig, ChannelPort, HostEndpoint, HostTransport, MessagePort, WindowTransport,
};
use rimori_bus::EventBus;
use serde_json::{json, Value};

pub const PLUGIN_ID: &str = "pl001";

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// A connection context as the host would send it.
pub fn context_json(token: &str) -> Value {
    context_json_expiring(token, "2099-01-01T00:00:00Z")
}

pub fn context_json_expiring(token: &str, expiration: &str) -> Value {
    json!({
        "url": "https://db.rimori.test",
        "key": "anon-key",
        "token": token,
        "expiration": expiration,
        "pluginId": PLUGIN_ID,
        "guild": {"id": "g1"},
        "installedPlugins": [],
        "profile": {"userId": "u1"},
        "interfaceLanguage": "en"
    })
}

/// Give spawned pump tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// The host side of a plugin context.
pub struct SimulatedHost {
    pub endpoint: HostEndpoint,
}

impl SimulatedHost {
    pub async fn next_message(&self) -> Value {
        tokio::time::timeout(WAIT, self.endpoint.recv())
            .await
            .expect("host waited too long for a message")
            .expect("plugin side closed")
    }

    pub async fn expect_hello(&self) -> Value {
        let hello = self.next_message().await;
        assert_eq!(hello["type"], "hello");
        hello
    }

    /// Send `init` with a fresh port and return the host's end of it.
    pub fn send_init(&self, plugin_id: &str, rimori_info: Option<Value>, query_params: Value) -> ChannelPort {
        let (host_port, plugin_port) = ChannelPort::pair();
        let mut init = json!({
            "type": "init",
            "pluginId": plugin_id,
            "queryParams": query_params,
        });
        if let Some(info) = rimori_info {
            init["rimoriInfo"] = info;
        }
        let ports: Vec<Arc<dyn MessagePort>> = vec![Arc::new(plugin_port)];
        self.endpoint.post(init, ports).expect("plugin side closed");
        host_port
    }
}

/// Next message the plugin posted on the dedicated port.
pub async fn recv_port(port: &ChannelPort) -> Value {
    tokio::time::timeout(WAIT, port.recv())
        .await
        .expect("host waited too long on the port")
        .expect("port closed")
}

/// A bridge in an iframe context wired to a simulated host.
pub fn window_bridge() -> (Bridge, EventBus, SimulatedHost) {
    let bus = EventBus::named("PluginBus");
    let (transport, endpoint) = WindowTransport::connect();
    let transport: Arc<dyn HostTransport> = transport;
    let bridge = Bridge::new(BridgeConfig::new(PLUGIN_ID), bus.clone(), Some(transport))
        .expect("bridge construction");
    (bridge, bus, SimulatedHost { endpoint })
}
