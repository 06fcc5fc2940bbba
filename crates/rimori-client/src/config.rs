//! Client configuration.

use rimori_bridge::BridgeConfig;
use rimori_bus::BusConfig;

/// Edge function that answers AI text requests by default.
pub const DEFAULT_AI_FUNCTION: &str = "llm";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub bus: BusConfig,
    pub bridge: BridgeConfig,
    /// Edge function called by the AI module (default: "llm").
    pub ai_function: String,
}

impl ClientConfig {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            bus: BusConfig::default(),
            bridge: BridgeConfig::new(plugin_id),
            ai_function: DEFAULT_AI_FUNCTION.to_string(),
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            bus: BusConfig::from_env(),
            bridge: BridgeConfig::from_env(),
            ai_function: std::env::var("RIMORI_AI_FUNCTION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AI_FUNCTION.to_string()),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.bridge.plugin_id
    }
}
