//! Bridge configuration.

use std::time::Duration;

/// Resource whose access the fallback path requests by default.
pub const DEFAULT_ACCESS_RESOURCE: &str = "supabase";

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Plugin id this bridge speaks for.
    pub plugin_id: String,
    /// Skip the handshake and go straight to the fallback path (default: false).
    pub standalone: bool,
    /// Resource named in `global.<resource>.requestAccess` and
    /// `<pluginId>.<resource>.triggerUpdate` (default: "supabase").
    pub access_resource: String,
    /// Bound on fallback access requests. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            plugin_id: String::new(),
            standalone: false,
            access_resource: DEFAULT_ACCESS_RESOURCE.to_string(),
            request_timeout: None,
        }
    }
}

impl BridgeConfig {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ..Self::default()
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            plugin_id: std::env::var("RIMORI_PLUGIN_ID").unwrap_or_default(),
            standalone: std::env::var("RIMORI_STANDALONE")
                .unwrap_or_default()
                .eq_ignore_ascii_case("true"),
            access_resource: std::env::var("RIMORI_ACCESS_RESOURCE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ACCESS_RESOURCE.to_string()),
            request_timeout: std::env::var("RIMORI_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        }
    }

    pub fn standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// `global.<resource>.requestAccess`
    pub fn access_topic(&self) -> String {
        format!("global.{}.requestAccess", self.access_resource)
    }

    /// `<pluginId>.<resource>.triggerUpdate`
    pub fn update_topic(&self) -> String {
        format!("{}.{}.triggerUpdate", self.plugin_id, self.access_resource)
    }
}
