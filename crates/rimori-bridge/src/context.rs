//! Connection context handed to a plugin by the host.
//!
//! `RimoriInfo` bundles everything a plugin needs to reach backing
//! services: the data-service URL and key, a bearer token with its
//! expiration, and descriptive data about the user, guild and the other
//! installed plugins. Field names follow the host's camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tenant the current user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guild {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Guild-level settings the SDK does not interpret.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Public profile of the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mother_tongue: Option<String>,
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Another plugin installed next to this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RimoriInfo {
    /// Base URL of the backing data service.
    pub url: String,
    /// Public API key of the backing data service.
    pub key: String,
    /// Bearer token for the current user.
    pub token: String,
    pub expiration: DateTime<Utc>,
    pub plugin_id: String,
    /// Prefix of the plugin's own tables; defaults to the plugin id.
    #[serde(default)]
    pub table_prefix: Option<String>,
    #[serde(default)]
    pub guild: Guild,
    #[serde(default)]
    pub installed_plugins: Vec<PluginInfo>,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default = "default_language")]
    pub interface_language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl RimoriInfo {
    /// Parse a context received over the bus or the transport.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// A context whose expiration is not in the future is stale.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Prefix used for the plugin's tables.
    pub fn table_prefix(&self) -> &str {
        self.table_prefix.as_deref().unwrap_or(&self.plugin_id)
    }

    pub fn installed_plugin(&self, id: &str) -> Option<&PluginInfo> {
        self.installed_plugins.iter().find(|p| p.id == id)
    }
}
