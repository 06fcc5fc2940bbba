//! Plugin module: identity and host-provided context.

use std::collections::HashMap;

use rimori_bridge::{Bridge, Guild, PluginInfo, RimoriInfo, UpdateHandle, UserProfile};

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct PluginModule {
    bridge: Bridge,
}

impl PluginModule {
    pub(crate) fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn plugin_id(&self) -> &str {
        self.bridge.plugin_id()
    }

    /// Query parameter the host passed in `init`.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.bridge.query_param(key)
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        self.bridge.query_params()
    }

    pub async fn info(&self) -> Result<RimoriInfo, ClientError> {
        Ok(self.bridge.connection().await?)
    }

    pub async fn installed_plugins(&self) -> Result<Vec<PluginInfo>, ClientError> {
        Ok(self.info().await?.installed_plugins)
    }

    pub async fn user_profile(&self) -> Result<UserProfile, ClientError> {
        Ok(self.info().await?.profile)
    }

    pub async fn guild(&self) -> Result<Guild, ClientError> {
        Ok(self.info().await?.guild)
    }

    pub async fn interface_language(&self) -> Result<String, ClientError> {
        Ok(self.info().await?.interface_language)
    }

    /// Called with the new context whenever the host pushes a change.
    pub fn on_update<F>(&self, callback: F) -> UpdateHandle
    where
        F: Fn(&RimoriInfo) + Send + Sync + 'static,
    {
        self.bridge.on_update(callback)
    }
}
