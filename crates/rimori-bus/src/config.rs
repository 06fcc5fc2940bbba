//! Event bus configuration.

use std::time::Duration;

use crate::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::id::{DEFAULT_ID_WINDOW, DEFAULT_SWEEP_INTERVAL};

/// Default bus name, used as the prefix of invalid-topic errors.
pub const DEFAULT_BUS_NAME: &str = "EventBus";

/// Configuration for an [`EventBus`](crate::EventBus).
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Name shown in log records and error messages.
    pub name: String,
    /// Deliveries remembered per listener (default: 100).
    pub dedup_capacity: usize,
    /// How long an issued event ID stays reserved (default: 60s).
    pub id_window: Duration,
    /// How often expired IDs are swept (default: 10s).
    pub id_sweep_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BUS_NAME.to_string(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            id_window: DEFAULT_ID_WINDOW,
            id_sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl BusConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            name: std::env::var("RIMORI_BUS_NAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BUS_NAME.to_string()),
            dedup_capacity: std::env::var("RIMORI_BUS_DEDUP_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DEDUP_CAPACITY),
            id_window: std::env::var("RIMORI_ID_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ID_WINDOW),
            id_sweep_interval: std::env::var("RIMORI_ID_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Default configuration with a custom bus name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
