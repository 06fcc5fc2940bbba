//! Per-context bus registry.
//!
//! Every execution context owns exactly one bus. Components that need
//! "the" bus of their context look it up here instead of reaching for a
//! global, so tests can build isolated registries.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::bus::EventBus;
use crate::config::BusConfig;

/// Maps an execution context key to its single [`EventBus`].
#[derive(Debug, Default)]
pub struct BusRegistry {
    buses: Mutex<HashMap<String, EventBus>>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bus of `context`, creating it with `name` on first use.
    ///
    /// The name is only used when the bus is created.
    pub fn get_or_create(&self, context: &str, name: &str) -> EventBus {
        self.get_or_create_with(context, || BusConfig::named(name))
    }

    /// Like [`get_or_create`](Self::get_or_create) with a full config.
    pub fn get_or_create_with(&self, context: &str, config: impl FnOnce() -> BusConfig) -> EventBus {
        let mut buses = self.buses.lock().unwrap_or_else(PoisonError::into_inner);
        buses
            .entry(context.to_string())
            .or_insert_with(|| {
                let bus = EventBus::new(config());
                tracing::debug!(context = %context, bus = %bus.name(), "created event bus");
                bus
            })
            .clone()
    }

    pub fn get(&self, context: &str) -> Option<EventBus> {
        self.buses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context)
            .cloned()
    }

    /// Drop the registry's handle to a context's bus.
    pub fn remove(&self, context: &str) -> Option<EventBus> {
        self.buses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(context)
    }

    pub fn len(&self) -> usize {
        self.buses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_same_context_shares_bus() {
        let registry = BusRegistry::new();
        let a = registry.get_or_create("window", "PluginBus");
        let b = registry.get_or_create("window", "Ignored");
        assert_eq!(b.name(), "PluginBus");

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        a.on("a.b.triggerC", move |_: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        b.emit("x", "a.b.triggerC", None, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let registry = BusRegistry::new();
        let window = registry.get_or_create("window", "WindowBus");
        let worker = registry.get_or_create("worker", "WorkerBus");
        window.on("a.b.triggerC", |_: &Event| {}).unwrap();

        assert_eq!(window.listener_count("a.b.triggerC"), 1);
        assert_eq!(worker.listener_count("a.b.triggerC"), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_and_remove() {
        let registry = BusRegistry::new();
        assert!(registry.get("window").is_none());
        registry.get_or_create("window", "WindowBus");
        assert!(registry.get("window").is_some());
        assert!(registry.remove("window").is_some());
        assert!(registry.is_empty());
    }
}
