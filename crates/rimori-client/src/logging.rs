//! Tracing setup and bus log capture.
//!
//! `init_tracing` installs the subscriber a plugin process uses. Besides
//! the usual `fmt` output it adds [`BusLogLayer`], a ring buffer of the
//! records emitted by the `rimori_*` crates, so a plugin can show its own
//! bus trace (for example after `global.system.requestDebug`).

use std::collections::VecDeque;
use std::sync::{LazyLock, Mutex, PoisonError};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Default ring buffer capacity (how many log entries to keep).
const DEFAULT_CAPACITY: usize = 500;

/// Global bus log buffer, shared by the layer and readers.
pub static BUS_LOG_BUFFER: LazyLock<BusLogBuffer> =
    LazyLock::new(|| BusLogBuffer::new(DEFAULT_CAPACITY));

/// Install the global subscriber: `fmt` output filtered by `RUST_LOG`, plus
/// the bus log capture. Returns `false` if a subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(BusLogLayer::new())
        .try_init()
        .is_ok()
}

/// A single captured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct BusLogEntry {
    /// ISO-8601 timestamp
    pub timestamp: String,
    /// "DEBUG", "INFO", "WARN" or "ERROR"
    pub level: String,
    /// Module path, e.g. "rimori_bus::bus"
    pub target: String,
    pub message: String,
    /// Structured fields as key=value pairs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

pub struct BusLogBuffer {
    entries: Mutex<VecDeque<BusLogEntry>>,
    capacity: usize,
}

impl BusLogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push a new entry, evicting the oldest if at capacity.
    pub fn push(&self, entry: BusLogEntry) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first, optionally filtered by level and limited to
    /// the most recent `limit`.
    pub fn entries(&self, level_filter: Option<&str>, limit: Option<usize>) -> Vec<BusLogEntry> {
        let entries = self.lock();
        let matching = entries
            .iter()
            .filter(|e| level_filter.is_none_or(|lvl| e.level.eq_ignore_ascii_case(lvl)));
        match limit {
            Some(n) => {
                let mut recent: Vec<_> = matching.rev().take(n).cloned().collect();
                recent.reverse();
                recent
            }
            None => matching.cloned().collect(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<BusLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct FieldCollector {
    message: String,
    fields: Vec<String>,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push(format!("{}={}", field.name(), value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push(format!("{}={}", field.name(), value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push(format!("{}={}", field.name(), value));
    }
}

/// Tracing layer that captures records from the SDK crates.
pub struct BusLogLayer {
    buffer: &'static BusLogBuffer,
}

impl BusLogLayer {
    /// Layer backed by the global [`BUS_LOG_BUFFER`].
    pub fn new() -> Self {
        Self {
            buffer: &BUS_LOG_BUFFER,
        }
    }
}

impl Default for BusLogLayer {
    fn default() -> Self {
        Self::new()
    }
}

const CAPTURED_TARGETS: &[&str] = &["rimori_bus", "rimori_bridge", "rimori_client"];

fn should_capture(target: &str) -> bool {
    CAPTURED_TARGETS
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

impl<S> Layer<S> for BusLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if !should_capture(target) {
            return;
        }
        // Per-event records sit at TRACE until debug is requested.
        if *metadata.level() == Level::TRACE {
            return;
        }

        let mut collector = FieldCollector {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut collector);

        self.buffer.push(BusLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: metadata.level().to_string(),
            target: target.to_string(),
            message: collector.message,
            fields: collector.fields,
        });
    }
}
