//! Short-lived unique identifiers for events and listeners.
//!
//! IDs only need to survive one request/response round trip, so instead
//! of UUIDs the generator draws random integers and remembers what it
//! handed out during the last window.
//!
//! No background task sweeps the table. Expired entries are evicted inside
//! [`IdGenerator::next`] once the sweep interval has elapsed since the last
//! sweep, so an idle generator keeps its table until the next draw. Memory
//! stays bounded by the IDs issued within one window plus one interval.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;

/// Range random IDs are drawn from. Zero is never issued.
pub const ID_RANGE: Range<u64> = 1..10_000_000_000;

/// Default uniqueness window.
pub const DEFAULT_ID_WINDOW: Duration = Duration::from_secs(60);

/// Default interval between sweeps of the issued-ID table.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

struct IssuedIds {
    ids: HashMap<u64, Instant>,
    last_sweep: Instant,
}

/// Generates integers that are unique among those issued in the last
/// `window`.
pub struct IdGenerator {
    issued: Mutex<IssuedIds>,
    window: Duration,
    sweep_interval: Duration,
}

impl IdGenerator {
    pub fn new(window: Duration, sweep_interval: Duration) -> Self {
        Self {
            issued: Mutex::new(IssuedIds {
                ids: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            window,
            sweep_interval,
        }
    }

    /// Draw a fresh ID.
    pub fn next(&self) -> u64 {
        let mut rng = rand::rng();
        self.next_from(|| rng.random_range(ID_RANGE), Instant::now())
    }

    /// Number of IDs currently remembered.
    pub fn tracked(&self) -> usize {
        self.lock().ids.len()
    }

    /// Evict every ID issued more than one window before `now`.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut issued = self.lock();
        self.sweep_locked(&mut issued, now)
    }

    fn next_from(&self, mut draw: impl FnMut() -> u64, now: Instant) -> u64 {
        let mut issued = self.lock();

        if now.saturating_duration_since(issued.last_sweep) >= self.sweep_interval {
            self.sweep_locked(&mut issued, now);
        }

        loop {
            let candidate = draw();
            match issued.ids.get(&candidate) {
                Some(at) if now.saturating_duration_since(*at) < self.window => {
                    tracing::trace!(id = candidate, "id collision inside window, redrawing");
                }
                _ => {
                    issued.ids.insert(candidate, now);
                    return candidate;
                }
            }
        }
    }

    fn sweep_locked(&self, issued: &mut IssuedIds, now: Instant) -> usize {
        let before = issued.ids.len();
        let window = self.window;
        issued
            .ids
            .retain(|_, at| now.saturating_duration_since(*at) < window);
        issued.last_sweep = now;
        let evicted = before - issued.ids.len();
        if evicted > 0 {
            tracing::trace!(evicted, "swept expired ids");
        }
        evicted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IssuedIds> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_WINDOW, DEFAULT_SWEEP_INTERVAL)
    }
}
