//! Process-wide frame accounting.
//!
//! The export loop, the import threads and the A/V sync stage all update
//! these tallies concurrently. Each counter has its own lock. Operations
//! that need more than one counter take the locks in declaration order
//! (encoded, dropped, skipped, cloned) so they can never deadlock.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SharedCounters {
    encoded: Mutex<u64>,
    dropped: Mutex<u64>,
    skipped: Mutex<u64>,
    cloned: Mutex<u64>,
}

/// A consistent copy of all four counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterSnapshot {
    pub encoded: u64,
    pub dropped: u64,
    pub skipped: u64,
    pub cloned: u64,
}

fn lock(counter: &Mutex<u64>) -> MutexGuard<'_, u64> {
    counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SharedCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The counters shared by every session in this process.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<SharedCounters>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(SharedCounters::new))
    }

    pub fn encoded(&self) -> u64 {
        *lock(&self.encoded)
    }

    pub fn dropped(&self) -> u64 {
        *lock(&self.dropped)
    }

    pub fn skipped(&self) -> u64 {
        *lock(&self.skipped)
    }

    pub fn cloned(&self) -> u64 {
        *lock(&self.cloned)
    }

    pub fn add_encoded(&self, n: u64) {
        *lock(&self.encoded) += n;
    }

    pub fn add_dropped(&self, n: u64) {
        *lock(&self.dropped) += n;
    }

    pub fn add_skipped(&self, n: u64) {
        *lock(&self.skipped) += n;
    }

    pub fn add_cloned(&self, n: u64) {
        *lock(&self.cloned) += n;
    }

    /// `skipped - cloned`, read under both locks.
    pub fn skipped_minus_cloned(&self) -> i64 {
        let skipped = lock(&self.skipped);
        let cloned = lock(&self.cloned);
        *skipped as i64 - *cloned as i64
    }

    /// Zero every counter. Called once at the start of a session.
    pub fn reset(&self) {
        let mut encoded = lock(&self.encoded);
        let mut dropped = lock(&self.dropped);
        let mut skipped = lock(&self.skipped);
        let mut cloned = lock(&self.cloned);
        *encoded = 0;
        *dropped = 0;
        *skipped = 0;
        *cloned = 0;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let encoded = lock(&self.encoded);
        let dropped = lock(&self.dropped);
        let skipped = lock(&self.skipped);
        let cloned = lock(&self.cloned);
        CounterSnapshot {
            encoded: *encoded,
            dropped: *dropped,
            skipped: *skipped,
            cloned: *cloned,
        }
    }
}
