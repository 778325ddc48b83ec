//! Coordinator statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = manager.stats().snapshot();
//! println!("Committed: {}", stats.commits);
//! println!("Rolled back: {}", stats.rollbacks);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what the coordinator has done.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    /// Units of work created.
    units_created: AtomicU64,
    /// Units of work committed.
    commits: AtomicU64,
    /// Units of work rolled back.
    rollbacks: AtomicU64,
    /// Commit attempts that returned an error.
    commit_failures: AtomicU64,
    /// Individual store flushes.
    stores_flushed: AtomicU64,
    /// Lifecycle events handed to the bus.
    events_published: AtomicU64,
    /// Units of work dropped without dispose.
    units_abandoned: AtomicU64,
}

impl CoordinatorStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_unit_created(&self) {
        self.units_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_flush(&self) {
        self.stores_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.units_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of units of work created.
    pub fn units_created(&self) -> u64 {
        self.units_created.load(Ordering::Relaxed)
    }

    /// Returns the number of commits.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the number of rollbacks.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of failed commit attempts.
    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of store flushes.
    pub fn stores_flushed(&self) -> u64 {
        self.stores_flushed.load(Ordering::Relaxed)
    }

    /// Returns the number of published events.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Returns the number of units dropped without dispose.
    ///
    /// Anything above zero points at a caller that forgot to await
    /// `dispose()`.
    pub fn units_abandoned(&self) -> u64 {
        self.units_abandoned.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            units_created: self.units_created(),
            commits: self.commits(),
            rollbacks: self.rollbacks(),
            commit_failures: self.commit_failures(),
            stores_flushed: self.stores_flushed(),
            events_published: self.events_published(),
            units_abandoned: self.units_abandoned(),
        }
    }
}

/// A point-in-time copy of [`CoordinatorStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Units of work created.
    pub units_created: u64,
    /// Units of work committed.
    pub commits: u64,
    /// Units of work rolled back.
    pub rollbacks: u64,
    /// Failed commit attempts.
    pub commit_failures: u64,
    /// Store flushes.
    pub stores_flushed: u64,
    /// Published events.
    pub events_published: u64,
    /// Units dropped without dispose.
    pub units_abandoned: u64,
}
