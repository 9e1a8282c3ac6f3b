use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of trie statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieStatsSnapshot {
    /// Inserts that added a new key
    pub inserts: u64,
    /// Inserts that replaced an existing key's value
    pub updates: u64,
    /// Point lookups performed
    pub finds: u64,
    /// Keys removed
    pub removes: u64,
    /// Terminal entries pushed down into new nested levels
    pub splits: u64,
    /// Single-terminal levels folded back into their parent
    pub collapses: u64,
    /// Levels allocated
    pub levels_created: u64,
    /// Levels released
    pub levels_destroyed: u64,
    /// Calls made to the key resolver
    pub resolver_calls: u64,
}

/// Thread-safe statistics tracking for trie operations.
#[derive(Default)]
pub struct TrieStats {
    inserts: AtomicU64,
    updates: AtomicU64,
    finds: AtomicU64,
    removes: AtomicU64,
    splits: AtomicU64,
    collapses: AtomicU64,
    levels_created: AtomicU64,
    levels_destroyed: AtomicU64,
    resolver_calls: AtomicU64,
}

impl TrieStats {
    /// Returns the number of inserts that added a key.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of inserts that replaced a value.
    pub fn updates(&self) -> u64 {
        self.updates.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of lookups.
    pub fn finds(&self) -> u64 {
        self.finds.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of removed keys.
    pub fn removes(&self) -> u64 {
        self.removes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of splits.
    pub fn splits(&self) -> u64 {
        self.splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of collapses.
    pub fn collapses(&self) -> u64 {
        self.collapses.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of levels created.
    pub fn levels_created(&self) -> u64 {
        self.levels_created.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of levels destroyed.
    pub fn levels_destroyed(&self) -> u64 {
        self.levels_destroyed.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of key resolver calls.
    pub fn resolver_calls(&self) -> u64 {
        self.resolver_calls.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_updates(&self) {
        self.updates.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_finds(&self) {
        self.finds.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_removes(&self) {
        self.removes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_splits(&self) {
        self.splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_collapses(&self) {
        self.collapses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_levels_created(&self) {
        self.levels_created.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_levels_destroyed(&self) {
        self.levels_destroyed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_resolver_calls(&self) {
        self.resolver_calls.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> TrieStatsSnapshot {
        TrieStatsSnapshot {
            inserts: self.inserts(),
            updates: self.updates(),
            finds: self.finds(),
            removes: self.removes(),
            splits: self.splits(),
            collapses: self.collapses(),
            levels_created: self.levels_created(),
            levels_destroyed: self.levels_destroyed(),
            resolver_calls: self.resolver_calls(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "hbtrie::stats",
            inserts = snapshot.inserts,
            updates = snapshot.updates,
            finds = snapshot.finds,
            removes = snapshot.removes,
            splits = snapshot.splits,
            collapses = snapshot.collapses,
            levels_created = snapshot.levels_created,
            levels_destroyed = snapshot.levels_destroyed,
            resolver_calls = snapshot.resolver_calls,
            "hbtrie stats snapshot"
        );
    }
}

impl TrieStatsSnapshot {
    /// Levels currently alive according to the counters.
    pub fn live_levels(&self) -> i64 {
        self.levels_created as i64 - self.levels_destroyed as i64
    }
}
