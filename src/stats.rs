//! Publish statistics counters.
//!
//! Counts and byte totals for added/removed/changed files, symlinks and
//! directories. Counters are only ever mutated alongside the catalog
//! mutation they describe. Symlinks never contribute to byte totals.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct FsCounters {
    pub n_files_added: AtomicI64,
    pub n_files_removed: AtomicI64,
    pub n_files_changed: AtomicI64,
    pub n_symlinks_added: AtomicI64,
    pub n_symlinks_removed: AtomicI64,
    pub n_symlinks_changed: AtomicI64,
    pub n_directories_added: AtomicI64,
    pub n_directories_removed: AtomicI64,
    pub n_directories_changed: AtomicI64,
    pub sz_added_bytes: AtomicI64,
    pub sz_removed_bytes: AtomicI64,
}

impl FsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FsCountersSnapshot {
        FsCountersSnapshot {
            n_files_added: self.n_files_added.load(Ordering::Relaxed),
            n_files_removed: self.n_files_removed.load(Ordering::Relaxed),
            n_files_changed: self.n_files_changed.load(Ordering::Relaxed),
            n_symlinks_added: self.n_symlinks_added.load(Ordering::Relaxed),
            n_symlinks_removed: self.n_symlinks_removed.load(Ordering::Relaxed),
            n_symlinks_changed: self.n_symlinks_changed.load(Ordering::Relaxed),
            n_directories_added: self.n_directories_added.load(Ordering::Relaxed),
            n_directories_removed: self.n_directories_removed.load(Ordering::Relaxed),
            n_directories_changed: self.n_directories_changed.load(Ordering::Relaxed),
            sz_added_bytes: self.sz_added_bytes.load(Ordering::Relaxed),
            sz_removed_bytes: self.sz_removed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Incremented/decremented via these helpers so call sites read like the
/// operations they account for.
pub fn inc(counter: &AtomicI64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn dec(counter: &AtomicI64) {
    counter.fetch_sub(1, Ordering::Relaxed);
}

pub fn add(counter: &AtomicI64, delta: i64) {
    counter.fetch_add(delta, Ordering::Relaxed);
}

/// Point-in-time copy of the counters, for reporting and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FsCountersSnapshot {
    pub n_files_added: i64,
    pub n_files_removed: i64,
    pub n_files_changed: i64,
    pub n_symlinks_added: i64,
    pub n_symlinks_removed: i64,
    pub n_symlinks_changed: i64,
    pub n_directories_added: i64,
    pub n_directories_removed: i64,
    pub n_directories_changed: i64,
    pub sz_added_bytes: i64,
    pub sz_removed_bytes: i64,
}
