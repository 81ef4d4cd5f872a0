//! Sweep Statistics Module
//!
//! Tracks what a garbage-collection or cleanup sweep found and removed.

use serde::Serialize;

// == Sweep Stats ==
/// Outcome of one sweep over the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Number of blobs listed under the namespace prefix
    pub scanned: usize,
    /// Number of expired blobs removed
    pub expired: usize,
    /// Number of undecodable blobs removed
    pub corrupt: usize,
    /// Total number of blobs actually removed
    pub removed: usize,
}

impl SweepStats {
    // == Constructor ==
    /// Creates a new SweepStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a blob found by the listing.
    pub fn record_scanned(&mut self) {
        self.scanned += 1;
    }

    /// Records the removal of an expired blob.
    pub fn record_expired(&mut self) {
        self.expired += 1;
        self.removed += 1;
    }

    /// Records the removal of an undecodable blob.
    pub fn record_corrupt(&mut self) {
        self.corrupt += 1;
        self.removed += 1;
    }

    /// Records an unconditional removal.
    pub fn record_removed(&mut self) {
        self.removed += 1;
    }

    /// Number of scanned blobs left in place.
    pub fn retained(&self) -> usize {
        self.scanned.saturating_sub(self.removed)
    }
}
