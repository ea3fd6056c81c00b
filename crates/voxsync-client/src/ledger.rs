//! Pending optimistic writes and their decay.
//!
//! Every local edit that changes a voxel is recorded here together with the
//! value it replaced. If the server does not acknowledge the edit within the
//! grace period, [`WriteLedger::sweep`] hands the old value back for
//! rollback.
//!
//! A second local edit to a voxel that is already pending leaves the entry
//! untouched: its countdown keeps running and the value restored on rollback
//! stays the one from before the *first* edit. Only an edit that exactly
//! restores that value removes the entry early.

use rustc_hash::FxHashMap;
use voxsync_voxel::{VoxelKey, VoxelValue};

/// Default number of sweeps before an unacknowledged write is rolled back.
pub const DEFAULT_GRACE_TICKS: u32 = 5;

// ---------------------------------------------------------------------------
// PendingWrite
// ---------------------------------------------------------------------------

/// One in-flight optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    /// Sweeps remaining before rollback.
    pub decay: u32,
    /// Value the voxel held before the write; restored on rollback.
    pub prior: VoxelValue,
}

/// What [`WriteLedger::record_or_clear`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The edit did not change the voxel; nothing to track.
    NoOp,
    /// A new pending entry was created.
    Recorded,
    /// The edit restored the tracked prior value; the entry was removed.
    Collapsed,
    /// An entry already existed and was left as is.
    AlreadyPending,
}

// ---------------------------------------------------------------------------
// WriteLedger
// ---------------------------------------------------------------------------

/// Map of voxel key → pending write. At most one entry per voxel.
#[derive(Debug)]
pub struct WriteLedger {
    grace_ticks: u32,
    pending: FxHashMap<VoxelKey, PendingWrite>,
}

impl WriteLedger {
    /// Creates an empty ledger whose entries survive `grace_ticks` sweeps.
    pub fn new(grace_ticks: u32) -> Self {
        Self {
            grace_ticks: grace_ticks.max(1),
            pending: FxHashMap::default(),
        }
    }

    /// Bookkeeping for a local edit that moved `key` from `prior` to `new`.
    pub fn record_or_clear(
        &mut self,
        key: VoxelKey,
        prior: VoxelValue,
        new: VoxelValue,
    ) -> LedgerOutcome {
        if new == prior {
            return LedgerOutcome::NoOp;
        }
        match self.pending.get(&key) {
            Some(entry) if entry.prior == new => {
                self.pending.remove(&key);
                LedgerOutcome::Collapsed
            }
            Some(_) => LedgerOutcome::AlreadyPending,
            None => {
                self.pending.insert(
                    key,
                    PendingWrite {
                        decay: self.grace_ticks,
                        prior,
                    },
                );
                LedgerOutcome::Recorded
            }
        }
    }

    /// Drops any pending entry for `key` (server acknowledgement).
    pub fn clear(&mut self, key: VoxelKey) -> Option<PendingWrite> {
        self.pending.remove(&key)
    }

    /// Decrements every entry and removes those that reached zero.
    ///
    /// Returns `(key, prior)` for each expired entry; the caller restores
    /// the prior value.
    pub fn sweep(&mut self) -> Vec<(VoxelKey, VoxelValue)> {
        let mut expired = Vec::new();
        self.pending.retain(|key, entry| {
            entry.decay = entry.decay.saturating_sub(1);
            if entry.decay == 0 {
                expired.push((*key, entry.prior));
                false
            } else {
                true
            }
        });
        expired
    }

    /// Returns the pending entry for `key`, if any.
    pub fn get(&self, key: VoxelKey) -> Option<&PendingWrite> {
        self.pending.get(&key)
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Grace period new entries start with.
    pub fn grace_ticks(&self) -> u32 {
        self.grace_ticks
    }
}

impl Default for WriteLedger {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_TICKS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
