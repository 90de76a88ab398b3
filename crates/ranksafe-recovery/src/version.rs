//! Per-member circular snapshot history.
//!
//! A [`VersionStore`] holds `total_size` slots. Stores write into the staging
//! slot just past `position`; a commit makes the staging slot the new
//! `position` and labels it with the commit timestamp. Once all slots are in
//! use, each commit silently overwrites the oldest snapshot.

use crate::buffer::BufferEntry;

/// One slot of the history: this rank's copy and the redundant copy.
#[derive(Debug, Clone, Default)]
pub struct VersionSlot {
    /// This rank's checkpointed bytes.
    pub local: BufferEntry,
    /// Redundant copy placed by the policy, if any.
    pub remote: BufferEntry,
    /// Commit timestamp, `None` while staged or after invalidation.
    pub timestamp: Option<i64>,
}

/// Fixed-capacity circular buffer of snapshots.
#[derive(Debug, Clone)]
pub struct VersionStore {
    slots: Vec<VersionSlot>,
    position: usize,
    num_copies: usize,
    count: usize,
    staged: bool,
}

impl VersionStore {
    /// Creates an empty history with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let total = capacity.max(1);
        Self {
            slots: vec![VersionSlot::default(); total],
            position: total - 1,
            num_copies: 0,
            count: 0,
            staged: false,
        }
    }

    /// Number of slots.
    pub fn total_size(&self) -> usize {
        self.slots.len()
    }

    /// Slot of the most recent commit.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Length of the contiguous committed history that a rollback may reach.
    pub fn num_copies(&self) -> usize {
        self.num_copies
    }

    /// Number of labeled snapshots currently held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// All slots in index order.
    pub fn slots(&self) -> &[VersionSlot] {
        &self.slots
    }

    /// Slot the next store writes into.
    pub fn staging_index(&self) -> usize {
        (self.position + 1) % self.total_size()
    }

    /// True when a store happened since the last commit.
    pub fn is_staged(&self) -> bool {
        self.staged
    }

    /// Most recent committed snapshot.
    pub fn latest(&self) -> Option<&VersionSlot> {
        let slot = &self.slots[self.position];
        if self.num_copies > 0 && slot.timestamp.is_some() {
            Some(slot)
        } else {
            None
        }
    }

    /// Writes this rank's copy into the staging slot.
    pub fn stage(&mut self, local: BufferEntry) {
        let idx = self.staging_index();
        let slot = &mut self.slots[idx];
        if slot.timestamp.take().is_some() {
            self.count -= 1;
        }
        slot.local = local;
        slot.remote = BufferEntry::default();
        self.staged = true;
    }

    /// Writes the redundant copy into the staging slot.
    pub fn stage_remote(&mut self, remote: BufferEntry) {
        let idx = self.staging_index();
        self.slots[idx].remote = remote;
    }

    /// Makes the staging slot the newest snapshot, labeled `timestamp`.
    ///
    /// Without a store since the last commit the previous snapshot is
    /// carried forward so every timestamp of the group has a copy. When there
    /// is nothing to carry (no store yet, or the newest snapshot was
    /// invalidated) the cursor still advances but the slot stays unlabeled,
    /// so `timestamp` cannot be restored.
    pub fn commit(&mut self, timestamp: i64) {
        let holds_data = if self.staged {
            true
        } else if let Some(carried) = self.latest().cloned() {
            self.stage(carried.local);
            self.stage_remote(carried.remote);
            true
        } else {
            self.stage(BufferEntry::default());
            false
        };
        let idx = self.staging_index();
        if holds_data {
            self.slots[idx].timestamp = Some(timestamp);
            self.count += 1;
        }
        self.position = idx;
        self.staged = false;
        self.num_copies = (self.num_copies + 1).min(self.total_size());
    }

    /// Records a new element count on this rank's newest snapshot.
    pub fn set_latest_count(&mut self, count: usize) {
        if self.latest().is_some() {
            self.slots[self.position].local.count = count;
        }
    }

    /// Index of the slot committed with `timestamp`.
    pub fn find(&self, timestamp: i64) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.timestamp == Some(timestamp))
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&VersionSlot> {
        self.slots.get(index)
    }

    /// Moves the cursor `offset` commits back and drops the newer snapshots.
    ///
    /// Callers guarantee `offset < num_copies`.
    pub fn rewind(&mut self, offset: usize) {
        let total = self.total_size();
        for back in 0..offset {
            let idx = (self.position + total - back) % total;
            if self.slots[idx].timestamp.take().is_some() {
                self.count -= 1;
            }
        }
        self.position = (self.position + total - offset) % total;
        self.num_copies -= offset;
        self.staged = false;
    }

    /// Invalidates the snapshot labeled `timestamp`; false if none is held.
    pub fn invalidate(&mut self, timestamp: i64) -> bool {
        match self.find(timestamp) {
            Some(idx) => {
                self.slots[idx].timestamp = None;
                self.count -= 1;
                true
            }
            None => false,
        }
    }

    /// Logically empties the history; slot buffers are kept.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.timestamp = None;
        }
        self.count = 0;
        self.num_copies = 0;
        self.staged = false;
    }
}
