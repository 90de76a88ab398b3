//! The operation contract between the engine and a redundancy strategy.
//!
//! The engine validates ids, sequences calls and runs the agreement rounds; a
//! [`RecoveryPolicy`] decides where copies live and moves the bytes. Hooks get
//! the group's [`GroupCore`] so they can reach members, version stores and
//! the communicator.

use crate::error::RecoveryResult;
use crate::group::GroupCore;
use crate::member::MemberSpec;
use crate::request::Request;
use crate::subset::SubsetSpecifier;
use crate::types::MemberId;

/// Part of a member buffer a store covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreRegion {
    /// The whole buffer.
    #[default]
    Whole,
    /// Only the elements described by the specifier.
    Subset(SubsetSpecifier),
}

/// A redundancy and placement strategy.
///
/// Hooks that run on every rank of the group (construct, reinit, commit)
/// may communicate; the engine guarantees every rank calls them in the same
/// order.
pub trait RecoveryPolicy: Send {
    /// Short name used in logs and dumps.
    fn name(&self) -> &'static str;

    /// Initializes a newly created group.
    fn construct_group(&mut self, group: &mut GroupCore) -> RecoveryResult<()>;

    /// Re-synchronizes an existing group after its communicator was renewed.
    fn reinit_group(&mut self, group: &mut GroupCore) -> RecoveryResult<()>;

    /// Registers a member and allocates its history.
    fn member_create(&mut self, group: &mut GroupCore, spec: MemberSpec) -> RecoveryResult<()>;

    /// Stores the current contents of a member into its staging slot.
    fn member_store(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        region: &StoreRegion,
    ) -> RecoveryResult<()>;

    /// Non-blocking variant of [`member_store`](Self::member_store).
    fn member_istore(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        region: &StoreRegion,
    ) -> RecoveryResult<Request>;

    /// Copies the snapshot labeled `timestamp` into `dest`, at most
    /// `max_count` elements. Returns the number of elements restored.
    fn member_restore(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
    ) -> RecoveryResult<usize>;

    /// Like [`member_restore`](Self::member_restore) but sources the copy
    /// held for `source_rank`.
    fn member_restore_from_rank(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
        source_rank: usize,
    ) -> RecoveryResult<usize>;

    /// Commits the staged snapshots; returns the new timestamp.
    fn commit(&mut self, group: &mut GroupCore) -> RecoveryResult<i64>;

    /// Invalidates the snapshot labeled `timestamp`.
    fn snapshot_delete(&mut self, group: &mut GroupCore, timestamp: i64) -> RecoveryResult<()>;

    /// Releases policy state for a member about to be deleted.
    fn member_delete(&mut self, group: &mut GroupCore, member_id: MemberId) -> RecoveryResult<()>;

    /// Releases policy state for a group about to be deleted.
    fn group_delete(&mut self, group: &mut GroupCore) -> RecoveryResult<()>;
}
