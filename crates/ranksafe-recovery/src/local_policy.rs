//! Baseline policy that keeps only this rank's own snapshots.
//!
//! No copy leaves the rank, so remote entries stay empty and a replacement
//! process cannot pull state from its peers. Every engine operation and every
//! agreement round still runs through it, which makes it the reference policy
//! for single-rank round trips and for tests.

use tracing::{debug, warn};

use crate::buffer::BufferEntry;
use crate::error::{RecoveryError, RecoveryResult};
use crate::group::GroupCore;
use crate::member::{check_fits, Member, MemberAttribute, MemberSpec};
use crate::policy::{RecoveryPolicy, StoreRegion};
use crate::request::Request;
use crate::types::{MemberId, LATEST};
use crate::version::VersionSlot;

/// Keeps snapshots in this rank's memory only.
#[derive(Debug, Default)]
pub struct LocalPolicy;

impl LocalPolicy {
    /// Creates the policy.
    pub fn new() -> Self {
        Self
    }

    /// Boxed, ready for [`DataRecovery::group_create`](crate::DataRecovery::group_create).
    pub fn boxed() -> Box<dyn RecoveryPolicy> {
        Box::new(Self)
    }
}

fn member_mut(group: &mut GroupCore, member_id: MemberId) -> RecoveryResult<&mut Member> {
    let group_id = group.id;
    group
        .members
        .get_mut(member_id)
        .ok_or(RecoveryError::InvalidMemberId {
            group_id,
            member_id,
            reason: "member does not exist",
        })
}

fn member_ref(group: &GroupCore, member_id: MemberId) -> RecoveryResult<&Member> {
    group
        .members
        .get(member_id)
        .ok_or(RecoveryError::InvalidMemberId {
            group_id: group.id,
            member_id,
            reason: "member does not exist",
        })
}

/// The committed slot labeled `timestamp`, or the newest for [`LATEST`].
fn committed_slot(member: &Member, timestamp: i64) -> RecoveryResult<&VersionSlot> {
    let slot = if timestamp == LATEST {
        member.versions.latest()
    } else {
        member
            .versions
            .find(timestamp)
            .and_then(|idx| member.versions.slot(idx))
    };
    slot.ok_or(RecoveryError::InvalidTimestamp {
        timestamp,
        reason: "snapshot not retained",
    })
}

/// Bytes of the next snapshot of `member` for `region`.
///
/// Fails when the application shrank the buffer below `COUNT` elements.
fn snapshot_bytes(member: &Member, region: &StoreRegion) -> RecoveryResult<Vec<u8>> {
    let dsize = member.datatype_size;
    let count = member.count;
    if let Err(err) = check_fits(MemberAttribute::Buffer, &member.buffer, count, dsize) {
        warn!(
            member_id = %member.id,
            count,
            buffer_len = member.buffer.len(),
            "buffer shorter than member count"
        );
        return Err(err);
    }
    let data = member.buffer.read();
    let bytes = count * dsize;
    let mut snapshot = data[..bytes].to_vec();

    if let StoreRegion::Subset(spec) = region {
        if let Some(previous) = member.versions.latest() {
            let keep = previous.local.data.len().min(bytes);
            snapshot[..keep].copy_from_slice(&previous.local.data[..keep]);
            spec.overlay(&data[..], &mut snapshot, dsize, count);
        }
    }
    Ok(snapshot)
}

impl RecoveryPolicy for LocalPolicy {
    fn name(&self) -> &'static str {
        "local"
    }

    fn construct_group(&mut self, group: &mut GroupCore) -> RecoveryResult<()> {
        debug!(group_id = %group.id, rank = group.rank(), "local policy constructed group");
        Ok(())
    }

    fn reinit_group(&mut self, group: &mut GroupCore) -> RecoveryResult<()> {
        debug!(group_id = %group.id, rank = group.rank(), "local policy reinitialized group");
        Ok(())
    }

    fn member_create(&mut self, group: &mut GroupCore, spec: MemberSpec) -> RecoveryResult<()> {
        let member = Member::new(spec, group.version_capacity)?;
        let slot = group.members.insert(member)?;
        debug!(group_id = %group.id, slot, "member registered");
        Ok(())
    }

    fn member_store(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        region: &StoreRegion,
    ) -> RecoveryResult<()> {
        let rank = group.rank();
        let member = member_mut(group, member_id)?;
        let snapshot = snapshot_bytes(member, region)?;
        let count = member.count;
        let entry = BufferEntry::new(snapshot, count, member.datatype, member.datatype_size, rank);
        member.versions.stage(entry);
        debug!(member_id = %member_id, count, "member stored");
        Ok(())
    }

    fn member_istore(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        region: &StoreRegion,
    ) -> RecoveryResult<Request> {
        self.member_store(group, member_id, region)?;
        Ok(Request::completed())
    }

    fn member_restore(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
    ) -> RecoveryResult<usize> {
        let member = member_ref(group, member_id)?;
        let slot = committed_slot(member, timestamp)?;
        let restored = slot.local.copy_into(dest, max_count);
        debug!(member_id = %member_id, timestamp, restored, "member restored");
        Ok(restored)
    }

    fn member_restore_from_rank(
        &mut self,
        group: &mut GroupCore,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
        source_rank: usize,
    ) -> RecoveryResult<usize> {
        if source_rank == group.rank() {
            return self.member_restore(group, member_id, dest, max_count, timestamp);
        }
        let member = member_ref(group, member_id)?;
        let slot = committed_slot(member, timestamp)?;
        if slot.remote.rank != Some(source_rank) {
            return Err(RecoveryError::InvalidRank {
                rank: source_rank,
                member_id,
            });
        }
        Ok(slot.remote.copy_into(dest, max_count))
    }

    fn commit(&mut self, group: &mut GroupCore) -> RecoveryResult<i64> {
        Ok(group.commit_versions())
    }

    fn snapshot_delete(&mut self, group: &mut GroupCore, timestamp: i64) -> RecoveryResult<()> {
        let mut invalidated = 0;
        for member in group.members.live_mut() {
            if member.versions.invalidate(timestamp) {
                invalidated += 1;
            }
        }
        if invalidated == 0 {
            return Err(RecoveryError::InvalidTimestamp {
                timestamp,
                reason: "snapshot not retained",
            });
        }
        debug!(group_id = %group.id, timestamp, invalidated, "snapshot deleted");
        Ok(())
    }

    fn member_delete(&mut self, group: &mut GroupCore, member_id: MemberId) -> RecoveryResult<()> {
        member_ref(group, member_id)?;
        Ok(())
    }

    fn group_delete(&mut self, group: &mut GroupCore) -> RecoveryResult<()> {
        debug!(group_id = %group.id, "local policy released group");
        Ok(())
    }
}
