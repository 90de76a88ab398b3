//! Checkpoint groups.

use std::sync::Arc;

use ranksafe_comm::Communicator;
use tracing::debug;

use crate::member::MemberRegistry;
use crate::policy::RecoveryPolicy;
use crate::types::{GroupId, SlotState};

/// Group metadata and members, everything a policy hook may touch.
pub struct GroupCore {
    /// Group id.
    pub id: GroupId,
    /// Ranks that checkpoint this group together.
    pub comm: Arc<dyn Communicator>,
    /// Commit counter.
    pub timestamp: i64,
    /// Retention window; -1 is unbounded.
    pub depth: i64,
    /// Slot state.
    pub state: SlotState,
    /// Snapshot slots allocated per member.
    pub version_capacity: usize,
    /// Members of the group.
    pub members: MemberRegistry,
}

impl GroupCore {
    /// Fresh, live group metadata.
    pub fn new(
        id: GroupId,
        comm: Arc<dyn Communicator>,
        timestart: i64,
        depth: i64,
        version_capacity: usize,
        member_capacity: usize,
    ) -> Self {
        Self {
            id,
            comm,
            timestamp: timestart,
            depth,
            state: SlotState::Occupied,
            version_capacity,
            members: MemberRegistry::new(member_capacity),
        }
    }

    /// This rank within the group's communicator.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Advances the timestamp and commits every live member's staged slot
    /// under the new timestamp. Returns the new timestamp.
    pub fn commit_versions(&mut self) -> i64 {
        self.timestamp += 1;
        let timestamp = self.timestamp;
        for member in self.members.live_mut() {
            member.versions.commit(timestamp);
        }
        debug!(group_id = %self.id, timestamp, "committed versions");
        timestamp
    }

    /// Number of snapshots held per member; every live member holds the same number.
    pub fn snapshot_count(&self) -> usize {
        self.members
            .live()
            .next()
            .map(|m| m.versions.count())
            .unwrap_or(0)
    }
}

/// A checkpoint group: metadata plus the policy that moves its data.
pub struct Group {
    /// Metadata and members.
    pub core: GroupCore,
    /// Redundancy strategy.
    pub policy: Box<dyn RecoveryPolicy>,
}

impl Group {
    /// Pairs metadata with a policy.
    pub fn new(core: GroupCore, policy: Box<dyn RecoveryPolicy>) -> Self {
        Self { core, policy }
    }

    /// Group id.
    pub fn id(&self) -> GroupId {
        self.core.id
    }

    /// Slot state.
    pub fn state(&self) -> SlotState {
        self.core.state
    }

    /// True unless deleted.
    pub fn is_live(&self) -> bool {
        self.core.state == SlotState::Occupied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferEntry, MemberBuffer};
    use crate::member::{Member, MemberSpec};
    use crate::types::{Datatype, MemberId};
    use ranksafe_comm::{Role, SimComm};

    fn core() -> GroupCore {
        GroupCore::new(
            GroupId::new(1),
            Arc::new(SimComm::solo(Role::Initial)),
            0,
            2,
            3,
            4,
        )
    }

    fn add_member(core: &mut GroupCore, id: i32) {
        let spec = MemberSpec {
            id: MemberId::new(id),
            buffer: MemberBuffer::new(vec![id as u8; 4]),
            count: 4,
            datatype: Datatype::Byte,
        };
        core.members
            .insert(Member::new(spec, core.version_capacity).unwrap())
            .unwrap();
    }

    #[test]
    fn test_new_core_is_occupied() {
        let core = core();
        assert_eq!(core.state, SlotState::Occupied);
        assert_eq!(core.timestamp, 0);
        assert_eq!(core.rank(), 0);
        assert_eq!(core.members.total_size(), 4);
    }

    #[test]
    fn test_commit_versions_advances_all_members() {
        let mut core = core();
        add_member(&mut core, 1);
        add_member(&mut core, 2);
        for m in core.members.live_mut() {
            m.versions
                .stage(BufferEntry::new(vec![1; 4], 4, Datatype::Byte, 1, 0));
        }
        assert_eq!(core.commit_versions(), 1);
        assert_eq!(core.commit_versions(), 2);
        for m in core.members.live() {
            assert_eq!(m.versions.count(), 2);
            assert!(m.versions.find(2).is_some());
        }
        assert_eq!(core.snapshot_count(), 2);
    }

    #[test]
    fn test_commit_without_store_holds_no_snapshot() {
        let mut core = core();
        add_member(&mut core, 1);
        assert_eq!(core.commit_versions(), 1);
        assert_eq!(core.snapshot_count(), 0);
    }

    #[test]
    fn test_snapshot_count_without_members() {
        assert_eq!(core().snapshot_count(), 0);
    }
}
