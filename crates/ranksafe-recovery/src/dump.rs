//! Structured dump of the group/member/version tree.

use serde::{Deserialize, Serialize};

use crate::group::Group;
use crate::member::Member;
use crate::types::{Datatype, SlotState};
use crate::version::VersionStore;

/// Whole registry as seen by this rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDump {
    /// Number of group slots.
    pub total_size: usize,
    /// Number of live groups.
    pub count: usize,
    /// Groups in slot order, deleted ones included.
    pub groups: Vec<GroupDump>,
}

/// One group slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDump {
    /// Slot index.
    pub slot: usize,
    /// Group id.
    pub id: i32,
    /// Slot state.
    pub state: SlotState,
    /// Commit counter.
    pub timestamp: i64,
    /// Retention window.
    pub depth: i64,
    /// This rank in the group's communicator.
    pub rank: usize,
    /// Ranks in the group's communicator.
    pub comm_size: usize,
    /// Policy name.
    pub policy: String,
    /// Number of live members.
    pub member_count: usize,
    /// Number of member slots.
    pub member_total_size: usize,
    /// Members in slot order, deleted ones included.
    pub members: Vec<MemberDump>,
}

/// One member slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDump {
    /// Slot index.
    pub slot: usize,
    /// Member id.
    pub id: i32,
    /// Slot state.
    pub state: SlotState,
    /// Elements checkpointed.
    pub count: usize,
    /// Element type.
    pub datatype: Datatype,
    /// Element size in bytes.
    pub datatype_size: usize,
    /// Snapshot history.
    pub versions: VersionDump,
}

/// A member's snapshot history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDump {
    /// Number of slots.
    pub total_size: usize,
    /// Slot of the newest commit.
    pub position: usize,
    /// Contiguous history available to a rollback.
    pub num_copies: usize,
    /// Labeled snapshots.
    pub count: usize,
    /// Every slot, labeled or not.
    pub snapshots: Vec<SnapshotDump>,
}

/// One version slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDump {
    /// Slot index.
    pub slot: usize,
    /// Commit label.
    pub timestamp: Option<i64>,
    /// Bytes held for this rank.
    pub local_bytes: usize,
    /// Rank whose copy is held as the redundant entry.
    pub remote_rank: Option<usize>,
}

impl From<&VersionStore> for VersionDump {
    fn from(store: &VersionStore) -> Self {
        Self {
            total_size: store.total_size(),
            position: store.position(),
            num_copies: store.num_copies(),
            count: store.count(),
            snapshots: store
                .slots()
                .iter()
                .enumerate()
                .map(|(slot, s)| SnapshotDump {
                    slot,
                    timestamp: s.timestamp,
                    local_bytes: s.local.data.len(),
                    remote_rank: s.remote.rank,
                })
                .collect(),
        }
    }
}

impl MemberDump {
    pub(crate) fn new(slot: usize, member: &Member) -> Self {
        Self {
            slot,
            id: member.id.as_i32(),
            state: member.state,
            count: member.count,
            datatype: member.datatype,
            datatype_size: member.datatype_size,
            versions: VersionDump::from(&member.versions),
        }
    }
}

impl GroupDump {
    pub(crate) fn new(slot: usize, group: &Group) -> Self {
        let core = &group.core;
        let members = (0..core.members.total_size())
            .filter_map(|i| core.members.at_slot(i).map(|m| MemberDump::new(i, m)))
            .collect();
        Self {
            slot,
            id: core.id.as_i32(),
            state: core.state,
            timestamp: core.timestamp,
            depth: core.depth,
            rank: core.comm.rank(),
            comm_size: core.comm.size(),
            policy: group.policy.name().to_string(),
            member_count: core.members.count(),
            member_total_size: core.members.total_size(),
            members,
        }
    }
}
