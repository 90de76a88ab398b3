//! The recovery engine: group registry and the public operation surface.
//!
//! [`DataRecovery`] owns every group of the process. Operations validate
//! their arguments locally first, so a rejected call neither communicates nor
//! mutates anything. Accepted calls are delegated to the group's
//! [`RecoveryPolicy`], and create, attach and rollback finish with an
//! agreement round.

use std::sync::Arc;

use ranksafe_comm::Communicator;
use tracing::{debug, info, warn};

use crate::agreement;
use crate::buffer::MemberBuffer;
use crate::config::RecoveryConfig;
use crate::dump::{GroupDump, RegistryDump};
use crate::error::{RecoveryError, RecoveryResult};
use crate::group::{Group, GroupCore};
use crate::member::{AttributeValue, MemberAttribute, MemberSpec};
use crate::policy::{RecoveryPolicy, StoreRegion};
use crate::request::Request;
use crate::types::{Datatype, GroupId, MemberId, MemberSelector, SlotState, LATEST};

/// Process-wide checkpoint state: a fixed-capacity registry of groups.
pub struct DataRecovery {
    config: RecoveryConfig,
    groups: Vec<Option<Group>>,
    count: usize,
}

impl Default for DataRecovery {
    fn default() -> Self {
        let config = RecoveryConfig::default();
        let groups = (0..config.max_groups).map(|_| None).collect();
        Self {
            config,
            groups,
            count: 0,
        }
    }
}

fn require_member(core: &GroupCore, member_id: MemberId) -> RecoveryResult<()> {
    match core.members.find(member_id) {
        Some(_) => Ok(()),
        None => Err(RecoveryError::InvalidMemberId {
            group_id: core.id,
            member_id,
            reason: "member does not exist",
        }),
    }
}

fn check_restore_timestamp(timestamp: i64) -> RecoveryResult<()> {
    if timestamp < 0 && timestamp != LATEST {
        return Err(RecoveryError::InvalidTimestamp {
            timestamp,
            reason: "must be non-negative or LATEST",
        });
    }
    Ok(())
}

impl DataRecovery {
    /// Creates an empty registry sized by `config`.
    pub fn new(config: RecoveryConfig) -> RecoveryResult<Self> {
        config.validate()?;
        let groups = (0..config.max_groups).map(|_| None).collect();
        Ok(Self {
            config,
            groups,
            count: 0,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Number of live groups.
    pub fn group_count(&self) -> usize {
        self.count
    }

    /// Slot index of the live group `group_id`.
    pub fn find_group(&self, group_id: GroupId) -> Option<usize> {
        self.groups.iter().position(|slot| {
            slot.as_ref()
                .map(|g| g.is_live() && g.id() == group_id)
                .unwrap_or(false)
        })
    }

    /// First slot that is empty or holds a deleted group.
    pub fn find_next_group_position(&self) -> Option<usize> {
        self.groups
            .iter()
            .position(|slot| slot.as_ref().map(|g| !g.is_live()).unwrap_or(true))
    }

    /// The live group `group_id`.
    pub fn group(&self, group_id: GroupId) -> RecoveryResult<&Group> {
        self.find_group(group_id)
            .and_then(|i| self.groups[i].as_ref())
            .ok_or(RecoveryError::InvalidGroupId { group_id })
    }

    fn group_mut(&mut self, group_id: GroupId) -> RecoveryResult<&mut Group> {
        let index = self
            .find_group(group_id)
            .ok_or(RecoveryError::InvalidGroupId { group_id })?;
        self.groups[index]
            .as_mut()
            .ok_or(RecoveryError::InvalidGroupId { group_id })
    }

    /// Creates group `group_id`, or attaches to it when this process already
    /// holds it, then checks that every rank of `comm` agrees on its metadata.
    ///
    /// On attach the communicator is replaced, the existing policy is
    /// re-initialized and `policy`, `timestart` and `depth` are ignored.
    /// Collective over `comm`.
    pub fn group_create(
        &mut self,
        group_id: GroupId,
        comm: Arc<dyn Communicator>,
        timestart: i64,
        depth: i64,
        policy: Box<dyn RecoveryPolicy>,
    ) -> RecoveryResult<()> {
        if timestart < 0 {
            return Err(RecoveryError::InvalidTimestamp {
                timestamp: timestart,
                reason: "timestart must be non-negative",
            });
        }
        let version_capacity = self.config.version_capacity(depth)?;

        let index = match self.find_group(group_id) {
            Some(index) => {
                let group = self.groups[index]
                    .as_mut()
                    .ok_or(RecoveryError::InvalidGroupId { group_id })?;
                group.core.comm = comm;
                group.policy.reinit_group(&mut group.core)?;
                info!(
                    group_id = %group_id,
                    rank = group.core.rank(),
                    timestamp = group.core.timestamp,
                    "group attached"
                );
                index
            }
            None => {
                let index =
                    self.find_next_group_position()
                        .ok_or(RecoveryError::RegistryFull {
                            registry: "group",
                            capacity: self.groups.len(),
                        })?;
                let mut core = GroupCore::new(
                    group_id,
                    comm,
                    timestart,
                    depth,
                    version_capacity,
                    self.config.max_members,
                );
                let mut policy = policy;
                policy.construct_group(&mut core)?;
                info!(
                    group_id = %group_id,
                    rank = core.rank(),
                    depth,
                    policy = policy.name(),
                    "group created"
                );
                self.groups[index] = Some(Group::new(core, policy));
                self.count += 1;
                index
            }
        };

        let registry_count = self.count;
        let group = self.groups[index]
            .as_ref()
            .ok_or(RecoveryError::InvalidGroupId { group_id })?;
        agreement::join_group(&group.core, registry_count)
    }

    /// Deletes group `group_id`; its slot becomes reusable.
    pub fn group_delete(&mut self, group_id: GroupId) -> RecoveryResult<()> {
        let group = self.group_mut(group_id)?;
        group.policy.group_delete(&mut group.core)?;
        group.core.state = SlotState::Deleted;
        self.count -= 1;
        info!(group_id = %group_id, "group deleted");
        Ok(())
    }

    /// Registers `buffer` as member `member_id` of `group_id`, then checks
    /// that every rank registered the same member. Collective.
    pub fn member_create(
        &mut self,
        group_id: GroupId,
        member_id: MemberId,
        buffer: MemberBuffer,
        count: usize,
        datatype: Datatype,
    ) -> RecoveryResult<()> {
        let Group { core, policy } = self.group_mut(group_id)?;
        if core.members.find(member_id).is_some() {
            return Err(RecoveryError::InvalidMemberId {
                group_id,
                member_id,
                reason: "member already exists",
            });
        }
        policy.member_create(
            core,
            MemberSpec {
                id: member_id,
                buffer,
                count,
                datatype,
            },
        )?;
        let member = core
            .members
            .get(member_id)
            .ok_or(RecoveryError::InvalidMemberId {
                group_id,
                member_id,
                reason: "member not registered by policy",
            })?;
        agreement::join_member(core, member)?;
        debug!(group_id = %group_id, member_id = %member_id, count, "member created");
        Ok(())
    }

    /// Deletes a member; its slot becomes reusable and its history is dropped.
    pub fn member_delete(&mut self, group_id: GroupId, member_id: MemberId) -> RecoveryResult<()> {
        let Group { core, policy } = self.group_mut(group_id)?;
        require_member(core, member_id)?;
        policy.member_delete(core, member_id)?;
        core.members.remove(member_id);
        debug!(group_id = %group_id, member_id = %member_id, "member deleted");
        Ok(())
    }

    /// Stores the selected members into their staging slots.
    pub fn member_store(
        &mut self,
        group_id: GroupId,
        selector: MemberSelector,
        region: &StoreRegion,
    ) -> RecoveryResult<()> {
        let Group { core, policy } = self.group_mut(group_id)?;
        let ids = match selector {
            MemberSelector::One(member_id) => {
                require_member(core, member_id)?;
                vec![member_id]
            }
            MemberSelector::All => core.members.live_ids(),
        };
        for member_id in ids {
            policy.member_store(core, member_id, region)?;
        }
        Ok(())
    }

    /// Starts a store of one member; the buffer must not change until the
    /// returned request completes.
    pub fn member_istore(
        &mut self,
        group_id: GroupId,
        member_id: MemberId,
        region: &StoreRegion,
    ) -> RecoveryResult<Request> {
        let Group { core, policy } = self.group_mut(group_id)?;
        require_member(core, member_id)?;
        policy.member_istore(core, member_id, region)
    }

    /// Copies the snapshot labeled `timestamp` ([`LATEST`] for the newest)
    /// into `dest`. Returns the number of elements restored.
    pub fn member_restore(
        &mut self,
        group_id: GroupId,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
    ) -> RecoveryResult<usize> {
        check_restore_timestamp(timestamp)?;
        let Group { core, policy } = self.group_mut(group_id)?;
        require_member(core, member_id)?;
        policy.member_restore(core, member_id, dest, max_count, timestamp)
    }

    /// Like [`member_restore`](Self::member_restore), sourcing the copy held
    /// for `source_rank`.
    pub fn member_restore_from_rank(
        &mut self,
        group_id: GroupId,
        member_id: MemberId,
        dest: &mut [u8],
        max_count: usize,
        timestamp: i64,
        source_rank: usize,
    ) -> RecoveryResult<usize> {
        check_restore_timestamp(timestamp)?;
        let Group { core, policy } = self.group_mut(group_id)?;
        require_member(core, member_id)?;
        if source_rank >= core.comm.size() {
            return Err(RecoveryError::InvalidRank {
                rank: source_rank,
                member_id,
            });
        }
        policy.member_restore_from_rank(core, member_id, dest, max_count, timestamp, source_rank)
    }

    /// Commits the staged snapshots of every member; returns the new timestamp.
    pub fn commit(&mut self, group_id: GroupId) -> RecoveryResult<i64> {
        let Group { core, policy } = self.group_mut(group_id)?;
        policy.commit(core)
    }

    /// [`commit`](Self::commit) preceded by a minimum reduction of the
    /// timestamp across ranks. Collective.
    pub fn commit_barrier(&mut self, group_id: GroupId) -> RecoveryResult<i64> {
        let Group { core, policy } = self.group_mut(group_id)?;
        let min_timestamp = core.comm.all_reduce_min(core.timestamp)?;
        if core.timestamp > min_timestamp {
            warn!(
                group_id = %group_id,
                rank = core.rank(),
                timestamp = core.timestamp,
                min_timestamp,
                "rank ahead of group at commit barrier"
            );
        }
        policy.commit(core)
    }

    /// Rolls every rank back to the newest snapshot all of them hold.
    /// Returns the agreed timestamp. Collective.
    pub fn agree_restore_point(&mut self, group_id: GroupId) -> RecoveryResult<i64> {
        let group = self.group_mut(group_id)?;
        let timestamp = agreement::agree_rollback_point(&mut group.core)?;
        info!(group_id = %group_id, timestamp, "restore point agreed");
        Ok(timestamp)
    }

    /// Aligns every rank on a common committed timestamp before resuming
    /// commits. Same round as [`agree_restore_point`](Self::agree_restore_point).
    pub fn agree_commit_point(&mut self, group_id: GroupId) -> RecoveryResult<i64> {
        let group = self.group_mut(group_id)?;
        let timestamp = agreement::agree_rollback_point(&mut group.core)?;
        info!(group_id = %group_id, timestamp, "commit point agreed");
        Ok(timestamp)
    }

    /// Invalidates the snapshot labeled `timestamp` in every member.
    pub fn snapshot_delete(&mut self, group_id: GroupId, timestamp: i64) -> RecoveryResult<()> {
        if timestamp < 0 {
            return Err(RecoveryError::InvalidTimestamp {
                timestamp,
                reason: "must be non-negative",
            });
        }
        let Group { core, policy } = self.group_mut(group_id)?;
        policy.snapshot_delete(core, timestamp)
    }

    /// Number of live members.
    pub fn member_count(&self, group_id: GroupId) -> RecoveryResult<usize> {
        Ok(self.group(group_id)?.core.members.count())
    }

    /// Id of the member at `position`; 0 is the most recently placed one.
    pub fn member_at_position(&self, group_id: GroupId, position: usize) -> RecoveryResult<MemberId> {
        self.group(group_id)?.core.members.id_at_position(position)
    }

    /// Number of snapshots retained per member.
    pub fn snapshot_count(&self, group_id: GroupId) -> RecoveryResult<usize> {
        Ok(self.group(group_id)?.core.snapshot_count())
    }

    /// Timestamp of the snapshot `position` commits before the newest.
    pub fn snapshot_at_position(&self, group_id: GroupId, position: usize) -> RecoveryResult<i64> {
        let core = &self.group(group_id)?.core;
        let count = core.snapshot_count();
        if position >= count {
            return Err(RecoveryError::InvalidPosition { position, count });
        }
        Ok(core.timestamp - position as i64)
    }

    /// Reads a member attribute.
    pub fn get_attribute(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        attribute: MemberAttribute,
    ) -> RecoveryResult<AttributeValue> {
        let core = &self.group(group_id)?.core;
        let member = core
            .members
            .get(member_id)
            .ok_or(RecoveryError::InvalidMemberId {
                group_id,
                member_id,
                reason: "member does not exist",
            })?;
        Ok(member.attribute(attribute))
    }

    /// Writes a member attribute. Only processes that went through a
    /// recovery may rebind their buffers.
    pub fn set_attribute(
        &mut self,
        group_id: GroupId,
        member_id: MemberId,
        value: AttributeValue,
    ) -> RecoveryResult<()> {
        let Group { core, .. } = self.group_mut(group_id)?;
        let role = core.comm.role();
        if role.is_initial() {
            return Err(RecoveryError::InvalidLogicCall {
                operation: "set_attribute",
                role: role.name(),
            });
        }
        let attribute = value.attribute();
        let member = core
            .members
            .get_mut(member_id)
            .ok_or(RecoveryError::InvalidMemberId {
                group_id,
                member_id,
                reason: "member does not exist",
            })?;
        member.set_attribute(value)?;
        debug!(group_id = %group_id, member_id = %member_id, attribute = attribute.name(), "attribute set");
        Ok(())
    }

    /// Structured view of every group, member and version slot.
    pub fn dump(&self) -> RegistryDump {
        RegistryDump {
            total_size: self.groups.len(),
            count: self.count,
            groups: self
                .groups
                .iter()
                .enumerate()
                .filter_map(|(slot, g)| g.as_ref().map(|g| GroupDump::new(slot, g)))
                .collect(),
        }
    }

    /// [`dump`](Self::dump) rendered as pretty JSON.
    pub fn dump_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.dump())
    }
}
