//! Cross-rank agreement rounds.
//!
//! Join rounds check that every rank holds the same group or member metadata.
//! They detect divergence and never repair it. The rollback round picks the
//! newest snapshot that every rank still holds and rewinds every member to it.
//!
//! All functions here are collective: every rank of the group's communicator
//! must call them in the same order.

use ranksafe_comm::{AgreeOp, Communicator};
use tracing::{debug, warn};

use crate::error::{RecoveryError, RecoveryResult};
use crate::group::GroupCore;
use crate::member::Member;

const GROUP_FIELDS: [&str; 5] = ["count", "id", "timestamp", "depth", "state"];
const MEMBER_FIELDS: [&str; 3] = ["member_count", "member_id", "member_state"];

/// Runs one agree all-reduce over `local` and returns the names of the
/// fields on which the ranks disagreed.
///
/// Every rank receives the same reduced vector, so every rank reports the
/// same fields.
fn disagreeing_fields(
    comm: &dyn Communicator,
    local: &[i64],
    names: &[&'static str],
) -> RecoveryResult<Vec<&'static str>> {
    let agreed = comm.all_reduce(local, &AgreeOp)?;
    Ok(local
        .iter()
        .zip(&agreed)
        .zip(names)
        .filter(|((mine, common), _)| mine != common)
        .map(|(_, name)| *name)
        .collect())
}

/// Checks that every rank holds the same group metadata.
///
/// `registry_count` is the number of live groups in this rank's registry.
pub fn join_group(group: &GroupCore, registry_count: usize) -> RecoveryResult<()> {
    let local = [
        registry_count as i64,
        i64::from(group.id.as_i32()),
        group.timestamp,
        group.depth,
        group.state.code(),
    ];
    let fields = disagreeing_fields(group.comm.as_ref(), &local, &GROUP_FIELDS)?;
    if fields.is_empty() {
        debug!(group_id = %group.id, timestamp = group.timestamp, "group join agreed");
        return Ok(());
    }
    for &field in &fields {
        warn!(group_id = %group.id, rank = group.rank(), field, "group metadata diverged");
    }
    Err(RecoveryError::GroupCreate {
        group_id: group.id,
        fields,
    })
}

/// Checks that every rank holds the same metadata for `member`.
pub fn join_member(group: &GroupCore, member: &Member) -> RecoveryResult<()> {
    let local = [
        group.members.count() as i64,
        i64::from(member.id.as_i32()),
        member.state.code(),
    ];
    let fields = disagreeing_fields(group.comm.as_ref(), &local, &MEMBER_FIELDS)?;
    if fields.is_empty() {
        return Ok(());
    }
    for &field in &fields {
        warn!(
            group_id = %group.id,
            member_id = %member.id,
            rank = group.rank(),
            field,
            "member metadata diverged"
        );
    }
    Err(RecoveryError::MemberJoin {
        group_id: group.id,
        member_id: member.id,
        fields,
    })
}

/// Number of commits to step back from `timestamp` to reach
/// `min_timestamp`, or `None` when that snapshot is outside the retention
/// window or no longer held.
///
/// A negative `depth` disables the window check; `num_copies` still bounds
/// how far back the history reaches.
pub fn rollback_offset(
    timestamp: i64,
    min_timestamp: i64,
    depth: i64,
    num_copies: usize,
) -> Option<usize> {
    let offset = usize::try_from(timestamp - min_timestamp).ok()?;
    let in_window = depth < 0 || min_timestamp > timestamp - depth;
    (in_window && offset < num_copies).then_some(offset)
}

/// Agrees on the minimum timestamp across ranks and rewinds every member
/// of this rank to it. Returns the agreed timestamp.
///
/// Ranks fail together: if any rank cannot reach the minimum, no rank
/// rewinds and every rank gets [`RecoveryError::RestorePoint`]. Calling it
/// again once ranks agree is a no-op.
pub fn agree_rollback_point(group: &mut GroupCore) -> RecoveryResult<i64> {
    let min_timestamp = group.comm.all_reduce_min(group.timestamp)?;
    let window = rollback_offset(group.timestamp, min_timestamp, group.depth, usize::MAX);
    let valid = window.is_some()
        && group.members.live().all(|m| {
            rollback_offset(
                group.timestamp,
                min_timestamp,
                group.depth,
                m.versions.num_copies(),
            )
            .is_some()
        });

    let all_valid = group.comm.all_reduce_min(i64::from(valid))? == 1;
    if !all_valid {
        warn!(
            group_id = %group.id,
            rank = group.rank(),
            timestamp = group.timestamp,
            min_timestamp,
            locally_valid = valid,
            "no common restore point"
        );
        return Err(RecoveryError::RestorePoint {
            group_id: group.id,
            min_timestamp,
        });
    }

    let offset = window.unwrap_or(0);
    for member in group.members.live_mut() {
        member.versions.rewind(offset);
    }
    debug!(
        group_id = %group.id,
        from = group.timestamp,
        to = min_timestamp,
        offset,
        "rolled back to common restore point"
    );
    group.timestamp = min_timestamp;
    Ok(min_timestamp)
}
