//! The communicator contract the recovery engine depends on.

use serde::{Deserialize, Serialize};

use crate::error::{CommError, CommResult};
use crate::reduce::{MinOp, ReduceOp};
use crate::transfer::Transfer;

/// How the calling process came to be part of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Original process of a job that has not been through a recovery yet.
    Initial,
    /// Process spawned to replace a failed rank.
    Recovered,
    /// Original process that survived a failure of some other rank.
    Survivor,
}

impl Role {
    /// Returns true for a process launched with the job that never went through recovery.
    pub fn is_initial(self) -> bool {
        matches!(self, Role::Initial)
    }

    /// Lowercase name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Role::Initial => "initial",
            Role::Recovered => "recovered",
            Role::Survivor => "survivor",
        }
    }
}

/// Handle over the set of ranks that coordinate for one checkpoint group.
///
/// Collective operations must be called by every rank of the communicator in
/// the same order; a rank that skips one blocks the others indefinitely.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;

    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// Role of the calling process.
    fn role(&self) -> Role;

    /// Element-wise all-reduce of `local` across all ranks with `op`.
    ///
    /// Every rank must contribute a vector of the same length; every rank
    /// receives the same reduced vector.
    fn all_reduce(&self, local: &[i64], op: &dyn ReduceOp) -> CommResult<Vec<i64>>;

    /// Starts a non-blocking send of `payload` to `dest` with message `tag`.
    fn isend(&self, dest: usize, tag: u32, payload: Vec<u8>) -> CommResult<Box<dyn Transfer>>;

    /// Starts a non-blocking receive from `source` with message `tag`.
    fn irecv(&self, source: usize, tag: u32) -> CommResult<Box<dyn Transfer>>;

    /// Minimum of `value` across all ranks.
    fn all_reduce_min(&self, value: i64) -> CommResult<i64> {
        let reduced = self.all_reduce(&[value], &MinOp)?;
        reduced.first().copied().ok_or(CommError::LengthMismatch {
            expected: 1,
            got: 0,
        })
    }
}
