//! Error types for the recovery subsystem.
//!
//! Every public operation returns a [`RecoveryResult`]. Each error variant maps
//! to a stable integer [`ErrorCode`] so callers that speak in status codes can
//! keep doing so.

use ranksafe_comm::CommError;
use thiserror::Error;

use crate::types::{GroupId, MemberId};

/// Result type alias for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Stable integer status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Operation completed.
    Success = 0,
    /// The group id does not exist.
    InvalidGroupId = -10,
    /// The member id does not exist, or already exists on create.
    InvalidMemberId = -11,
    /// Timestamp out of range or snapshot not retained.
    InvalidTimestamp = -12,
    /// Depth below -1 or above the configured limit.
    InvalidDepth = -13,
    /// Member position out of range.
    InvalidPosition = -14,
    /// Unknown, read-only or unsupported attribute.
    InvalidAttributeName = -15,
    /// Operation not permitted for the caller's role.
    InvalidLogicCall = -16,
    /// Ranks disagreed on group metadata.
    GroupCreate = -17,
    /// A transfer did not complete successfully.
    DataWait = -18,
    /// Subset block count not positive.
    SubsetNumBlocks = -19,
    /// Subset start offset invalid.
    SubsetStartOffset = -20,
    /// Subset end offset invalid.
    SubsetEndOffset = -21,
    /// Subset stride not positive.
    SubsetStride = -22,
    /// No free group or member slot.
    RegistryFull = -30,
    /// Ranks disagreed on member metadata.
    MemberJoin = -31,
    /// Ranks could not agree on a common restore point.
    RestorePoint = -32,
    /// Source rank holds no copy of the requested snapshot.
    InvalidRank = -33,
    /// The communication substrate failed.
    Communication = -34,
    /// Configuration rejected.
    InvalidConfig = -35,
}

impl ErrorCode {
    /// The raw integer value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Errors that can occur in the recovery subsystem.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No live group with this id.
    #[error("group {group_id} does not exist")]
    InvalidGroupId {
        /// The requested group.
        group_id: GroupId,
    },

    /// No live member with this id, or a duplicate id on create.
    #[error("invalid member {member_id} in group {group_id}: {reason}")]
    InvalidMemberId {
        /// Group that was searched.
        group_id: GroupId,
        /// The offending member id.
        member_id: MemberId,
        /// Whether the member is missing or already exists.
        reason: &'static str,
    },

    /// Timestamp rejected or snapshot no longer retained.
    #[error("invalid timestamp {timestamp}: {reason}")]
    InvalidTimestamp {
        /// The offending timestamp.
        timestamp: i64,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Depth below -1 or above the configured limit.
    #[error("depth {depth} must be between -1 and {max_depth}")]
    InvalidDepth {
        /// The offending depth.
        depth: i64,
        /// Configured upper limit.
        max_depth: i64,
    },

    /// Member position outside `0..count`.
    #[error("position {position} must be between 0 and {count} - 1")]
    InvalidPosition {
        /// The requested position.
        position: usize,
        /// Number of live members.
        count: usize,
    },

    /// Attribute cannot be read or written as requested.
    #[error("invalid attribute {attribute}: {reason}")]
    InvalidAttributeName {
        /// Attribute name.
        attribute: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Operation not permitted for the caller's role.
    #[error("{operation} cannot be called on role {role}")]
    InvalidLogicCall {
        /// The rejected operation.
        operation: &'static str,
        /// The caller's role.
        role: &'static str,
    },

    /// Ranks did not agree on group metadata after create or attach.
    #[error("ranks did not agree on group {group_id}: {fields:?}")]
    GroupCreate {
        /// The group being joined.
        group_id: GroupId,
        /// Fields on which this rank diverged.
        fields: Vec<&'static str>,
    },

    /// Ranks did not agree on member metadata.
    #[error("ranks did not agree on member {member_id} of group {group_id}: {fields:?}")]
    MemberJoin {
        /// Group of the member.
        group_id: GroupId,
        /// The member being joined.
        member_id: MemberId,
        /// Fields on which this rank diverged.
        fields: Vec<&'static str>,
    },

    /// At least one rank found no snapshot that every rank can reach.
    #[error("no common restore point for group {group_id} (min timestamp {min_timestamp})")]
    RestorePoint {
        /// The group being rolled back.
        group_id: GroupId,
        /// Minimum timestamp across ranks.
        min_timestamp: i64,
    },

    /// A non-blocking transfer did not complete successfully.
    #[error("data wait failed: {reason}")]
    DataWait {
        /// Underlying failure.
        reason: String,
    },

    /// Subset block count not positive.
    #[error("subset num_blocks {num_blocks} must be positive")]
    SubsetNumBlocks {
        /// The offending block count.
        num_blocks: i64,
    },

    /// Subset start offset missing or negative.
    #[error("subset start offset {offset} invalid (block {block:?})")]
    SubsetStartOffset {
        /// The offending offset.
        offset: i64,
        /// Block index for multi-range specifiers.
        block: Option<usize>,
    },

    /// Subset end offset missing, not positive or before its start.
    #[error("subset end offset {offset} invalid (block {block:?})")]
    SubsetEndOffset {
        /// The offending offset.
        offset: i64,
        /// Block index for multi-range specifiers.
        block: Option<usize>,
    },

    /// Subset stride not positive.
    #[error("subset stride {stride} must be positive")]
    SubsetStride {
        /// The offending stride.
        stride: i64,
    },

    /// No reusable slot left in a registry.
    #[error("{registry} registry full: capacity {capacity}")]
    RegistryFull {
        /// Which registry overflowed.
        registry: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// The source rank holds no copy of the requested snapshot.
    #[error("rank {rank} holds no copy of member {member_id}")]
    InvalidRank {
        /// The requested source rank.
        rank: usize,
        /// The member being restored.
        member_id: MemberId,
    },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why it was rejected.
        reason: String,
    },

    /// Communication substrate failure.
    #[error("communication error: {0}")]
    Comm(#[from] CommError),
}

impl RecoveryError {
    /// The stable status code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RecoveryError::InvalidGroupId { .. } => ErrorCode::InvalidGroupId,
            RecoveryError::InvalidMemberId { .. } => ErrorCode::InvalidMemberId,
            RecoveryError::InvalidTimestamp { .. } => ErrorCode::InvalidTimestamp,
            RecoveryError::InvalidDepth { .. } => ErrorCode::InvalidDepth,
            RecoveryError::InvalidPosition { .. } => ErrorCode::InvalidPosition,
            RecoveryError::InvalidAttributeName { .. } => ErrorCode::InvalidAttributeName,
            RecoveryError::InvalidLogicCall { .. } => ErrorCode::InvalidLogicCall,
            RecoveryError::GroupCreate { .. } => ErrorCode::GroupCreate,
            RecoveryError::MemberJoin { .. } => ErrorCode::MemberJoin,
            RecoveryError::RestorePoint { .. } => ErrorCode::RestorePoint,
            RecoveryError::DataWait { .. } => ErrorCode::DataWait,
            RecoveryError::SubsetNumBlocks { .. } => ErrorCode::SubsetNumBlocks,
            RecoveryError::SubsetStartOffset { .. } => ErrorCode::SubsetStartOffset,
            RecoveryError::SubsetEndOffset { .. } => ErrorCode::SubsetEndOffset,
            RecoveryError::SubsetStride { .. } => ErrorCode::SubsetStride,
            RecoveryError::RegistryFull { .. } => ErrorCode::RegistryFull,
            RecoveryError::InvalidRank { .. } => ErrorCode::InvalidRank,
            RecoveryError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            RecoveryError::Comm(_) => ErrorCode::Communication,
        }
    }
}

/// Collapses a result into its status code.
pub fn status_of<T>(result: &RecoveryResult<T>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Success,
        Err(e) => e.code(),
    }
}
