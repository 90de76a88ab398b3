//! Error types for the communication subsystem.

use thiserror::Error;

/// Result type alias for communicator operations.
pub type CommResult<T> = Result<T, CommError>;

/// Errors surfaced by a communicator or one of its transfers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    /// A peer rank outside the communicator was addressed.
    #[error("invalid rank {rank}: communicator has {size} ranks")]
    InvalidRank {
        /// The rank that was addressed.
        rank: usize,
        /// Number of ranks in the communicator.
        size: usize,
    },

    /// Ranks contributed vectors of different lengths to one reduction.
    #[error("reduction length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch {
        /// Length contributed by the first rank.
        expected: usize,
        /// Length contributed by a later rank.
        got: usize,
    },

    /// The fabric was shut down while an operation was pending.
    #[error("communicator disconnected")]
    Disconnected,

    /// A point-to-point transfer did not complete successfully.
    #[error("transfer failed: {reason}")]
    TransferFailed {
        /// Description of the failure.
        reason: String,
    },
}
