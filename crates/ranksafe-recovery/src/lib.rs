#![warn(missing_docs)]

//! RankSafe recovery subsystem: versioned member checkpoints, cross-rank agreement, restore-point selection
//!
//! Applications register named buffers (members) inside checkpoint groups,
//! store and commit them to versioned in-memory snapshots, and after a rank
//! failure agree on a timestamp every rank can roll back to. Where copies
//! live is decided by a pluggable [`RecoveryPolicy`]; [`LocalPolicy`] keeps
//! each rank's own snapshots.

pub mod agreement;
pub mod buffer;
pub mod config;
pub mod dump;
pub mod error;
pub mod group;
pub mod local_policy;
pub mod member;
pub mod policy;
pub mod recovery;
pub mod request;
pub mod subset;
pub mod types;
pub mod version;

pub use agreement::{agree_rollback_point, join_group, join_member, rollback_offset};
pub use buffer::{BufferEntry, MemberBuffer};
pub use config::RecoveryConfig;
pub use dump::{GroupDump, MemberDump, RegistryDump, SnapshotDump, VersionDump};
pub use error::{status_of, ErrorCode, RecoveryError, RecoveryResult};
pub use group::{Group, GroupCore};
pub use local_policy::LocalPolicy;
pub use member::{AttributeValue, Member, MemberAttribute, MemberRegistry, MemberSpec};
pub use policy::{RecoveryPolicy, StoreRegion};
pub use recovery::DataRecovery;
pub use request::Request;
pub use subset::{SubsetKind, SubsetSpecifier};
pub use types::{Datatype, GroupId, MemberId, MemberSelector, SlotState, LATEST};
pub use version::{VersionSlot, VersionStore};
