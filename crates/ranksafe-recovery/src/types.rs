//! Identifiers, slot states and element datatypes shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp argument that selects the most recent committed snapshot.
pub const LATEST: i64 = -1;

/// Identifier of a checkpoint group, chosen by the application.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(i32);

impl GroupId {
    /// Creates a new GroupId from a raw value.
    pub const fn new(id: i32) -> Self {
        GroupId(id)
    }

    /// Returns the raw value.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a member, unique within its group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(i32);

impl MemberId {
    /// Creates a new MemberId from a raw value.
    pub const fn new(id: i32) -> Self {
        MemberId(id)
    }

    /// Returns the raw value.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects the members a store applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberSelector {
    /// A single member.
    One(MemberId),
    /// Every live member of the group.
    All,
}

impl From<MemberId> for MemberSelector {
    fn from(id: MemberId) -> Self {
        MemberSelector::One(id)
    }
}

/// Lifecycle state of a registry slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    /// Never used.
    Empty,
    /// Holds a live entry.
    Occupied,
    /// Held an entry that was deleted; reusable.
    Deleted,
}

impl SlotState {
    /// Integer code used in agreement vectors.
    pub fn code(self) -> i64 {
        match self {
            SlotState::Empty => 0,
            SlotState::Occupied => 1,
            SlotState::Deleted => 2,
        }
    }

    /// True for slots that may be handed out again.
    pub fn is_reusable(self) -> bool {
        !matches!(self, SlotState::Occupied)
    }
}

/// Element type of a member buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    /// Raw bytes.
    Byte,
    /// 8-bit character.
    Char,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// A substrate-defined type the engine cannot size.
    Opaque(u32),
}

impl Datatype {
    /// Size of one element in bytes, or `None` for types the engine cannot handle.
    pub fn size(self) -> Option<usize> {
        match self {
            Datatype::Byte | Datatype::Char => Some(1),
            Datatype::Int16 => Some(2),
            Datatype::Int32 | Datatype::UInt32 | Datatype::Float32 => Some(4),
            Datatype::Int64 | Datatype::UInt64 | Datatype::Float64 => Some(8),
            Datatype::Opaque(_) => None,
        }
    }
}
