//! Members of a group and the fixed-capacity slot array that holds them.

use serde::{Deserialize, Serialize};

use crate::buffer::MemberBuffer;
use crate::error::{RecoveryError, RecoveryResult};
use crate::types::{Datatype, MemberId, SlotState};
use crate::version::VersionStore;

/// Attributes that can be queried on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberAttribute {
    /// The registered user buffer.
    Buffer,
    /// Number of elements checkpointed.
    Count,
    /// Element datatype.
    Datatype,
    /// Checkpointed size in bytes; read-only.
    Size,
}

impl MemberAttribute {
    /// Attribute name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            MemberAttribute::Buffer => "BUFFER",
            MemberAttribute::Count => "COUNT",
            MemberAttribute::Datatype => "DATATYPE",
            MemberAttribute::Size => "SIZE",
        }
    }
}

/// Value of a member attribute.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// The registered user buffer.
    Buffer(MemberBuffer),
    /// Number of elements.
    Count(usize),
    /// Element datatype.
    Datatype(Datatype),
    /// Size in bytes.
    Size(usize),
}

impl AttributeValue {
    /// The attribute this value belongs to.
    pub fn attribute(&self) -> MemberAttribute {
        match self {
            AttributeValue::Buffer(_) => MemberAttribute::Buffer,
            AttributeValue::Count(_) => MemberAttribute::Count,
            AttributeValue::Datatype(_) => MemberAttribute::Datatype,
            AttributeValue::Size(_) => MemberAttribute::Size,
        }
    }
}

/// Registration request handed to a policy's member-create hook.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    /// Member id, unique in the group.
    pub id: MemberId,
    /// User buffer to checkpoint.
    pub buffer: MemberBuffer,
    /// Number of elements.
    pub count: usize,
    /// Element datatype.
    pub datatype: Datatype,
}

/// One checkpointed user buffer.
#[derive(Debug, Clone)]
pub struct Member {
    /// Member id.
    pub id: MemberId,
    /// Slot state.
    pub state: SlotState,
    /// User buffer; the application keeps its own handle.
    pub buffer: MemberBuffer,
    /// Number of elements checkpointed.
    pub count: usize,
    /// Element datatype.
    pub datatype: Datatype,
    /// Size of one element in bytes.
    pub datatype_size: usize,
    /// Snapshot history.
    pub versions: VersionStore,
}

impl Member {
    /// Builds a live member from a registration request.
    pub fn new(spec: MemberSpec, version_capacity: usize) -> RecoveryResult<Self> {
        let datatype_size = datatype_size(spec.datatype)?;
        check_fits(MemberAttribute::Count, &spec.buffer, spec.count, datatype_size)?;
        Ok(Self {
            id: spec.id,
            state: SlotState::Occupied,
            buffer: spec.buffer,
            count: spec.count,
            datatype: spec.datatype,
            datatype_size,
            versions: VersionStore::new(version_capacity),
        })
    }

    /// Number of bytes a store copies.
    pub fn size_bytes(&self) -> usize {
        self.count * self.datatype_size
    }

    /// True for members that are neither empty nor deleted.
    pub fn is_live(&self) -> bool {
        self.state == SlotState::Occupied
    }

    /// Reads an attribute.
    pub fn attribute(&self, attribute: MemberAttribute) -> AttributeValue {
        match attribute {
            MemberAttribute::Buffer => AttributeValue::Buffer(self.buffer.clone()),
            MemberAttribute::Count => AttributeValue::Count(self.count),
            MemberAttribute::Datatype => AttributeValue::Datatype(self.datatype),
            MemberAttribute::Size => AttributeValue::Size(self.size_bytes()),
        }
    }

    /// Writes an attribute; on error the member is unchanged.
    ///
    /// The buffer must keep holding `COUNT` elements of the datatype, so
    /// growing a member means rebinding the buffer before raising the count.
    pub fn set_attribute(&mut self, value: AttributeValue) -> RecoveryResult<()> {
        match value {
            AttributeValue::Buffer(buffer) => {
                check_fits(MemberAttribute::Buffer, &buffer, self.count, self.datatype_size)?;
                self.buffer = buffer;
            }
            AttributeValue::Count(count) => {
                check_fits(MemberAttribute::Count, &self.buffer, count, self.datatype_size)?;
                self.count = count;
                self.versions.set_latest_count(count);
            }
            AttributeValue::Datatype(datatype) => {
                let size = datatype_size(datatype)?;
                check_fits(MemberAttribute::Datatype, &self.buffer, self.count, size)?;
                self.datatype = datatype;
                self.datatype_size = size;
            }
            AttributeValue::Size(_) => {
                return Err(RecoveryError::InvalidAttributeName {
                    attribute: MemberAttribute::Size.name(),
                    reason: "attribute is read-only".to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Fails unless `buffer` holds `count` elements of `element_size` bytes.
pub(crate) fn check_fits(
    attribute: MemberAttribute,
    buffer: &MemberBuffer,
    count: usize,
    element_size: usize,
) -> RecoveryResult<()> {
    let available = buffer.len();
    match count.checked_mul(element_size) {
        Some(needed) if needed <= available => Ok(()),
        _ => Err(RecoveryError::InvalidAttributeName {
            attribute: attribute.name(),
            reason: format!(
                "{} elements of {} bytes do not fit in a {}-byte buffer",
                count, element_size, available
            ),
        }),
    }
}

fn datatype_size(datatype: Datatype) -> RecoveryResult<usize> {
    datatype
        .size()
        .ok_or_else(|| RecoveryError::InvalidAttributeName {
            attribute: MemberAttribute::Datatype.name(),
            reason: format!("unsupported datatype {:?}", datatype),
        })
}

/// Fixed-capacity slot array of members.
#[derive(Debug, Clone)]
pub struct MemberRegistry {
    slots: Vec<Option<Member>>,
    count: usize,
}

impl MemberRegistry {
    /// Creates a registry with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            count: 0,
        }
    }

    /// Number of live members.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of slots.
    pub fn total_size(&self) -> usize {
        self.slots.len()
    }

    /// State of the slot at `index`.
    pub fn slot_state(&self, index: usize) -> SlotState {
        match self.slots.get(index) {
            Some(Some(member)) => member.state,
            _ => SlotState::Empty,
        }
    }

    /// Slot index of the live member `id`.
    pub fn find(&self, id: MemberId) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .map(|m| m.is_live() && m.id == id)
                .unwrap_or(false)
        })
    }

    /// First slot that is empty or deleted.
    pub fn find_next_position(&self) -> Option<usize> {
        (0..self.slots.len()).find(|&i| self.slot_state(i).is_reusable())
    }

    /// Places `member` in the first reusable slot; returns the slot index.
    pub fn insert(&mut self, member: Member) -> RecoveryResult<usize> {
        let index = self
            .find_next_position()
            .ok_or(RecoveryError::RegistryFull {
                registry: "member",
                capacity: self.slots.len(),
            })?;
        self.slots[index] = Some(member);
        self.count += 1;
        Ok(index)
    }

    /// Marks the live member `id` deleted and empties its history.
    ///
    /// Returns false when there is no such member.
    pub fn remove(&mut self, id: MemberId) -> bool {
        let Some(index) = self.find(id) else {
            return false;
        };
        if let Some(member) = self.slots[index].as_mut() {
            member.state = SlotState::Deleted;
            member.versions.reset();
        }
        self.count -= 1;
        true
    }

    /// The live member `id`.
    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.find(id).and_then(|i| self.slots[i].as_ref())
    }

    /// The live member `id`, mutably.
    pub fn get_mut(&mut self, id: MemberId) -> Option<&mut Member> {
        let index = self.find(id)?;
        self.slots[index].as_mut()
    }

    /// Member in slot `index`, whatever its state.
    pub fn at_slot(&self, index: usize) -> Option<&Member> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Id of the live member at `position`, counted from the highest
    /// occupied slot backward.
    pub fn id_at_position(&self, position: usize) -> RecoveryResult<MemberId> {
        self.live()
            .rev()
            .nth(position)
            .map(|m| m.id)
            .ok_or(RecoveryError::InvalidPosition {
                position,
                count: self.count,
            })
    }

    /// Live members in slot order.
    pub fn live(&self) -> impl DoubleEndedIterator<Item = &Member> {
        self.slots.iter().flatten().filter(|m| m.is_live())
    }

    /// Live members in slot order, mutably.
    pub fn live_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.slots.iter_mut().flatten().filter(|m| m.is_live())
    }

    /// Ids of the live members in slot order.
    pub fn live_ids(&self) -> Vec<MemberId> {
        self.live().map(|m| m.id).collect()
    }
}
