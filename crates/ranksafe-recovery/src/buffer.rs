//! User buffers and stored snapshot copies.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::Datatype;

/// Handle to application memory registered as a member.
///
/// The application keeps its own clone and mutates the data between stores;
/// the engine reads it at store time. Cloning shares the same memory.
#[derive(Debug, Clone, Default)]
pub struct MemberBuffer {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemberBuffer {
    /// Wraps `data` as a shared member buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Buffer holding `values` in native byte order.
    pub fn from_i32s(values: &[i32]) -> Self {
        Self::new(values.iter().flat_map(|v| v.to_ne_bytes()).collect())
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    /// Write access to the bytes.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }

    /// Copy of the current bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// True when both handles refer to the same memory.
    pub fn same_buffer(&self, other: &MemberBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// One stored copy of a member's data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferEntry {
    /// Owned snapshot bytes.
    pub data: Vec<u8>,
    /// Number of elements in `data`.
    pub count: usize,
    /// Element type, `None` while the entry is unpopulated.
    pub datatype: Option<Datatype>,
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Rank that owns these bytes.
    pub rank: Option<usize>,
}

impl BufferEntry {
    /// Entry holding `data` produced by `rank`.
    pub fn new(data: Vec<u8>, count: usize, datatype: Datatype, element_size: usize, rank: usize) -> Self {
        Self {
            data,
            count,
            datatype: Some(datatype),
            element_size,
            rank: Some(rank),
        }
    }

    /// True once a copy has been written into this entry.
    pub fn is_populated(&self) -> bool {
        self.rank.is_some()
    }

    /// Copies at most `max_count` elements into `dest`, returning the number copied.
    ///
    /// Copying stops early when `dest` cannot hold a whole element more.
    pub fn copy_into(&self, dest: &mut [u8], max_count: usize) -> usize {
        if self.element_size == 0 {
            return 0;
        }
        let elements = self
            .count
            .min(max_count)
            .min(dest.len() / self.element_size)
            .min(self.data.len() / self.element_size);
        let bytes = elements * self.element_size;
        dest[..bytes].copy_from_slice(&self.data[..bytes]);
        elements
    }
}
