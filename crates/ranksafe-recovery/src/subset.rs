//! Sub-range descriptors for partial stores.
//!
//! Offsets are in elements of the member's datatype. A single-range specifier
//! repeats one `[start, end)` block `num_blocks` times, `stride` elements
//! apart. A multi-range specifier lists each block explicitly.

use std::ops::Range;

use crate::error::{RecoveryError, RecoveryResult};

/// Converts a validated non-negative value, saturating at `usize::MAX`.
fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Form of a subset specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsetKind {
    /// Freed, or never initialised.
    Undefined,
    /// One block repeated with a stride.
    SingleRange,
    /// Explicit list of blocks.
    MultiRange,
}

/// Describes which elements of a member buffer a store covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetSpecifier {
    num_blocks: usize,
    start_offsets: Vec<usize>,
    end_offsets: Vec<usize>,
    stride: usize,
    kind: SubsetKind,
}

impl SubsetSpecifier {
    /// Single-range specifier: `num_blocks` copies of `[start, end)`, `stride` apart.
    pub fn create(num_blocks: i64, start: i64, end: i64, stride: i64) -> RecoveryResult<Self> {
        if num_blocks <= 0 {
            return Err(RecoveryError::SubsetNumBlocks { num_blocks });
        }
        if start < 0 {
            return Err(RecoveryError::SubsetStartOffset {
                offset: start,
                block: None,
            });
        }
        if end <= 0 || end < start {
            return Err(RecoveryError::SubsetEndOffset {
                offset: end,
                block: None,
            });
        }
        if stride <= 0 {
            return Err(RecoveryError::SubsetStride { stride });
        }
        Ok(Self {
            num_blocks: to_usize(num_blocks),
            start_offsets: vec![to_usize(start)],
            end_offsets: vec![to_usize(end)],
            stride: to_usize(stride),
            kind: SubsetKind::SingleRange,
        })
    }

    /// Multi-range specifier from per-block offsets; the arrays are copied.
    ///
    /// `None` stands for an absent array. The first block whose start is
    /// negative or past its end is reported by index.
    pub fn create_v(
        num_blocks: i64,
        starts: Option<&[i64]>,
        ends: Option<&[i64]>,
    ) -> RecoveryResult<Self> {
        if num_blocks <= 0 {
            return Err(RecoveryError::SubsetNumBlocks { num_blocks });
        }
        let n = to_usize(num_blocks);
        let starts = starts.ok_or(RecoveryError::SubsetStartOffset {
            offset: 0,
            block: None,
        })?;
        let ends = ends.ok_or(RecoveryError::SubsetEndOffset {
            offset: 0,
            block: None,
        })?;
        if starts.len() < n {
            return Err(RecoveryError::SubsetStartOffset {
                offset: 0,
                block: Some(starts.len()),
            });
        }
        if ends.len() < n {
            return Err(RecoveryError::SubsetEndOffset {
                offset: 0,
                block: Some(ends.len()),
            });
        }

        for (block, (&start, &end)) in starts.iter().zip(ends).take(n).enumerate() {
            if start < 0 {
                return Err(RecoveryError::SubsetStartOffset {
                    offset: start,
                    block: Some(block),
                });
            }
            if start > end {
                return Err(RecoveryError::SubsetEndOffset {
                    offset: end,
                    block: Some(block),
                });
            }
        }

        Ok(Self {
            num_blocks: n,
            start_offsets: starts[..n].iter().map(|&s| to_usize(s)).collect(),
            end_offsets: ends[..n].iter().map(|&e| to_usize(e)).collect(),
            stride: 0,
            kind: SubsetKind::MultiRange,
        })
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Form of this specifier.
    pub fn kind(&self) -> SubsetKind {
        self.kind
    }

    /// Distance between block starts of a single-range specifier.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Releases the offset arrays; the specifier becomes undefined.
    pub fn free(&mut self) {
        self.start_offsets = Vec::new();
        self.end_offsets = Vec::new();
        self.num_blocks = 0;
        self.stride = 0;
        self.kind = SubsetKind::Undefined;
    }

    /// Releases the specifier itself.
    pub fn delete(mut self) {
        self.free();
    }

    /// Element ranges covered, clamped to `count` elements, empty blocks skipped.
    ///
    /// Single-range blocks ascend, so iteration stops at the first block that
    /// starts at or past `count` or whose offset does not fit in `usize`.
    pub fn element_ranges(&self, count: usize) -> Vec<Range<usize>> {
        let blocks: Box<dyn Iterator<Item = Range<usize>> + '_> = match self.kind {
            SubsetKind::Undefined => return Vec::new(),
            SubsetKind::SingleRange => {
                let (start, end, stride) =
                    (self.start_offsets[0], self.end_offsets[0], self.stride);
                Box::new((0..self.num_blocks).map_while(move |i| {
                    let shift = i.checked_mul(stride)?;
                    let block_start = start.checked_add(shift)?;
                    (block_start < count).then(|| block_start..end.saturating_add(shift))
                }))
            }
            SubsetKind::MultiRange => Box::new(
                self.start_offsets
                    .iter()
                    .zip(&self.end_offsets)
                    .map(|(&s, &e)| s..e),
            ),
        };
        blocks
            .map(|r| r.start.min(count)..r.end.min(count))
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Concatenation of the covered bytes of `data`.
    pub fn extract(&self, data: &[u8], element_size: usize, count: usize) -> Vec<u8> {
        let count = count.min(data.len() / element_size.max(1));
        let mut out = Vec::new();
        for r in self.element_ranges(count) {
            out.extend_from_slice(&data[r.start * element_size..r.end * element_size]);
        }
        out
    }

    /// Writes `packed` (as produced by [`extract`](Self::extract)) back into
    /// the covered ranges of `dest`; returns the number of bytes written.
    pub fn scatter(&self, packed: &[u8], dest: &mut [u8], element_size: usize, count: usize) -> usize {
        let count = count.min(dest.len() / element_size.max(1));
        let mut read = 0;
        for r in self.element_ranges(count) {
            let len = (r.end - r.start) * element_size;
            if read + len > packed.len() {
                break;
            }
            dest[r.start * element_size..r.end * element_size]
                .copy_from_slice(&packed[read..read + len]);
            read += len;
        }
        read
    }

    /// Copies the covered ranges of `src` over the same ranges of `dest`.
    pub fn overlay(&self, src: &[u8], dest: &mut [u8], element_size: usize, count: usize) {
        let count = count
            .min(src.len() / element_size.max(1))
            .min(dest.len() / element_size.max(1));
        for r in self.element_ranges(count) {
            let bytes = r.start * element_size..r.end * element_size;
            dest[bytes.clone()].copy_from_slice(&src[bytes]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod validation {
        use super::*;

        #[test]
        fn test_create_rejects_zero_blocks() {
            assert!(matches!(
                SubsetSpecifier::create(0, 0, 1, 1),
                Err(RecoveryError::SubsetNumBlocks { num_blocks: 0 })
            ));
        }

        #[test]
        fn test_create_rejects_negative_start() {
            assert!(matches!(
                SubsetSpecifier::create(1, -1, 1, 1),
                Err(RecoveryError::SubsetStartOffset { offset: -1, .. })
            ));
        }

        #[test]
        fn test_create_rejects_non_positive_end() {
            assert!(matches!(
                SubsetSpecifier::create(1, 0, 0, 1),
                Err(RecoveryError::SubsetEndOffset { offset: 0, .. })
            ));
        }

        #[test]
        fn test_create_rejects_non_positive_stride() {
            assert!(matches!(
                SubsetSpecifier::create(2, 0, 4, 0),
                Err(RecoveryError::SubsetStride { stride: 0 })
            ));
        }

        #[test]
        fn test_create_v_reports_bad_block() {
            let err = SubsetSpecifier::create_v(2, Some(&[0, 5][..]), Some(&[3, 2][..])).unwrap_err();
            assert!(matches!(
                err,
                RecoveryError::SubsetEndOffset {
                    block: Some(1),
                    ..
                }
            ));
        }

        #[test]
        fn test_create_v_missing_arrays() {
            assert!(matches!(
                SubsetSpecifier::create_v(1, None, Some(&[1][..])),
                Err(RecoveryError::SubsetStartOffset { block: None, .. })
            ));
            assert!(matches!(
                SubsetSpecifier::create_v(1, Some(&[0][..]), None),
                Err(RecoveryError::SubsetEndOffset { block: None, .. })
            ));
        }

        #[test]
        fn test_create_v_short_array() {
            assert!(matches!(
                SubsetSpecifier::create_v(3, Some(&[0, 1][..]), Some(&[1, 2, 3][..])),
                Err(RecoveryError::SubsetStartOffset { block: Some(2), .. })
            ));
        }

        #[test]
        fn test_create_v_deep_copies() {
            let mut starts = vec![0, 4];
            let spec = SubsetSpecifier::create_v(2, Some(starts.as_slice()), Some(&[2, 6][..])).unwrap();
            starts[0] = 100;
            assert_eq!(spec.element_ranges(10), vec![0..2, 4..6]);
            assert_eq!(spec.kind(), SubsetKind::MultiRange);
        }

        #[test]
        fn test_free_makes_undefined() {
            let mut spec = SubsetSpecifier::create(2, 0, 2, 4).unwrap();
            spec.free();
            assert_eq!(spec.kind(), SubsetKind::Undefined);
            assert!(spec.element_ranges(100).is_empty());
            spec.delete();
        }
    }

    mod ranges {
        use super::*;

        #[test]
        fn test_single_range_strided() {
            let spec = SubsetSpecifier::create(3, 1, 3, 5).unwrap();
            assert_eq!(spec.element_ranges(100), vec![1..3, 6..8, 11..13]);
        }

        #[test]
        fn test_ranges_clamped_to_count() {
            let spec = SubsetSpecifier::create(3, 1, 3, 5).unwrap();
            assert_eq!(spec.element_ranges(7), vec![1..3, 6..7]);
        }

        #[test]
        fn test_stride_near_max_stops_at_count() {
            let spec = SubsetSpecifier::create(4, 0, 1, i64::MAX).unwrap();
            assert_eq!(spec.element_ranges(16), vec![0..1]);
            // Blocks whose offset overflows are dropped.
            assert!(spec.element_ranges(usize::MAX).len() < 4);
        }

        #[test]
        fn test_huge_block_count_stops_at_count() {
            let spec = SubsetSpecifier::create(i64::MAX, 0, 1, 2).unwrap();
            assert_eq!(spec.element_ranges(5), vec![0..1, 2..3, 4..5]);
        }

        #[test]
        fn test_extract_concatenates_blocks() {
            let data: Vec<u8> = (0..10).collect();
            let spec = SubsetSpecifier::create(2, 0, 2, 5).unwrap();
            assert_eq!(spec.extract(&data, 1, 10), vec![0, 1, 5, 6]);
        }

        #[test]
        fn test_extract_multi_byte_elements() {
            let data: Vec<u8> = (0..16).collect();
            let spec = SubsetSpecifier::create_v(1, Some(&[1][..]), Some(&[2][..])).unwrap();
            assert_eq!(spec.extract(&data, 4, 4), vec![4, 5, 6, 7]);
        }

        #[test]
        fn test_overlay_touches_only_ranges() {
            let src = vec![9u8; 6];
            let mut dest = vec![0u8; 6];
            let spec = SubsetSpecifier::create_v(2, Some(&[0, 4][..]), Some(&[1, 6][..])).unwrap();
            spec.overlay(&src, &mut dest, 1, 6);
            assert_eq!(dest, vec![9, 0, 0, 0, 9, 9]);
        }
    }

    proptest! {
        #[test]
        fn test_scatter_inverts_extract(
            data in proptest::collection::vec(any::<u8>(), 1..64),
            start in 0i64..8,
            len in 1i64..8,
            stride in 1i64..16,
            blocks in 1i64..5,
        ) {
            let spec = SubsetSpecifier::create(blocks, start, start + len, stride.max(len)).unwrap();
            let packed = spec.extract(&data, 1, data.len());
            let mut dest = vec![0u8; data.len()];
            let written = spec.scatter(&packed, &mut dest, 1, data.len());
            prop_assert_eq!(written, packed.len());
            for r in spec.element_ranges(data.len()) {
                prop_assert_eq!(&dest[r.clone()], &data[r]);
            }
        }
    }
}
