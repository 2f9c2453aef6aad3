//! Index compaction for indexed draws.
//!
//! An index buffer like `500, 501, 502, 501, 503, 502` can't be used as-is against a tightly
//! packed stream-out buffer without padding 500 vertices of garbage in front. Instead the draw is
//! re-issued over the sorted set of unique indices, so the GPU shades exactly one vertex per
//! distinct input vertex, and the original index stream is rewritten to point at each vertex's
//! position within that set ("compact index"):
//!
//! ```text
//! original:  500 501 502 510 511 512 501
//! unique:    500 501 502 510 511 512
//! rewritten:   0   1   2   3   4   5   1
//! ```
//!
//! The remap is kept as an ordered map rather than a table indexed by value: garbage indices such
//! as `0xcccccccc` would otherwise require billions of entries.

use std::collections::BTreeMap;

use crate::action::IndexWidth;

/// Decodes up to `max_count` little-endian indices of `width` from `bytes`.
///
/// Trailing bytes that don't form a whole index are ignored.
pub fn decode_indices(bytes: &[u8], width: IndexWidth, max_count: u32) -> Vec<u32> {
    let limit = max_count as usize;
    match width {
        IndexWidth::U16 => bytes
            .chunks_exact(2)
            .take(limit)
            .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
            .collect(),
        IndexWidth::U32 => bytes
            .chunks_exact(4)
            .take(limit)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

/// Result of compacting one indexed draw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexCompaction {
    /// Sorted, de-duplicated index values the draw references.
    unique: Vec<u32>,
    /// Original index value → position in `unique`.
    remap: BTreeMap<u32, u32>,
    /// Number of indices actually read from the index buffer.
    read_count: u32,
    /// Whether index 0 was added because part of the draw reads out of bounds.
    implicit_zero: bool,
}

impl IndexCompaction {
    /// Compacts `indices`, the indices that could be read for a draw declaring `declared_count`.
    ///
    /// When fewer indices were read than declared, the missing ones fetch as 0 on the GPU, so
    /// index 0 is made part of the unique set.
    pub fn new(indices: &[u32], declared_count: u32) -> Self {
        let mut unique: Vec<u32> = Vec::new();
        for &idx in indices {
            if let Err(pos) = unique.binary_search(&idx) {
                unique.insert(pos, idx);
            }
        }

        let read_count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        let mut implicit_zero = false;
        if read_count < declared_count && unique.first() != Some(&0) {
            unique.insert(0, 0);
            implicit_zero = true;
        }

        let remap = unique
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (idx, pos as u32))
            .collect();

        Self {
            unique,
            remap,
            read_count,
            implicit_zero,
        }
    }

    /// The compact index list to draw with.
    pub fn unique(&self) -> &[u32] {
        &self.unique
    }

    pub fn unique_count(&self) -> u32 {
        self.unique.len() as u32
    }

    pub fn read_count(&self) -> u32 {
        self.read_count
    }

    pub fn added_implicit_zero(&self) -> bool {
        self.implicit_zero
    }

    /// Compact index for an original index value.
    pub fn compact_index(&self, original: u32) -> Option<u32> {
        self.remap.get(&original).copied()
    }

    /// The unique set as little-endian `u32`s, ready to upload as an index buffer.
    pub fn unique_bytes(&self) -> Vec<u8> {
        self.unique.iter().flat_map(|i| i.to_le_bytes()).collect()
    }

    /// Rewrites an index stream of `width` in place so every index refers to its compact index.
    ///
    /// Indices equal to `restart` are left untouched so strips keep their cuts. Only the first
    /// `read_count` indices are rewritten.
    pub fn rewrite(&self, bytes: &mut [u8], width: IndexWidth, restart: Option<u32>) {
        let limit = self.read_count as usize;
        match width {
            IndexWidth::U16 => {
                for chunk in bytes.chunks_exact_mut(2).take(limit) {
                    let idx = u32::from(u16::from_le_bytes([chunk[0], chunk[1]]));
                    if restart == Some(idx) {
                        continue;
                    }
                    let compact = self.compact_index(idx).unwrap_or(0) as u16;
                    chunk.copy_from_slice(&compact.to_le_bytes());
                }
            }
            IndexWidth::U32 => {
                for chunk in bytes.chunks_exact_mut(4).take(limit) {
                    let idx = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    if restart == Some(idx) {
                        continue;
                    }
                    let compact = self.compact_index(idx).unwrap_or(0);
                    chunk.copy_from_slice(&compact.to_le_bytes());
                }
            }
        }
    }
}
