//! Partition planning: which slice of each flattened tensor belongs to which
//! rank, and where each slice sits inside a rank's transfer segment.

use crate::error::{CoalesceError, Result};
use std::ops::Range;

/// Placement of one tensor in the transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLayout {
    /// Element count of the flattened tensor.
    pub numel: usize,
    /// `ceil(numel / world_size)`: padded chunk length, identical on every rank.
    pub chunk: usize,
    /// Element offset of this tensor's chunk inside a rank segment.
    pub offset: usize,
}

/// Chunk sizes and partition ranges for an ordered list of tensors.
///
/// Rank `r` owns `[min(r*C, N), min((r+1)*C, N))` of a tensor with `N`
/// elements and chunk size `C`. Trailing ranks may own a short or empty
/// range; no rank owns more than `C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    world_size: usize,
    layouts: Vec<TensorLayout>,
    segment_len: usize,
}

impl PartitionPlan {
    /// Plan `counts` (flattened element counts, in call order) over
    /// `world_size` ranks.
    pub fn new(counts: &[usize], world_size: u32) -> Result<Self> {
        if world_size == 0 {
            return Err(CoalesceError::InvalidGroup {
                rank: 0,
                world_size,
            });
        }
        let world = world_size as usize;
        let mut offset = 0;
        let layouts = counts
            .iter()
            .map(|&numel| {
                let chunk = numel.div_ceil(world);
                let layout = TensorLayout {
                    numel,
                    chunk,
                    offset,
                };
                offset += chunk;
                layout
            })
            .collect();
        Ok(Self {
            world_size: world,
            layouts,
            segment_len: offset,
        })
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn num_tensors(&self) -> usize {
        self.layouts.len()
    }

    pub fn layouts(&self) -> &[TensorLayout] {
        &self.layouts
    }

    pub fn chunk_size(&self, tensor: usize) -> usize {
        self.layouts[tensor].chunk
    }

    /// Elements in one rank segment: `Σ chunk`.
    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Elements in the whole transfer buffer: `world_size * segment_len`.
    pub fn buffer_len(&self) -> usize {
        self.world_size * self.segment_len
    }

    /// Range of the flattened tensor owned by `rank`.
    pub fn range(&self, tensor: usize, rank: usize) -> Range<usize> {
        let TensorLayout { numel, chunk, .. } = self.layouts[tensor];
        let start = (rank * chunk).min(numel);
        let end = ((rank + 1) * chunk).min(numel);
        start..end
    }

    /// Unpadded length of `rank`'s partition of `tensor`.
    pub fn partition_len(&self, tensor: usize, rank: usize) -> usize {
        self.range(tensor, rank).len()
    }

    /// A single tensor that splits evenly needs no padding and can serve as
    /// its own transfer buffer.
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.layouts.as_slice(), [only] if only.numel % self.world_size == 0)
    }
}
