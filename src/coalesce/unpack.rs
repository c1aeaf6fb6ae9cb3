use crate::coalesce::pack::TransferBuffer;
use crate::coalesce::plan::PartitionPlan;
use crate::tensor::{Tensor, TensorView};
use crate::types::DataType;
use std::ops::Range;

enum Storage<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

/// This rank's reduced partitions, one per input tensor, in call order.
///
/// Each partition is a flat run of `partition_len(t, rank)` elements; the
/// padding that rides along in the transfer segment is never exposed. In
/// the zero-copy case the partitions borrow the caller's tensor storage.
pub struct Partitions<'a> {
    storage: Storage<'a>,
    segment: Range<usize>,
    /// Byte ranges into `storage`, one per tensor.
    views: Vec<Range<usize>>,
    dtype: DataType,
}

impl<'a> Partitions<'a> {
    /// Slice this rank's segment of `buffer` into per-tensor partitions.
    pub(crate) fn unpack(
        buffer: TransferBuffer<'a>,
        plan: &PartitionPlan,
        rank: usize,
        dtype: DataType,
    ) -> Self {
        let elem_size = dtype.size_in_bytes();
        let seg_start = rank * plan.segment_len() * elem_size;
        let segment = seg_start..seg_start + plan.segment_len() * elem_size;

        let mut views = Vec::with_capacity(plan.num_tensors());
        let mut offset = seg_start;
        for (t, layout) in plan.layouts().iter().enumerate() {
            let len = plan.partition_len(t, rank) * elem_size;
            views.push(offset..offset + len);
            offset += layout.chunk * elem_size;
        }
        debug_assert_eq!(offset, segment.end);

        let storage = match buffer {
            TransferBuffer::Borrowed(b) => Storage::Borrowed(b),
            TransferBuffer::Owned(v) => Storage::Owned(v),
        };

        Self {
            storage,
            segment,
            views,
            dtype,
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Borrowed(b) => b,
            Storage::Owned(v) => v,
        }
    }

    /// Number of partitions (equals the number of input tensors).
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Whether the partitions alias the caller's tensor.
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_))
    }

    /// Partition of tensor `index`.
    pub fn get(&self, index: usize) -> Option<TensorView<'_>> {
        let range = self.views.get(index)?.clone();
        Some(TensorView::new(&self.bytes()[range], self.dtype))
    }

    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> + '_ {
        let bytes = self.bytes();
        self.views
            .iter()
            .map(move |r| TensorView::new(&bytes[r.clone()], self.dtype))
    }

    /// The whole rank segment, padding included.
    pub fn segment_bytes(&self) -> &[u8] {
        &self.bytes()[self.segment.clone()]
    }

    /// Copy every partition into an owned 1-D tensor.
    pub fn into_tensors(self) -> Vec<Tensor> {
        self.iter().map(|v| v.to_tensor()).collect()
    }
}

impl std::fmt::Debug for Partitions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lens: Vec<usize> = self.iter().map(|v| v.numel()).collect();
        f.debug_struct("Partitions")
            .field("dtype", &self.dtype)
            .field("lens", &lens)
            .field("zero_copy", &self.is_zero_copy())
            .finish()
    }
}
