use crate::coalesce::plan::PartitionPlan;
use crate::tensor::Tensor;

/// The contiguous buffer handed to the collective.
///
/// Laid out rank-major, tensor-minor: segment `r` holds, for each tensor in
/// call order, rank `r`'s partition followed by zero padding up to the
/// tensor's chunk size.
pub(crate) enum TransferBuffer<'a> {
    /// The caller's single, evenly divisible tensor, used in place.
    Borrowed(&'a mut [u8]),
    /// A freshly packed buffer.
    Owned(Vec<u8>),
}

impl TransferBuffer<'_> {
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            TransferBuffer::Borrowed(b) => b,
            TransferBuffer::Owned(v) => v,
        }
    }

    pub(crate) fn is_zero_copy(&self) -> bool {
        matches!(self, TransferBuffer::Borrowed(_))
    }
}

/// Build the transfer buffer for `tensors` according to `plan`.
///
/// All tensors must share one dtype; the caller checks this.
pub(crate) fn pack<'a>(tensors: &'a mut [Tensor], plan: &PartitionPlan) -> TransferBuffer<'a> {
    debug_assert_eq!(tensors.len(), plan.num_tensors());

    if plan.is_zero_copy() {
        return TransferBuffer::Borrowed(tensors[0].as_bytes_mut());
    }

    let elem_size = tensors.first().map_or(1, |t| t.dtype().size_in_bytes());
    // Zero-initialised, so padding needs no separate fill.
    let mut buf = vec![0u8; plan.buffer_len() * elem_size];
    let seg_bytes = plan.segment_len() * elem_size;

    for rank in 0..plan.world_size() {
        let segment = &mut buf[rank * seg_bytes..(rank + 1) * seg_bytes];
        for (t, (tensor, layout)) in tensors.iter().zip(plan.layouts()).enumerate() {
            let range = plan.range(t, rank);
            let src = &tensor.as_bytes()[range.start * elem_size..range.end * elem_size];
            let dst_off = layout.offset * elem_size;
            segment[dst_off..dst_off + src.len()].copy_from_slice(src);
        }
    }

    TransferBuffer::Owned(buf)
}
