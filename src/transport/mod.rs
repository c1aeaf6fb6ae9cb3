//! Collaborator interfaces the coalescer consumes, plus a reference ring
//! transport over pluggable point-to-point links.

mod link;
mod ring;
mod tcp;

pub use link::{BulkLink, ChannelLink};
pub use ring::RingTransport;
pub use tcp::{TcpLink, tcp_link_accept, tcp_link_connect, tcp_link_listen};

use crate::error::{CoalesceError, Result};
use crate::types::{DataType, Rank, ReduceOp};
use futures::future::BoxFuture;

/// Membership view of a communication group.
///
/// Rank assignment happens elsewhere; callers only read it.
pub trait Group: Send + Sync {
    /// This participant's rank in `[0, size())`.
    fn rank(&self) -> Rank;

    /// Number of participants.
    fn size(&self) -> u32;
}

/// What a transport can do, reported once at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// The transport implements [`Transport::reduce_scatter_flat`].
    pub flat_reduce_scatter: bool,
    /// Element types the transport can carry and reduce.
    pub dtypes: Vec<DataType>,
}

impl Capabilities {
    /// Direct primitive available, every dtype carried.
    pub fn full() -> Self {
        Self {
            flat_reduce_scatter: true,
            dtypes: DataType::ALL.to_vec(),
        }
    }

    /// Only the chunk-list primitive, every dtype carried.
    pub fn chunks_only() -> Self {
        Self {
            flat_reduce_scatter: false,
            dtypes: DataType::ALL.to_vec(),
        }
    }

    pub fn supports(&self, dtype: DataType) -> bool {
        self.dtypes.contains(&dtype)
    }
}

/// A reduce-scatter capable communication substrate.
///
/// Both primitives share one contract: the input is logically split into
/// `size()` equal segments, reduced element-wise with `op` across the group,
/// and this rank receives segment `rank()` of the result.
pub trait Transport: Group {
    /// Capability probe. Called once when a coalescer is built.
    fn capabilities(&self) -> Capabilities;

    /// Direct form: reduce-scatter `buffer` in place.
    ///
    /// On return, `buffer[rank * seg..(rank + 1) * seg]` (with
    /// `seg = buffer.len() / size()`) holds this rank's reduced segment. The
    /// other segments are scratch and their contents are unspecified.
    ///
    /// Transports without the direct primitive keep the default, which fails.
    fn reduce_scatter_flat<'a>(
        &'a self,
        buffer: &'a mut [u8],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>> {
        let _ = (buffer, dtype, op);
        Box::pin(async {
            Err(CoalesceError::transport(
                "direct reduce-scatter is not provided by this transport",
            ))
        })
    }

    /// Chunk-list form: `chunks[i]` is segment `i`; the result for this
    /// rank is written into `output`.
    ///
    /// The transport may use `chunks` as scratch space.
    fn reduce_scatter_chunks<'a>(
        &'a self,
        output: &'a mut [u8],
        chunks: &'a mut [Vec<u8>],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>>;
}

impl<T: Group + ?Sized> Group for std::sync::Arc<T> {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn size(&self) -> u32 {
        (**self).size()
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn reduce_scatter_flat<'a>(
        &'a self,
        buffer: &'a mut [u8],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).reduce_scatter_flat(buffer, dtype, op)
    }

    fn reduce_scatter_chunks<'a>(
        &'a self,
        output: &'a mut [u8],
        chunks: &'a mut [Vec<u8>],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).reduce_scatter_chunks(output, chunks, dtype, op)
    }
}
