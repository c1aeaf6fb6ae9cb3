//! Coalesced reduce-scatter: average a list of tensors across the group in a
//! single collective call, keeping only this rank's partition of each.
//!
//! The call runs four stages in order:
//! 1. plan each tensor's per-rank partitions ([`PartitionPlan`]);
//! 2. pack the partitions rank-major into one padded transfer buffer and
//!    pre-divide it by the world size;
//! 3. reduce-scatter the buffer with SUM via the strategy chosen at setup;
//! 4. slice this rank's segment back into per-tensor views ([`Partitions`]).

mod pack;
mod plan;
mod strategy;
mod sync;
mod unpack;

pub use plan::{PartitionPlan, TensorLayout};
pub use strategy::{ChunkedStrategy, DirectStrategy, ReduceScatterStrategy, select_strategy};
pub use sync::SyncCoalescer;
pub use unpack::Partitions;

use crate::config::CoalesceConfig;
use crate::error::{CoalesceError, Result};
use crate::reduce::div_slice;
use crate::tensor::Tensor;
use crate::transport::{Capabilities, Transport};
use crate::types::{DataType, Rank};
use std::sync::Arc;

/// Coalesced reduce-scatter bound to one transport.
///
/// Construction probes the transport once: the collective strategy and the
/// set of carried dtypes are fixed for the coalescer's lifetime.
///
/// # Example
///
/// ```no_run
/// use nexar_coalesce::{CoalesceConfig, Coalescer, RingTransport, Tensor};
/// use std::sync::Arc;
///
/// # async fn example() -> nexar_coalesce::Result<()> {
/// let config = CoalesceConfig::default();
/// let mut handles = Vec::new();
/// for transport in RingTransport::local(4, &config)? {
///     let coalescer = Coalescer::with_config(Arc::new(transport), &config)?;
///     handles.push(tokio::spawn(async move {
///         let mut grads = vec![
///             Tensor::from_vec(vec![1.0f32; 10]),
///             Tensor::from_vec(vec![2.0f32; 3]),
///         ];
///         let parts = coalescer.coalesced_reduce_scatter(&mut grads).await?;
///         Ok::<_, nexar_coalesce::CoalesceError>(parts.into_tensors())
///     }));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Coalescer {
    transport: Arc<dyn Transport>,
    capabilities: Capabilities,
    strategy: Box<dyn ReduceScatterStrategy>,
}

impl Coalescer {
    /// Build with default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_config(transport, &CoalesceConfig::default())
    }

    /// Build, probing the transport's capabilities once.
    pub fn with_config(transport: Arc<dyn Transport>, config: &CoalesceConfig) -> Result<Self> {
        let (rank, world_size) = validate_group(transport.as_ref())?;
        let capabilities = transport.capabilities();
        let strategy = select_strategy(Arc::clone(&transport), &capabilities, config);
        tracing::debug!(
            rank,
            world_size,
            strategy = strategy.name(),
            dtypes = ?capabilities.dtypes,
            "coalescer ready"
        );
        Ok(Self {
            transport,
            capabilities,
            strategy,
        })
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    pub fn world_size(&self) -> u32 {
        self.transport.size()
    }

    /// Name of the collective strategy picked at setup (`"direct"` or `"chunked"`).
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Sum every tensor element-wise across the group, divide by the world
    /// size, and return this rank's partition of each result.
    ///
    /// All ranks must call this with the same number of tensors and the same
    /// per-tensor element counts, in the same order.
    ///
    /// When `tensors` is a single tensor whose element count divides evenly
    /// by the world size, its storage is used as the transfer buffer: the
    /// returned partitions borrow it, and its other contents are consumed.
    /// Otherwise the inputs are left untouched.
    pub async fn coalesced_reduce_scatter<'a>(
        &self,
        tensors: &'a mut [Tensor],
    ) -> Result<Partitions<'a>> {
        let (rank, world_size) = validate_group(self.transport.as_ref())?;
        let dtype = self.check_tensors(tensors)?;

        let counts: Vec<usize> = tensors.iter().map(Tensor::numel).collect();
        let plan = PartitionPlan::new(&counts, world_size)?;

        let mut buffer = pack::pack(tensors, &plan);
        div_slice(buffer.as_mut_slice(), dtype, world_size as usize)?;

        tracing::debug!(
            rank,
            world_size,
            tensors = plan.num_tensors(),
            segment_len = plan.segment_len(),
            zero_copy = buffer.is_zero_copy(),
            strategy = self.strategy.name(),
            "coalesced reduce-scatter"
        );

        if plan.segment_len() > 0 {
            self.strategy.execute(buffer.as_mut_slice(), dtype).await?;
        } else {
            tracing::debug!(rank, "all tensors empty, skipping collective");
        }

        Ok(Partitions::unpack(buffer, &plan, rank as usize, dtype))
    }

    /// Local checks: non-empty list, one float dtype the transport carries.
    fn check_tensors(&self, tensors: &[Tensor]) -> Result<DataType> {
        let first = tensors
            .first()
            .ok_or_else(|| CoalesceError::mismatch("empty tensor list"))?;
        let dtype = first.dtype();
        if let Some((idx, other)) = tensors
            .iter()
            .enumerate()
            .find(|(_, t)| t.dtype() != dtype)
        {
            return Err(CoalesceError::mismatch(format!(
                "tensor {idx} has dtype {}, expected {dtype}",
                other.dtype()
            )));
        }
        if !dtype.is_float() {
            return Err(CoalesceError::UnsupportedDType {
                dtype,
                op: "coalesced_reduce_scatter",
            });
        }
        if !self.capabilities.supports(dtype) {
            return Err(CoalesceError::UnsupportedDType {
                dtype,
                op: "transport",
            });
        }
        Ok(dtype)
    }
}

fn validate_group(transport: &dyn Transport) -> Result<(Rank, u32)> {
    let rank = transport.rank();
    let world_size = transport.size();
    if world_size == 0 || rank >= world_size {
        return Err(CoalesceError::InvalidGroup { rank, world_size });
    }
    Ok((rank, world_size))
}
