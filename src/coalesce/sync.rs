use crate::coalesce::{Coalescer, Partitions};
use crate::config::CoalesceConfig;
use crate::error::{CoalesceError, Result};
use crate::tensor::Tensor;
use crate::transport::RingTransport;
use crate::types::Rank;
use std::sync::Arc;

/// Blocking wrapper around [`Coalescer`].
///
/// Owns a `tokio::runtime::Runtime` and calls `block_on()` for each operation.
pub struct SyncCoalescer {
    inner: Coalescer,
    rt: tokio::runtime::Runtime,
}

impl SyncCoalescer {
    /// Build an in-process ring and return one blocking coalescer per rank.
    ///
    /// Each rank gets its own runtime since `block_on` is exclusive; run the
    /// ranks on separate threads.
    pub fn bootstrap_local(world_size: u32, config: &CoalesceConfig) -> Result<Vec<Self>> {
        RingTransport::local(world_size, config)?
            .into_iter()
            .map(|t| Self::from_async(Coalescer::with_config(Arc::new(t), config)?))
            .collect()
    }

    /// Wrap an existing coalescer with a new tokio runtime.
    pub fn from_async(inner: Coalescer) -> Result<Self> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| CoalesceError::transport_with_source("tokio runtime", e))?;
        Ok(Self { inner, rt })
    }

    pub fn rank(&self) -> Rank {
        self.inner.rank()
    }

    pub fn world_size(&self) -> u32 {
        self.inner.world_size()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.inner.strategy_name()
    }

    /// Blocking [`Coalescer::coalesced_reduce_scatter`].
    pub fn coalesced_reduce_scatter<'a>(&self, tensors: &'a mut [Tensor]) -> Result<Partitions<'a>> {
        self.rt
            .block_on(self.inner.coalesced_reduce_scatter(tensors))
    }
}
