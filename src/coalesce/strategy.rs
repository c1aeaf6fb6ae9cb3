//! Collective execution strategies, chosen once per coalescer.

use crate::config::CoalesceConfig;
use crate::error::Result;
use crate::transport::{Capabilities, Transport};
use crate::types::{DataType, ReduceOp};
use futures::future::BoxFuture;
use std::sync::{Arc, Once};

static CHUNKED_FALLBACK_WARNING: Once = Once::new();

/// Runs the SUM reduce-scatter on a packed transfer buffer.
///
/// On success, segment `rank` of `buffer` holds this rank's reduced segment.
pub trait ReduceScatterStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, buffer: &'a mut [u8], dtype: DataType)
    -> BoxFuture<'a, Result<()>>;
}

/// Hands the flat buffer straight to the transport.
pub struct DirectStrategy {
    transport: Arc<dyn Transport>,
}

impl DirectStrategy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ReduceScatterStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn execute<'a>(
        &'a self,
        buffer: &'a mut [u8],
        dtype: DataType,
    ) -> BoxFuture<'a, Result<()>> {
        self.transport
            .reduce_scatter_flat(buffer, dtype, ReduceOp::Sum)
    }
}

/// Splits the buffer into per-rank chunks for a transport that only offers
/// the chunk-list primitive.
///
/// The chunks and the output segment are copies: the transport may mutate
/// its inputs, and the output segment lives inside the input buffer.
pub struct ChunkedStrategy {
    transport: Arc<dyn Transport>,
}

impl ChunkedStrategy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        CHUNKED_FALLBACK_WARNING.call_once(|| {
            tracing::warn!(
                "transport has no direct flat-buffer reduce-scatter; falling back to the \
                 chunk-list form, which costs two extra buffer copies per call"
            );
        });
        Self { transport }
    }
}

impl ReduceScatterStrategy for ChunkedStrategy {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn execute<'a>(
        &'a self,
        buffer: &'a mut [u8],
        dtype: DataType,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let world = self.transport.size() as usize;
            let rank = self.transport.rank() as usize;
            let seg_bytes = buffer.len() / world;

            let mut chunks: Vec<Vec<u8>> = (0..world)
                .map(|i| buffer[i * seg_bytes..(i + 1) * seg_bytes].to_vec())
                .collect();
            let own = rank * seg_bytes..(rank + 1) * seg_bytes;
            let mut output = buffer[own.clone()].to_vec();

            self.transport
                .reduce_scatter_chunks(&mut output, &mut chunks, dtype, ReduceOp::Sum)
                .await?;

            buffer[own].copy_from_slice(&output);
            Ok(())
        })
    }
}

/// Pick a strategy from a capability probe.
pub fn select_strategy(
    transport: Arc<dyn Transport>,
    capabilities: &Capabilities,
    config: &CoalesceConfig,
) -> Box<dyn ReduceScatterStrategy> {
    if capabilities.flat_reduce_scatter && !config.force_chunked {
        return Box::new(DirectStrategy::new(transport));
    }
    if config.force_chunked && capabilities.flat_reduce_scatter {
        tracing::info!("chunked reduce-scatter forced by config");
    }
    Box::new(ChunkedStrategy::new(transport))
}
