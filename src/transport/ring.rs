use crate::config::CoalesceConfig;
use crate::error::{CoalesceError, Result};
use crate::reduce::reduce_slice;
use crate::transport::{
    BulkLink, Capabilities, ChannelLink, Group, Transport, tcp_link_accept, tcp_link_connect,
    tcp_link_listen,
};
use crate::types::{DataType, Rank, ReduceOp};
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Reference transport: ring reduce-scatter over point-to-point links.
///
/// Each rank holds a link to its successor (`rank + 1`) and one from its
/// predecessor (`rank - 1`). A reduce-scatter takes `size() - 1` rounds; in
/// each round every rank forwards one partially reduced segment and folds the
/// segment it receives into its buffer.
///
/// Collectives on one transport are serialized in the order they reach it.
/// Callers that overlap calls must issue them in the same order on every
/// rank, otherwise ranks pair up different operations.
pub struct RingTransport {
    rank: Rank,
    world_size: u32,
    next: Option<Arc<dyn BulkLink>>,
    prev: Option<Arc<dyn BulkLink>>,
    timeout: Duration,
    capabilities: Capabilities,
    /// Held for a whole reduce-scatter so overlapping calls never share links.
    op_lock: Mutex<()>,
}

impl RingTransport {
    /// Build one rank of a ring from existing links.
    ///
    /// `next` and `prev` may be `None` only when `world_size == 1`.
    pub fn new(
        rank: Rank,
        world_size: u32,
        next: Option<Arc<dyn BulkLink>>,
        prev: Option<Arc<dyn BulkLink>>,
        config: &CoalesceConfig,
    ) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(CoalesceError::InvalidGroup { rank, world_size });
        }
        if world_size > 1 && (next.is_none() || prev.is_none()) {
            return Err(CoalesceError::transport(format!(
                "rank {rank} of a {world_size}-rank ring needs both neighbour links"
            )));
        }
        Ok(Self {
            rank,
            world_size,
            next,
            prev,
            timeout: config.collective_timeout,
            capabilities: Capabilities::full(),
            op_lock: Mutex::new(()),
        })
    }

    /// Build an in-process ring of `world_size` ranks joined by channels.
    pub fn local(world_size: u32, config: &CoalesceConfig) -> Result<Vec<RingTransport>> {
        if world_size == 0 {
            return Err(CoalesceError::InvalidGroup {
                rank: 0,
                world_size,
            });
        }
        let n = world_size as usize;
        let mut next: Vec<Option<Arc<dyn BulkLink>>> = (0..n).map(|_| None).collect();
        let mut prev: Vec<Option<Arc<dyn BulkLink>>> = (0..n).map(|_| None).collect();
        if n > 1 {
            for i in 0..n {
                let (tx_end, rx_end) = ChannelLink::pair();
                next[i] = Some(Arc::new(tx_end));
                prev[(i + 1) % n] = Some(Arc::new(rx_end));
            }
        }
        next.into_iter()
            .zip(prev)
            .enumerate()
            .map(|(i, (nx, pv))| Self::new(i as Rank, world_size, nx, pv, config))
            .collect()
    }

    /// Build a ring of `world_size` ranks joined by loopback TCP connections.
    ///
    /// Rank `i` connects to rank `i + 1`'s listener. Intended for tests and
    /// single-host runs where every rank lives in this process.
    pub async fn bootstrap_tcp_local(
        world_size: u32,
        config: &CoalesceConfig,
    ) -> Result<Vec<RingTransport>> {
        if world_size == 0 {
            return Err(CoalesceError::InvalidGroup {
                rank: 0,
                world_size,
            });
        }
        let n = world_size as usize;
        if n == 1 {
            return Ok(vec![Self::new(0, 1, None, None, config)?]);
        }

        let mut listeners = Vec::with_capacity(n);
        for _ in 0..n {
            listeners.push(tcp_link_listen(SocketAddr::from(([127, 0, 0, 1], 0))).await?);
        }

        let max_frame = config.max_frame_bytes;
        let mut next: Vec<Option<Arc<dyn BulkLink>>> = (0..n).map(|_| None).collect();
        let mut prev: Vec<Option<Arc<dyn BulkLink>>> = (0..n).map(|_| None).collect();
        for i in 0..n {
            let j = (i + 1) % n;
            let (listener_j, addr_j) = &listeners[j];
            let (outgoing, incoming) = tokio::try_join!(
                tcp_link_connect(*addr_j, max_frame),
                tcp_link_accept(listener_j, max_frame),
            )?;
            next[i] = Some(Arc::new(outgoing));
            prev[j] = Some(Arc::new(incoming));
        }

        tracing::debug!(world_size, "tcp ring formed");

        next.into_iter()
            .zip(prev)
            .enumerate()
            .map(|(i, (nx, pv))| Self::new(i as Rank, world_size, nx, pv, config))
            .collect()
    }

    /// Advertise (or hide) the direct flat-buffer primitive.
    ///
    /// Hiding it makes the transport look like a substrate that only offers
    /// the chunk-list form.
    pub fn with_flat_reduce_scatter(mut self, enabled: bool) -> Self {
        self.capabilities.flat_reduce_scatter = enabled;
        self
    }

    /// Restrict the element types this transport reports it can carry.
    pub fn with_dtypes(mut self, dtypes: &[DataType]) -> Self {
        self.capabilities.dtypes = dtypes.to_vec();
        self
    }

    async fn send_step(&self, data: &[u8]) -> Result<()> {
        let link = self.next.as_ref().ok_or(CoalesceError::InvalidGroup {
            rank: self.rank,
            world_size: self.world_size,
        })?;
        let dest = (self.rank + 1) % self.world_size;
        match tokio::time::timeout(self.timeout, link.send_bulk(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CoalesceError::TransportFailure {
                operation: "reduce_scatter",
                rank: dest,
                reason: e.to_string(),
            }),
            Err(_) => Err(CoalesceError::TransportFailure {
                operation: "reduce_scatter",
                rank: dest,
                reason: format!("send timed out after {:?}", self.timeout),
            }),
        }
    }

    async fn recv_step(&self) -> Result<Vec<u8>> {
        let link = self.prev.as_ref().ok_or(CoalesceError::InvalidGroup {
            rank: self.rank,
            world_size: self.world_size,
        })?;
        let src = (self.rank + self.world_size - 1) % self.world_size;
        match tokio::time::timeout(self.timeout, link.recv_bulk()).await {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(e)) => Err(CoalesceError::TransportFailure {
                operation: "reduce_scatter",
                rank: src,
                reason: e.to_string(),
            }),
            Err(_) => Err(CoalesceError::TransportFailure {
                operation: "reduce_scatter",
                rank: src,
                reason: format!("recv timed out after {:?}", self.timeout),
            }),
        }
    }

    /// Ring reduce-scatter over `world_size` equal segments.
    ///
    /// After round `s`, segment `(rank - s - 2) mod world` on this rank holds
    /// the sum of `s + 2` contributions; the last round completes segment
    /// `rank`.
    async fn ring_reduce_scatter<S: Segments + ?Sized>(
        &self,
        segments: &mut S,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<()> {
        let world = self.world_size as usize;
        let rank = self.rank as usize;
        let seg_bytes = segments.segment_len();
        let elem_size = dtype.size_in_bytes();
        if seg_bytes % elem_size != 0 {
            return Err(CoalesceError::BufferSizeMismatch {
                expected: seg_bytes - seg_bytes % elem_size,
                actual: seg_bytes,
            });
        }
        let count = seg_bytes / elem_size;

        let _op = self.op_lock.lock().await;
        for step in 0..world.saturating_sub(1) {
            let send_idx = (rank + 2 * world - step - 1) % world;
            let recv_idx = (rank + 2 * world - step - 2) % world;

            let (_, received) = tokio::try_join!(
                self.send_step(segments.segment(send_idx)),
                self.recv_step(),
            )?;

            if received.len() != seg_bytes {
                return Err(CoalesceError::BufferSizeMismatch {
                    expected: seg_bytes,
                    actual: received.len(),
                });
            }
            reduce_slice(segments.segment_mut(recv_idx), &received, count, dtype, op)?;
        }
        Ok(())
    }
}

impl Group for RingTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> u32 {
        self.world_size
    }
}

impl Transport for RingTransport {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn reduce_scatter_flat<'a>(
        &'a self,
        buffer: &'a mut [u8],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.capabilities.flat_reduce_scatter {
                return Err(CoalesceError::transport(
                    "direct reduce-scatter is disabled on this transport",
                ));
            }
            let world = self.world_size as usize;
            if buffer.len() % world != 0 {
                return Err(CoalesceError::BufferSizeMismatch {
                    expected: buffer.len() - buffer.len() % world,
                    actual: buffer.len(),
                });
            }
            let mut flat = FlatSegments {
                seg_bytes: buffer.len() / world,
                buf: buffer,
            };
            self.ring_reduce_scatter(&mut flat, dtype, op).await
        })
    }

    fn reduce_scatter_chunks<'a>(
        &'a self,
        output: &'a mut [u8],
        chunks: &'a mut [Vec<u8>],
        dtype: DataType,
        op: ReduceOp,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if chunks.len() != self.world_size as usize {
                return Err(CoalesceError::transport(format!(
                    "expected {} chunks, got {}",
                    self.world_size,
                    chunks.len()
                )));
            }
            let seg_bytes = output.len();
            if let Some(bad) = chunks.iter().find(|c| c.len() != seg_bytes) {
                return Err(CoalesceError::BufferSizeMismatch {
                    expected: seg_bytes,
                    actual: bad.len(),
                });
            }
            self.ring_reduce_scatter(chunks, dtype, op).await?;
            output.copy_from_slice(&chunks[self.rank as usize]);
            Ok(())
        })
    }
}

/// Equal-length segments the ring walks over.
trait Segments: Send + Sync {
    fn segment_len(&self) -> usize;
    fn segment(&self, idx: usize) -> &[u8];
    fn segment_mut(&mut self, idx: usize) -> &mut [u8];
}

struct FlatSegments<'a> {
    buf: &'a mut [u8],
    seg_bytes: usize,
}

impl Segments for FlatSegments<'_> {
    fn segment_len(&self) -> usize {
        self.seg_bytes
    }

    fn segment(&self, idx: usize) -> &[u8] {
        &self.buf[idx * self.seg_bytes..(idx + 1) * self.seg_bytes]
    }

    fn segment_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.buf[idx * self.seg_bytes..(idx + 1) * self.seg_bytes]
    }
}

impl Segments for [Vec<u8>] {
    fn segment_len(&self) -> usize {
        self.first().map_or(0, Vec::len)
    }

    fn segment(&self, idx: usize) -> &[u8] {
        &self[idx]
    }

    fn segment_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self[idx]
    }
}
