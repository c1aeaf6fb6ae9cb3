use crate::error::{CoalesceError, Result};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};

/// Point-to-point byte link between two ranks.
///
/// Frames are delivered whole and in order. The ring transport sends on the
/// link to its successor and receives on the link from its predecessor.
pub trait BulkLink: Send + Sync {
    /// Send one frame.
    fn send_bulk<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Receive the next frame.
    fn recv_bulk(&self) -> BoxFuture<'_, Result<Vec<u8>>>;
}

/// In-process link backed by tokio channels.
pub struct ChannelLink {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl ChannelLink {
    /// Frames buffered per direction before a send waits.
    const DEPTH: usize = 64;

    /// Create both ends of a duplex link.
    pub fn pair() -> (ChannelLink, ChannelLink) {
        let (a_tx, b_rx) = mpsc::channel(Self::DEPTH);
        let (b_tx, a_rx) = mpsc::channel(Self::DEPTH);
        (
            ChannelLink {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            ChannelLink {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

impl BulkLink for ChannelLink {
    fn send_bulk<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.tx
                .send(data.to_vec())
                .await
                .map_err(|_| CoalesceError::transport("channel link closed"))
        })
    }

    fn recv_bulk(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| CoalesceError::transport("channel link closed"))
        })
    }
}
