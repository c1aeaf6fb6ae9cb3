use crate::error::{CoalesceError, Result};
use crate::transport::BulkLink;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

/// Point-to-point link over raw TCP.
///
/// Frames are `[len: u64 LE][payload]`. A background task reads frames into
/// a channel so a slow consumer never stalls the socket reader.
pub struct TcpLink {
    writer: Mutex<tokio::io::WriteHalf<TcpStream>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    recv_handle: tokio::task::JoinHandle<()>,
}

impl TcpLink {
    /// Create a link from an already-connected stream.
    ///
    /// Frames larger than `max_frame_bytes` close the connection.
    pub fn from_stream(stream: TcpStream, max_frame_bytes: usize) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(64);
        let recv_handle = tokio::spawn(recv_loop(reader, tx, max_frame_bytes));
        Self {
            writer: Mutex::new(writer),
            rx: Mutex::new(rx),
            recv_handle,
        }
    }

    async fn write_frame(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&(data.len() as u64).to_le_bytes())
            .await
            .map_err(|e| CoalesceError::transport_with_source("tcp link write len", e))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| CoalesceError::transport_with_source("tcp link write payload", e))?;
        writer
            .flush()
            .await
            .map_err(|e| CoalesceError::transport_with_source("tcp link flush", e))?;
        Ok(())
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.recv_handle.abort();
    }
}

impl BulkLink for TcpLink {
    fn send_bulk<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write_frame(data))
    }

    fn recv_bulk(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| CoalesceError::transport("tcp link closed"))
        })
    }
}

async fn recv_loop(
    mut reader: tokio::io::ReadHalf<TcpStream>,
    tx: mpsc::Sender<Vec<u8>>,
    max_frame_bytes: usize,
) {
    let mut len_buf = [0u8; 8];
    loop {
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            tracing::debug!("tcp link recv loop ended reading len: {e}");
            return;
        }
        let len = u64::from_le_bytes(len_buf) as usize;
        if len > max_frame_bytes {
            tracing::warn!(len, max_frame_bytes, "tcp link: frame too large, closing");
            return;
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::debug!("tcp link recv loop ended reading payload: {e}");
            return;
        }
        if tx.send(payload).await.is_err() {
            return;
        }
    }
}

/// Bind a listener (port 0 picks a free port) and report its address.
pub async fn tcp_link_listen(
    addr: std::net::SocketAddr,
) -> Result<(TcpListener, std::net::SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CoalesceError::transport_with_source("tcp link listen", e))?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

/// Connect to a peer's listener.
pub async fn tcp_link_connect(
    addr: std::net::SocketAddr,
    max_frame_bytes: usize,
) -> Result<TcpLink> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| CoalesceError::transport_with_source("tcp link connect", e))?;
    stream.set_nodelay(true)?;
    Ok(TcpLink::from_stream(stream, max_frame_bytes))
}

/// Accept one connection from a listener.
pub async fn tcp_link_accept(listener: &TcpListener, max_frame_bytes: usize) -> Result<TcpLink> {
    let (stream, _addr) = listener
        .accept()
        .await
        .map_err(|e| CoalesceError::transport_with_source("tcp link accept", e))?;
    stream.set_nodelay(true)?;
    Ok(TcpLink::from_stream(stream, max_frame_bytes))
}
