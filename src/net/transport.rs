//! `Transport` implementation backed by a writer task.
//!
//! The TLS layer runs synchronously inside the connection task; it queues
//! ciphertext and shutdown requests on a channel. A separate task owns the
//! write half of the socket and drains the queue in order.
//!
//! The channel itself is unbounded because `send_bytes` cannot wait, so the
//! queued byte count is tracked alongside it. The connection task stops
//! reading from a peer whose backlog grows past a high-water mark and
//! resumes once the writer has caught up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use crate::tls::Transport;

/// Pause input once this much ciphertext is waiting for the socket.
pub const OUTBOUND_HIGH_WATER: usize = 256 * 1024;
/// Resume input once the backlog is back under this.
pub const OUTBOUND_LOW_WATER: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(Bytes),
    Shutdown,
}

#[derive(Debug, Default)]
struct Backlog {
    queued: AtomicUsize,
    written: Notify,
}

/// Receiving end of a `ChannelTransport`, consumed by `run_writer`.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<TransportCommand>,
    backlog: Arc<Backlog>,
}

#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TransportCommand>,
    backlog: Arc<Backlog>,
}

impl ChannelTransport {
    pub fn new() -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(Backlog::default());
        (
            Self {
                tx,
                backlog: Arc::clone(&backlog),
            },
            OutboundQueue { rx, backlog },
        )
    }

    /// Wait until at most `mark` bytes are queued.
    pub async fn wait_below(&self, mark: usize) {
        loop {
            let written = self.backlog.written.notified();
            tokio::pin!(written);
            written.as_mut().enable();
            if self.queued_bytes() <= mark {
                return;
            }
            written.await;
        }
    }
}

impl Transport for ChannelTransport {
    fn send_bytes(&self, bytes: &[u8]) {
        self.backlog.queued.fetch_add(bytes.len(), Ordering::AcqRel);
        if self
            .tx
            .send(TransportCommand::Send(Bytes::copy_from_slice(bytes)))
            .is_err()
        {
            self.backlog.queued.fetch_sub(bytes.len(), Ordering::AcqRel);
            tracing::debug!(bytes = bytes.len(), "Writer gone; dropping ciphertext");
        }
    }

    fn request_shutdown(&self) {
        let _ = self.tx.send(TransportCommand::Shutdown);
    }

    fn queued_bytes(&self) -> usize {
        self.backlog.queued.load(Ordering::Acquire)
    }
}

/// Write queued ciphertext until a shutdown is requested or every sender
/// is gone, then shut down the write side of the socket.
///
/// Returns the number of bytes written.
pub async fn run_writer<W>(mut writer: W, queue: OutboundQueue) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let OutboundQueue { mut rx, backlog } = queue;
    let mut written = 0u64;
    while let Some(command) = rx.recv().await {
        match command {
            TransportCommand::Send(bytes) => {
                writer.write_all(&bytes).await?;
                written += bytes.len() as u64;
                backlog.queued.fetch_sub(bytes.len(), Ordering::AcqRel);
                backlog.written.notify_waiters();
            }
            TransportCommand::Shutdown => break,
        }
    }
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(written)
}
