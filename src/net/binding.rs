//! Glue between an accepted socket, its `TlsConnection` and the HTTP handler.
//!
//! # Data Flow
//! ```text
//! socket read half ──chunk──→ ConnectionSlot::on_network_data
//!                                → TlsConnection (decrypt)
//!                                → HttpHandler (plaintext → response)
//!                                → TlsConnection::send (encrypt)
//!                                → ChannelTransport ──→ writer task ──→ socket write half
//! ```
//!
//! # Design Decisions
//! - One task per connection reads and drives everything synchronously
//! - The handshake gets its own, shorter, timeout than idle keep-alive
//! - The slot is dropped before the writer is awaited, so the TLS session
//!   is released even if the peer never reads
//! - A peer that stops reading stops being read: requests are not answered
//!   and the socket is not polled while its backlog is above the high-water
//!   mark. A backlog that does not drain within the idle timeout closes
//!   the connection, and the writer gets `drain_secs` to finish

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::TimeoutConfig;
use crate::http::handler::{HandlerOutcome, HttpHandler};
use crate::net::connection::ConnectionId;
use crate::net::transport::{run_writer, ChannelTransport, OUTBOUND_HIGH_WATER, OUTBOUND_LOW_WATER};
use crate::tls::{EngineSession, RustlsSession, SessionFactory, TlsConnection, TlsResult, TlsState, Transport};

const READ_BUFFER: usize = 16 * 1024;

/// Everything owned on behalf of one connection.
pub struct ConnectionSlot<H, S: EngineSession = RustlsSession> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    tls: TlsConnection<S>,
    handler: H,
    closing: bool,
}

impl<H: HttpHandler, S: EngineSession> ConnectionSlot<H, S> {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, tls: TlsConnection<S>, handler: H) -> Self {
        Self {
            id,
            peer_addr,
            tls,
            handler,
            closing: false,
        }
    }

    pub fn start(&mut self) {
        self.tls.start_handshake();
    }

    /// Feed ciphertext and answer every complete request it finishes.
    pub fn on_network_data(&mut self, chunk: &mut BytesMut) {
        self.tls.on_network_data(chunk);
        self.dispatch();
    }

    /// Answer requests that were held back while the peer was not reading.
    pub fn resume(&mut self) {
        self.dispatch();
    }

    /// Too much output is waiting for the peer to read it.
    pub fn is_backlogged(&self) -> bool {
        self.tls.queued_output() > OUTBOUND_HIGH_WATER
    }

    fn dispatch(&mut self) {
        while self.tls.is_handshake_complete() && !self.closing && !self.is_backlogged() {
            let input = self.tls.decrypted_buffer();
            if input.is_empty() {
                break;
            }
            let before = input.len();
            let outcome = self.handler.on_plaintext(input);
            let consumed = before - self.tls.decrypted_buffer().len();

            match outcome {
                HandlerOutcome::NeedMore => break,
                HandlerOutcome::Respond(reply) => {
                    self.tls.send(&reply);
                    if consumed == 0 {
                        break;
                    }
                }
                HandlerOutcome::RespondAndClose(reply) => {
                    self.tls.send(&reply);
                    self.close();
                }
                HandlerOutcome::Reject(reply) => {
                    tracing::warn!(
                        connection_id = %self.id,
                        peer_addr = %self.peer_addr,
                        "Request rejected"
                    );
                    self.tls.send(&reply);
                    self.tls.decrypted_buffer().clear();
                    self.close();
                }
            }
        }
    }

    /// Close the TLS session and ask the writer to finish.
    pub fn close(&mut self) {
        self.closing = true;
        self.tls.close();
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> TlsState {
        self.tls.state()
    }

    pub fn is_closed(&self) -> bool {
        self.closing || self.tls.state().is_terminal()
    }

    pub fn tls(&self) -> &TlsConnection<S> {
        &self.tls
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// Serve one accepted connection until either side closes it.
pub async fn serve_connection<F, H>(
    stream: TcpStream,
    id: ConnectionId,
    peer_addr: SocketAddr,
    factory: Arc<F>,
    handler: H,
    timeouts: TimeoutConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> TlsResult<()>
where
    F: SessionFactory,
    H: HttpHandler,
{
    let (transport, queue) = ChannelTransport::new();
    let tls = TlsConnection::new(factory.as_ref(), Arc::new(transport.clone()))?;

    let (mut reader, writer) = stream.into_split();
    let mut writer_task = tokio::spawn(run_writer(writer, queue));

    let mut slot = ConnectionSlot::new(id, peer_addr, tls, handler);
    slot.start();

    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    while !slot.is_closed() {
        if slot.is_backlogged() {
            tracing::debug!(queued = transport.queued_bytes(), "Peer is not reading; pausing input");
            tokio::select! {
                drained = tokio::time::timeout(timeouts.idle(), transport.wait_below(OUTBOUND_LOW_WATER)) => {
                    if drained.is_ok() {
                        slot.resume();
                    } else {
                        tracing::debug!(
                            queued = transport.queued_bytes(),
                            "Peer stopped reading; closing connection"
                        );
                        slot.close();
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Closing connection for shutdown");
                    slot.close();
                }
            }
            continue;
        }

        let limit = if slot.tls().is_handshake_complete() {
            timeouts.idle()
        } else {
            timeouts.handshake()
        };
        buf.reserve(READ_BUFFER);

        tokio::select! {
            read = tokio::time::timeout(limit, reader.read_buf(&mut buf)) => match read {
                Ok(Ok(0)) => {
                    tracing::debug!(state = %slot.state(), "Peer closed the TCP connection");
                    break;
                }
                Ok(Ok(_)) => slot.on_network_data(&mut buf),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Socket read failed");
                    break;
                }
                Err(_) => {
                    tracing::debug!(
                        state = %slot.state(),
                        timeout_secs = limit.as_secs(),
                        "Connection timed out"
                    );
                    slot.close();
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!("Closing connection for shutdown");
                slot.close();
            }
        }
    }

    let state = slot.state();
    drop(slot);
    drop(transport);

    match tokio::time::timeout(timeouts.drain(), &mut writer_task).await {
        Ok(Ok(Ok(written))) => tracing::debug!(%state, bytes_written = written, "Connection finished"),
        Ok(Ok(Err(e))) => tracing::debug!(%state, error = %e, "Socket write failed"),
        Ok(Err(e)) => tracing::warn!(%state, error = %e, "Writer task failed"),
        Err(_) => {
            writer_task.abort();
            tracing::debug!(%state, "Peer did not read the remaining output in time; dropping it");
        }
    }
    Ok(())
}
