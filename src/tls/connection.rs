//! Per-connection TLS state machine.
//!
//! # Responsibilities
//! - Advance the handshake as ciphertext arrives in arbitrary chunks
//! - Decrypt application data into the plaintext buffer, in order
//! - Encrypt outgoing plaintext and hand ciphertext to the transport
//! - Turn engine failures into a single transport shutdown request
//!
//! # State Machine
//! ```text
//! Handshake ──complete──→ Established ──close_notify──→ Shutdown
//!     │                        │
//!     └──────── failure ───────┴──────────────────────→ Error
//! ```
//! `Shutdown` and `Error` are terminal. Data arriving in a terminal state
//! is discarded without touching the engine.
//!
//! # Design Decisions
//! - Never blocks and never awaits: every call runs to completion on the
//!   task that owns the socket
//! - Engine output is flushed to the transport as soon as it exists
//! - No plaintext is produced before the handshake completes

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;

use crate::observability::metrics;
use crate::tls::engine::{EngineSession, HandshakeStatus, Negotiated, ReadStatus, SessionFactory};
use crate::tls::error::{log_diagnostics, TlsError, TlsResult};
use crate::tls::session::RustlsSession;

/// Plaintext read per decrypt call. One maximum-size TLS record.
const READ_CHUNK: usize = 16 * 1024;

/// The reactor side of a connection, as seen by the TLS layer.
pub trait Transport: Send + Sync {
    /// Queue ciphertext for the peer.
    fn send_bytes(&self, bytes: &[u8]);

    /// Ask the reactor to close the socket once queued bytes are written.
    fn request_shutdown(&self);

    /// Bytes accepted by `send_bytes` that have not reached the socket yet.
    fn queued_bytes(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    Handshake,
    Established,
    Shutdown,
    Error,
}

impl TlsState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TlsState::Shutdown | TlsState::Error)
    }
}

impl fmt::Display for TlsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlsState::Handshake => "handshake",
            TlsState::Established => "established",
            TlsState::Shutdown => "shutdown",
            TlsState::Error => "error",
        };
        f.write_str(name)
    }
}

pub struct TlsConnection<S: EngineSession = RustlsSession> {
    state: TlsState,
    session: S,
    decrypted: BytesMut,
    transport: Arc<dyn Transport>,
    shutdown_requested: bool,
}

impl<S: EngineSession> TlsConnection<S> {
    /// Create a connection in the `Handshake` state with a fresh session.
    pub fn new<F>(factory: &F, transport: Arc<dyn Transport>) -> TlsResult<Self>
    where
        F: SessionFactory<Session = S>,
    {
        let session = factory.new_session().inspect_err(|e| {
            log_diagnostics("create TLS session", e);
        })?;
        Ok(Self {
            state: TlsState::Handshake,
            session,
            decrypted: BytesMut::new(),
            transport,
            shutdown_requested: false,
        })
    }

    /// Called once right after construction.
    pub fn start_handshake(&mut self) {
        if self.state == TlsState::Handshake {
            self.advance_handshake();
        }
    }

    /// Feed one chunk of ciphertext from the transport.
    ///
    /// The whole chunk is consumed; `chunk` is empty on return.
    pub fn on_network_data(&mut self, chunk: &mut BytesMut) {
        let data = chunk.split();
        if self.state.is_terminal() {
            tracing::trace!(state = %self.state, bytes = data.len(), "discarding data after close");
            return;
        }

        let mark = self.decrypted.len();
        self.ingest(&data);
        if self.state == TlsState::Error {
            // A chunk that ends in failure yields no plaintext at all.
            self.decrypted.truncate(mark);
        }
    }

    fn ingest(&mut self, mut pending: &[u8]) {
        while !pending.is_empty() {
            let accepted = self.session.inbound().fill(pending);
            if accepted == 0 {
                let stalled = io::Error::new(
                    io::ErrorKind::WriteZero,
                    "inbound channel full and the engine made no progress",
                );
                self.fail("buffer ciphertext", TlsError::Channel(stalled));
                return;
            }
            pending = &pending[accepted..];

            if self.state == TlsState::Handshake {
                self.advance_handshake();
            }
            if self.state == TlsState::Established {
                self.drain_decrypted();
            }
            if self.state.is_terminal() {
                return;
            }
        }
    }

    fn advance_handshake(&mut self) {
        loop {
            match self.session.handshake() {
                Ok(HandshakeStatus::WantWrite) => {
                    tracing::trace!("handshake wants write");
                    if !self.flush() {
                        return;
                    }
                }
                Ok(HandshakeStatus::WantRead) => {
                    tracing::trace!("handshake wants read");
                    return;
                }
                Ok(HandshakeStatus::Complete) => {
                    if !self.flush() {
                        return;
                    }
                    self.state = TlsState::Established;
                    metrics::record_handshake("success");
                    match self.session.negotiated() {
                        Some(negotiated) => tracing::info!(
                            version = %negotiated.version,
                            cipher = %negotiated.cipher_suite,
                            "TLS handshake complete"
                        ),
                        None => tracing::info!("TLS handshake complete"),
                    }
                    return;
                }
                Err(e) => {
                    self.fail("handshake", e);
                    return;
                }
            }
        }
    }

    fn drain_decrypted(&mut self) {
        let mut scratch = [0u8; READ_CHUNK];
        loop {
            match self.session.read_plaintext(&mut scratch) {
                Ok(ReadStatus::Data(n)) => {
                    self.decrypted.extend_from_slice(&scratch[..n]);
                    metrics::record_decrypted(n);
                }
                Ok(ReadStatus::WantRead) => break,
                Ok(ReadStatus::Closed) => {
                    tracing::debug!("peer sent close_notify");
                    self.state = TlsState::Shutdown;
                    self.request_shutdown();
                    break;
                }
                Err(e) => {
                    self.fail("decrypt", e);
                    return;
                }
            }
        }
        self.flush();
    }

    /// Encrypt `plaintext` and send it to the peer.
    ///
    /// Ignored, with an error logged, unless the connection is established.
    pub fn send(&mut self, plaintext: &[u8]) {
        if self.state != TlsState::Established {
            tracing::error!(
                state = %self.state,
                bytes = plaintext.len(),
                "refusing to send on a connection that is not established"
            );
            return;
        }

        let mut remaining = plaintext;
        while !remaining.is_empty() {
            match self.session.write_plaintext(remaining) {
                Ok(0) => {
                    tracing::warn!(
                        unsent = remaining.len(),
                        "engine accepted no plaintext; dropping the rest"
                    );
                    break;
                }
                Ok(n) => {
                    remaining = &remaining[n..];
                    metrics::record_encrypted(n);
                    if !self.flush() {
                        return;
                    }
                }
                Err(e) => {
                    self.fail("encrypt", e);
                    return;
                }
            }
        }
    }

    /// Orderly local close. Sends close_notify if the session is up.
    pub fn close(&mut self) {
        match self.state {
            TlsState::Established => {
                if let Err(e) = self.session.send_close_notify() {
                    self.fail("close", e);
                    return;
                }
                if !self.flush() {
                    return;
                }
            }
            TlsState::Handshake => {}
            TlsState::Shutdown | TlsState::Error => return,
        }
        tracing::debug!(state = %self.state, "closing TLS connection");
        self.state = TlsState::Shutdown;
        self.request_shutdown();
    }

    pub fn state(&self) -> TlsState {
        self.state
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.state == TlsState::Established
    }

    /// Decrypted bytes waiting for the HTTP layer. Drain what you consume.
    pub fn decrypted_buffer(&mut self) -> &mut BytesMut {
        &mut self.decrypted
    }

    pub fn negotiated(&self) -> Option<Negotiated> {
        self.session.negotiated()
    }

    /// Ciphertext handed to the transport but not yet written out.
    pub fn queued_output(&self) -> usize {
        self.transport.queued_bytes()
    }

    /// Hand everything the engine has produced to the transport, refilling
    /// the outbound channel until the engine holds nothing back.
    fn flush_outbound(&mut self) -> TlsResult<()> {
        loop {
            let out = self.session.outbound().drain_all();
            if !out.is_empty() {
                self.transport.send_bytes(&out);
            }
            if !self.session.pump_output()? {
                return Ok(());
            }
        }
    }

    /// Returns false if the connection failed while flushing.
    fn flush(&mut self) -> bool {
        match self.flush_outbound() {
            Ok(()) => true,
            Err(e) => {
                self.fail("flush", e);
                false
            }
        }
    }

    fn fail(&mut self, operation: &str, error: TlsError) {
        log_diagnostics(operation, &error);
        // Alerts queued by the engine still go out.
        if let Err(e) = self.flush_outbound() {
            log_diagnostics("flush alert", &e);
        }
        if self.state == TlsState::Handshake {
            metrics::record_handshake("failure");
        }
        self.state = TlsState::Error;
        self.request_shutdown();
    }

    fn request_shutdown(&mut self) {
        if !self.shutdown_requested {
            self.shutdown_requested = true;
            self.transport.request_shutdown();
        }
    }
}

impl<S: EngineSession> Drop for TlsConnection<S> {
    fn drop(&mut self) {
        tracing::trace!(state = %self.state, "releasing TLS session");
    }
}

impl<S: EngineSession> fmt::Debug for TlsConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnection")
            .field("state", &self.state)
            .field("decrypted", &self.decrypted.len())
            .field("shutdown_requested", &self.shutdown_requested)
            .finish()
    }
}
