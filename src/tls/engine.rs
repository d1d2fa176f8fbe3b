//! Capability boundary to the TLS protocol engine.
//!
//! The connection state machine only talks to the engine through these
//! traits. Every operation completes immediately and reports one of a small
//! set of outcomes; none of them ever blocks.

use crate::tls::channel::ByteChannel;
use crate::tls::config::ProtocolVersion;
use crate::tls::error::TlsResult;

/// Outcome of one handshake-advance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The handshake finished.
    Complete,
    /// More ciphertext from the peer is required.
    WantRead,
    /// Handshake output is waiting in the outbound channel.
    WantWrite,
}

/// Outcome of one decrypt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many plaintext bytes were written to the caller's buffer.
    Data(usize),
    /// No complete record is available right now.
    WantRead,
    /// The peer sent an orderly close.
    Closed,
}

/// Parameters agreed during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: ProtocolVersion,
    pub cipher_suite: String,
}

/// A single server-side engine session bound to its two byte channels.
///
/// The session owns the inbound (peer to engine) and outbound (engine to
/// peer) channels for its whole life; dropping the session releases both.
pub trait EngineSession: Send {
    /// Ciphertext received from the peer, not yet consumed by the engine.
    fn inbound(&mut self) -> &mut ByteChannel;

    /// Ciphertext produced by the engine, not yet sent to the peer.
    fn outbound(&mut self) -> &mut ByteChannel;

    /// Advance the handshake as far as the buffered input allows.
    fn handshake(&mut self) -> TlsResult<HandshakeStatus>;

    /// Decrypt application data into `buf`.
    fn read_plaintext(&mut self, buf: &mut [u8]) -> TlsResult<ReadStatus>;

    /// Encrypt a prefix of `data`. Returns how many bytes were accepted;
    /// zero means the engine cannot take more right now.
    fn write_plaintext(&mut self, data: &[u8]) -> TlsResult<usize>;

    /// Queue an orderly close signal to the peer.
    fn send_close_notify(&mut self) -> TlsResult<()>;

    /// Move output still held inside the engine into the outbound channel,
    /// as far as the channel has room. Returns true if the outbound channel
    /// holds bytes afterwards.
    ///
    /// Engines that write straight into the channel have nothing to move.
    fn pump_output(&mut self) -> TlsResult<bool> {
        Ok(!self.outbound().is_empty())
    }

    /// Negotiated parameters, once the handshake has completed.
    fn negotiated(&self) -> Option<Negotiated>;
}

/// Creates engine sessions from shared, read-only state.
///
/// Implementations must allow concurrent `new_session` calls.
pub trait SessionFactory: Send + Sync {
    type Session: EngineSession;

    fn new_session(&self) -> TlsResult<Self::Session>;
}
