//! Engine session backed by `rustls::ServerConnection`.

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::{ServerConfig, ServerConnection};

use crate::tls::channel::ByteChannel;
use crate::tls::config::ProtocolVersion;
use crate::tls::engine::{EngineSession, HandshakeStatus, Negotiated, ReadStatus};
use crate::tls::error::{TlsError, TlsResult};

pub struct RustlsSession {
    conn: ServerConnection,
    inbound: ByteChannel,
    outbound: ByteChannel,
}

impl RustlsSession {
    pub fn new(config: Arc<ServerConfig>) -> TlsResult<Self> {
        Ok(Self {
            conn: ServerConnection::new(config)?,
            inbound: ByteChannel::default(),
            outbound: ByteChannel::default(),
        })
    }

    /// Move one read's worth of buffered ciphertext into the engine and
    /// process it. Returns false if the engine took nothing, which happens
    /// once the peer has sent close_notify.
    fn ingest(&mut self) -> TlsResult<bool> {
        match self.conn.read_tls(&mut self.inbound) {
            Ok(0) => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(TlsError::Channel(e)),
        }

        if let Err(e) = self.conn.process_new_packets() {
            // The engine queues an alert describing the failure; hand it to
            // the outbound channel so the peer learns why.
            let _ = self.pump_output();
            return Err(TlsError::Engine(e));
        }
        Ok(true)
    }
}

impl EngineSession for RustlsSession {
    fn inbound(&mut self) -> &mut ByteChannel {
        &mut self.inbound
    }

    fn outbound(&mut self) -> &mut ByteChannel {
        &mut self.outbound
    }

    fn handshake(&mut self) -> TlsResult<HandshakeStatus> {
        // Records following the final handshake flight stay buffered for
        // the decrypt path.
        while self.conn.is_handshaking() && !self.inbound.is_empty() {
            if !self.ingest()? {
                break;
            }
        }

        if self.pump_output()? {
            return Ok(HandshakeStatus::WantWrite);
        }
        if self.conn.is_handshaking() {
            Ok(HandshakeStatus::WantRead)
        } else {
            Ok(HandshakeStatus::Complete)
        }
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> TlsResult<ReadStatus> {
        if buf.is_empty() {
            return Ok(ReadStatus::WantRead);
        }
        loop {
            match self.conn.reader().read(buf) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => return Ok(ReadStatus::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(TlsError::Channel(e)),
            }

            if self.inbound.is_empty() {
                return Ok(ReadStatus::WantRead);
            }
            let progressed = self.ingest()?;
            // Key updates and tickets produced while reading.
            self.pump_output()?;
            if !progressed {
                return Ok(ReadStatus::WantRead);
            }
        }
    }

    fn write_plaintext(&mut self, data: &[u8]) -> TlsResult<usize> {
        // Make room in the engine before handing it more plaintext.
        self.pump_output()?;
        let accepted = self.conn.writer().write(data).map_err(TlsError::Channel)?;
        self.pump_output()?;
        Ok(accepted)
    }

    fn send_close_notify(&mut self) -> TlsResult<()> {
        self.conn.send_close_notify();
        self.pump_output()?;
        Ok(())
    }

    /// A single plaintext write can produce more ciphertext than the
    /// outbound channel holds; the rest stays queued in the engine until
    /// the channel is drained and this is called again.
    fn pump_output(&mut self) -> TlsResult<bool> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.outbound) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(TlsError::Channel(e)),
            }
        }
        Ok(!self.outbound.is_empty())
    }

    fn negotiated(&self) -> Option<Negotiated> {
        if self.conn.is_handshaking() {
            return None;
        }
        let version = ProtocolVersion::from_engine(self.conn.protocol_version()?)?;
        let suite = self.conn.negotiated_cipher_suite()?;
        Some(Negotiated {
            version,
            cipher_suite: format!("{:?}", suite.suite()),
        })
    }
}
