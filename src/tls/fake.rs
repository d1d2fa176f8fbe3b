//! Instrumented in-memory engine for state machine tests.
//!
//! Records are `[kind][len: u16 BE][payload]`. A HELLO from the client
//! makes the server answer with its own HELLO, a FINISHED completes the
//! handshake. Application payloads are XORed with a fixed mask so that
//! ciphertext and plaintext never look alike.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Buf, BytesMut};

use crate::tls::channel::ByteChannel;
use crate::tls::config::ProtocolVersion;
use crate::tls::connection::Transport;
use crate::tls::engine::{EngineSession, HandshakeStatus, Negotiated, ReadStatus, SessionFactory};
use crate::tls::error::{TlsError, TlsResult};

pub const HELLO: u8 = 0x01;
pub const FINISHED: u8 = 0x02;
pub const CLOSE: u8 = 0x15;
pub const APP: u8 = 0x17;

const MASK: u8 = 0x5a;
const MAX_FRAGMENT: usize = 512;
const HEADER_LEN: usize = 3;

pub fn record(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(kind);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn mask(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ MASK).collect()
}

/// Application data records carrying `plaintext`.
pub fn app_records(plaintext: &[u8]) -> Vec<u8> {
    plaintext
        .chunks(MAX_FRAGMENT)
        .flat_map(|chunk| record(APP, &mask(chunk)))
        .collect()
}

/// Client flight that completes the handshake.
pub fn client_handshake() -> Vec<u8> {
    let mut out = record(HELLO, b"client");
    out.extend(record(FINISHED, b""));
    out
}

/// Decode every application record in `wire`.
pub fn decode_app(wire: &[u8]) -> Vec<u8> {
    let mut buf = wire;
    let mut plain = Vec::new();
    while buf.len() >= HEADER_LEN {
        let kind = buf[0];
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        let payload = &buf[HEADER_LEN..HEADER_LEN + len];
        if kind == APP {
            plain.extend(mask(payload));
        }
        buf = &buf[HEADER_LEN + len..];
    }
    plain
}

#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub counters: Arc<Counters>,
    write_budget: Option<usize>,
    broken: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions stop accepting plaintext after `budget` bytes.
    pub fn with_write_budget(budget: usize) -> Self {
        Self {
            write_budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn new_session(&self) -> TlsResult<FakeSession> {
        if self.broken {
            return Err(TlsError::NotInitialized);
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            inbound: ByteChannel::default(),
            outbound: ByteChannel::default(),
            pending: BytesMut::new(),
            plaintext: BytesMut::new(),
            phase: Phase::AwaitHello,
            closed: false,
            write_budget: self.write_budget,
            counters: Arc::clone(&self.counters),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitHello,
    AwaitFinished,
    Done,
}

pub struct FakeSession {
    inbound: ByteChannel,
    outbound: ByteChannel,
    pending: BytesMut,
    plaintext: BytesMut,
    phase: Phase,
    closed: bool,
    write_budget: Option<usize>,
    counters: Arc<Counters>,
}

fn protocol_error(message: &str) -> TlsError {
    TlsError::Engine(rustls::Error::General(message.to_string()))
}

impl FakeSession {
    fn pull(&mut self) {
        let incoming = self.inbound.drain_all();
        self.pending.extend_from_slice(&incoming);
    }

    fn next_record(&mut self) -> TlsResult<Option<(u8, Vec<u8>)>> {
        if self.pending.len() < HEADER_LEN {
            return Ok(None);
        }
        let kind = self.pending[0];
        if !matches!(kind, HELLO | FINISHED | CLOSE | APP) {
            return Err(protocol_error("unknown record type"));
        }
        let len = u16::from_be_bytes([self.pending[1], self.pending[2]]) as usize;
        if self.pending.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.pending.advance(HEADER_LEN);
        let payload = self.pending.split_to(len).to_vec();
        Ok(Some((kind, payload)))
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.plaintext.len());
        buf[..n].copy_from_slice(&self.plaintext[..n]);
        self.plaintext.advance(n);
        n
    }
}

impl EngineSession for FakeSession {
    fn inbound(&mut self) -> &mut ByteChannel {
        &mut self.inbound
    }

    fn outbound(&mut self) -> &mut ByteChannel {
        &mut self.outbound
    }

    fn handshake(&mut self) -> TlsResult<HandshakeStatus> {
        self.pull();
        while self.phase != Phase::Done {
            let Some((kind, _)) = self.next_record()? else {
                break;
            };
            match (self.phase, kind) {
                (Phase::AwaitHello, HELLO) => {
                    self.outbound.fill(&record(HELLO, b"server"));
                    self.phase = Phase::AwaitFinished;
                }
                (Phase::AwaitFinished, FINISHED) => self.phase = Phase::Done,
                _ => return Err(protocol_error("unexpected handshake record")),
            }
        }

        if !self.outbound.is_empty() {
            Ok(HandshakeStatus::WantWrite)
        } else if self.phase == Phase::Done {
            Ok(HandshakeStatus::Complete)
        } else {
            Ok(HandshakeStatus::WantRead)
        }
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> TlsResult<ReadStatus> {
        self.counters.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.pull();
        loop {
            if !self.plaintext.is_empty() {
                return Ok(ReadStatus::Data(self.copy_out(buf)));
            }
            if self.closed {
                return Ok(ReadStatus::Closed);
            }
            match self.next_record()? {
                None => return Ok(ReadStatus::WantRead),
                Some((APP, payload)) => self.plaintext.extend_from_slice(&mask(&payload)),
                Some((CLOSE, _)) => self.closed = true,
                Some(_) => return Err(protocol_error("handshake record after handshake")),
            }
        }
    }

    fn write_plaintext(&mut self, data: &[u8]) -> TlsResult<usize> {
        let mut n = data.len().min(MAX_FRAGMENT);
        if let Some(budget) = self.write_budget.as_mut() {
            n = n.min(*budget);
            *budget -= n;
        }
        if n == 0 || self.outbound.remaining_capacity() < HEADER_LEN + n {
            return Ok(0);
        }
        self.outbound.fill(&record(APP, &mask(&data[..n])));
        Ok(n)
    }

    fn send_close_notify(&mut self) -> TlsResult<()> {
        self.outbound.fill(&record(CLOSE, b""));
        Ok(())
    }

    fn negotiated(&self) -> Option<Negotiated> {
        (self.phase == Phase::Done).then(|| Negotiated {
            version: ProtocolVersion::Tls1_3,
            cipher_suite: "FAKE_XOR_SUITE".to_string(),
        })
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport that remembers everything it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<u8>>,
    sends: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send_bytes(&self, bytes: &[u8]) {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().extend_from_slice(bytes);
    }

    fn request_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    /// Everything recorded since the last `clear` counts as unwritten.
    fn queued_bytes(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}
