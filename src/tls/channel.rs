//! Memory-backed byte channels between the TLS engine and the transport.
//!
//! A `ByteChannel` stands in for the socket the engine would normally
//! read from and write to. It never blocks: reading an empty channel or
//! writing a full one reports `WouldBlock`, exactly like a non-blocking
//! socket, and the owner decides when to refill or drain it.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};

/// Default capacity of each channel. Comfortably holds several maximum
/// size TLS records.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64 * 1024;

/// A bounded, in-process FIFO of bytes.
#[derive(Debug)]
pub struct ByteChannel {
    buf: BytesMut,
    capacity: usize,
}

impl ByteChannel {
    /// Create a channel that holds at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.min(DEFAULT_CHANNEL_CAPACITY)),
            capacity,
        }
    }

    /// Append as much of `data` as fits. Returns the number of bytes taken.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining_capacity());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Remove and return everything currently buffered.
    pub fn drain_all(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buf.len()
    }
}

impl Default for ByteChannel {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Read for ByteChannel {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }
}

impl Write for ByteChannel {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        match self.fill(data) {
            0 => Err(io::ErrorKind::WouldBlock.into()),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
