//! Buffered source (component E): owns a read buffer, amortizing per-value
//! reads against the underlying [`Source`]'s I/O calls.
//!
//! Invariant (see `spec.md` §3 "Buffered source state"): between operations
//! the read buffer is in "read mode" — `[pos, limit)` holds unread bytes,
//! `[limit, capacity)` is scratch available for the next refill.

use std::sync::Arc;

use tracing::trace;

use crate::buffer::{Allocator, LeasedByteBuffer};
use crate::error::{Error, Result};
use crate::io::sink::Sink;
use crate::io::source::Source;

/// Read buffer capacity floor: a header plus an 8-byte scalar value must
/// always fit without a mid-value grow.
pub const MIN_READ_BUFFER_CAPACITY: usize = 16;
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;

pub struct BufferedSource {
    provider: Source,
    allocator: Arc<dyn Allocator>,
    read_buf: LeasedByteBuffer,
    pos: usize,
    limit: usize,
    closed: bool,
}

impl BufferedSource {
    pub fn new(provider: Source, allocator: Arc<dyn Allocator>, capacity: usize) -> Result<Self> {
        if capacity < MIN_READ_BUFFER_CAPACITY {
            return Err(Error::programming_error(format!(
                "read buffer capacity {capacity} is below the minimum of {MIN_READ_BUFFER_CAPACITY}"
            )));
        }
        let read_buf = allocator.get_byte_buffer(capacity)?;
        Ok(Self {
            provider,
            allocator,
            read_buf,
            pos: 0,
            limit: 0,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::programming_error("operation on a closed BufferedSource"))
        } else {
            Ok(())
        }
    }

    fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Compacts `[pos, limit)` to the front of the buffer, growing the
    /// backing storage first if `n` cannot possibly fit even after
    /// compaction.
    fn compact_and_grow_if_needed(&mut self, n: usize) -> Result<()> {
        if n > self.read_buf.capacity() {
            let mut grown = self.allocator.get_byte_buffer(n)?;
            let remaining = self.remaining();
            grown.as_mut_slice()[..remaining].copy_from_slice(&self.read_buf.as_slice()[self.pos..self.limit]);
            self.read_buf = grown;
            self.limit = remaining;
            self.pos = 0;
            return Ok(());
        }
        if self.pos > 0 {
            let remaining = self.remaining();
            self.read_buf.as_mut_slice().copy_within(self.pos..self.limit, 0);
            self.pos = 0;
            self.limit = remaining;
        }
        Ok(())
    }

    /// Ensures at least `n` unread bytes are available, refilling from the
    /// provider as needed. Raises [`Error::UnexpectedEnd`] if the provider
    /// reaches end-of-input first.
    pub fn ensure_remaining(&mut self, n: usize) -> Result<()> {
        self.check_open()?;
        if self.remaining() >= n {
            return Ok(());
        }
        let prior_remaining = self.remaining();
        self.compact_and_grow_if_needed(n)?;
        while self.remaining() < n {
            let capacity = self.read_buf.capacity();
            let read = self
                .provider
                .read(&mut self.read_buf.as_mut_slice()[self.limit..capacity], n - self.remaining())?;
            if read == 0 {
                return Err(Error::unexpected_end(n - prior_remaining, self.remaining() - prior_remaining));
            }
            self.limit += read;
        }
        Ok(())
    }

    /// Peeks the next byte without consuming it.
    pub fn next_byte(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.read_buf.as_slice()[self.pos])
    }

    fn consume(&mut self, n: usize) -> &[u8] {
        let start = self.pos;
        self.pos += n;
        &self.read_buf.as_slice()[start..start + n]
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        let b = self.read_buf.as_slice()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u_byte(&mut self) -> Result<u8> {
        self.read_byte()
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        let bytes = self.consume(2);
        Ok(i16::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u_short(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        let bytes = self.consume(2);
        Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        let bytes = self.consume(4);
        Ok(i32::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u_int(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        let bytes = self.consume(4);
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        let bytes = self.consume(8);
        Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u_long(&mut self) -> Result<u64> {
        self.ensure_remaining(8)?;
        let bytes = self.consume(8);
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u_int()?))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u_long()?))
    }

    /// Reads an unsigned 8-bit length.
    pub fn read_length8(&mut self) -> Result<u32> {
        Ok(self.read_u_byte()? as u32)
    }

    /// Reads an unsigned 16-bit length.
    pub fn read_length16(&mut self) -> Result<u32> {
        Ok(self.read_u_short()? as u32)
    }

    /// Reads an unsigned 32-bit length, rejecting values with the high bit
    /// set (which would be negative if interpreted as signed).
    pub fn read_length32(&mut self) -> Result<u32> {
        let raw = self.read_u_int()?;
        if raw & 0x8000_0000 != 0 {
            return Err(Error::size_limit_exceeded(format!(
                "32-bit length {raw} has its high bit set"
            )));
        }
        Ok(raw)
    }

    /// Drops `n` bytes, consuming from the read buffer first and then
    /// delegating to the provider for anything beyond what was buffered.
    pub fn skip(&mut self, mut n: u64) -> Result<()> {
        self.check_open()?;
        let buffered = (n as usize).min(self.remaining());
        self.pos += buffered;
        n -= buffered as u64;
        if n > 0 {
            let mut scratch = vec![0u8; DEFAULT_READ_BUFFER_CAPACITY.min(4096)];
            self.provider.skip(n, &mut scratch)?;
        }
        Ok(())
    }

    /// Drains any buffered bytes into `sink`, then delegates the remainder
    /// to the provider's `transfer_to`.
    pub fn transfer_to(&mut self, sink: &mut Sink, length: u64) -> Result<u64> {
        self.check_open()?;
        let buffered = (length as usize).min(self.remaining());
        if buffered > 0 {
            let start = self.pos;
            sink.write(&self.read_buf.as_slice()[start..start + buffered])?;
            self.pos += buffered;
        }
        let remaining = length - buffered as u64;
        if remaining == 0 {
            return Ok(length);
        }
        trace!(remaining, "draining buffered source to provider.transfer_to");
        let scratch_capacity = self.read_buf.capacity();
        let mut scratch = vec![0u8; scratch_capacity.min(remaining as usize).max(1)];
        let copied = self.provider.transfer_to(sink, remaining, &mut scratch)?;
        Ok(buffered as u64 + copied)
    }

    /// Fills as much of `dst` as possible: first by copying buffered
    /// bytes, then by reading directly from the provider into the
    /// remainder, looping until `dst` is full or the provider reaches
    /// end-of-input (an error, since the caller asked for exactly
    /// `dst.len()` bytes).
    pub fn read_payload(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_open()?;
        let mut filled = 0;
        let buffered = self.remaining().min(dst.len());
        if buffered > 0 {
            let start = self.pos;
            dst[..buffered].copy_from_slice(&self.read_buf.as_slice()[start..start + buffered]);
            self.pos += buffered;
            filled += buffered;
        }
        while filled < dst.len() {
            let read = self.provider.read(&mut dst[filled..], dst.len() - filled)?;
            if read == 0 {
                return Err(Error::unexpected_end(dst.len() - filled, 0));
            }
            filled += read;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.provider.close()?;
        self.read_buf.release();
        Ok(())
    }
}

impl Drop for BufferedSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
