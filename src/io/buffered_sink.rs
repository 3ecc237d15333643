//! Buffered sink (component F): owns a write buffer, amortizing per-value
//! writes against the underlying [`Sink`]'s I/O calls.
//!
//! Invariant (see `spec.md` §3 "Buffered sink state"): between operations
//! the write buffer is in "write mode" — `[0, pos)` is pending bytes to
//! flush, `[pos, capacity)` is free.

use std::sync::Arc;

use tracing::trace;

use crate::buffer::{Allocator, LeasedByteBuffer};
use crate::error::{Error, Result};
use crate::io::sink::Sink;
use crate::io::source::Source;

pub const MIN_WRITE_BUFFER_CAPACITY: usize = 16;
pub const DEFAULT_WRITE_BUFFER_CAPACITY: usize = 8 * 1024;

pub struct BufferedSink {
    provider: Sink,
    allocator: Arc<dyn Allocator>,
    write_buf: LeasedByteBuffer,
    pos: usize,
    closed: bool,
}

impl BufferedSink {
    pub fn new(provider: Sink, allocator: Arc<dyn Allocator>, capacity: usize) -> Result<Self> {
        if capacity < MIN_WRITE_BUFFER_CAPACITY {
            return Err(Error::programming_error(format!(
                "write buffer capacity {capacity} is below the minimum of {MIN_WRITE_BUFFER_CAPACITY}"
            )));
        }
        let write_buf = allocator.get_byte_buffer(capacity)?;
        Ok(Self {
            provider,
            allocator,
            write_buf,
            pos: 0,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::programming_error("operation on a closed BufferedSink"))
        } else {
            Ok(())
        }
    }

    fn free(&self) -> usize {
        self.write_buf.capacity() - self.pos
    }

    /// Flushes pending bytes to the provider and resets the buffer to
    /// empty, without flushing the provider itself (see [`Self::flush`] for
    /// that).
    pub fn flush_buffer(&mut self) -> Result<()> {
        if self.pos > 0 {
            self.provider.write(&self.write_buf.as_slice()[..self.pos])?;
            self.pos = 0;
        }
        Ok(())
    }

    /// Ensures at least `n` free bytes, flushing (and, if `n` exceeds the
    /// buffer's total capacity, growing) as needed.
    pub fn ensure_remaining(&mut self, n: usize) -> Result<()> {
        self.check_open()?;
        if self.free() >= n {
            return Ok(());
        }
        self.flush_buffer()?;
        if n > self.write_buf.capacity() {
            trace!(n, "growing write buffer past its leased capacity");
            self.write_buf = self.allocator.get_byte_buffer(n)?;
        }
        Ok(())
    }

    pub fn write(&mut self, b: u8) -> Result<()> {
        self.ensure_remaining(1)?;
        self.write_buf.as_mut_slice()[self.pos] = b;
        self.pos += 1;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_remaining(bytes.len())?;
        let start = self.pos;
        self.write_buf.as_mut_slice()[start..start + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn write_format_u8(&mut self, format: u8, value: u8) -> Result<()> {
        self.append(&[format, value])
    }

    pub fn write_format_u16(&mut self, format: u8, value: u16) -> Result<()> {
        self.ensure_remaining(3)?;
        self.write(format)?;
        self.append(&value.to_be_bytes())
    }

    pub fn write_format_u32(&mut self, format: u8, value: u32) -> Result<()> {
        self.ensure_remaining(5)?;
        self.write(format)?;
        self.append(&value.to_be_bytes())
    }

    pub fn write_format_u64(&mut self, format: u8, value: u64) -> Result<()> {
        self.ensure_remaining(9)?;
        self.write(format)?;
        self.append(&value.to_be_bytes())
    }

    pub fn write_format_only(&mut self, format: u8) -> Result<()> {
        self.write(format)
    }

    /// Reserves `header_len` bytes for a later in-place patch, returning the
    /// absolute buffer offset the reservation starts at. Used by the string
    /// codec (`spec.md` §4.I) to write a pessimistic header before the
    /// actual encoded length is known. The caller must not let the buffer
    /// flush between reserving and patching.
    pub fn reserve_header(&mut self, header_len: usize) -> Result<usize> {
        self.ensure_remaining(header_len)?;
        let start = self.pos;
        self.pos += header_len;
        Ok(start)
    }

    /// Overwrites bytes previously reserved by [`Self::reserve_header`].
    /// `offset` must still be within `[0, pos)` and unflushed.
    pub fn patch_header(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset + bytes.len() > self.pos {
            return Err(Error::programming_error(
                "patch_header range was already flushed or never reserved",
            ));
        }
        self.write_buf.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Writes `payload` either by appending into the write buffer (if it
    /// fits in the current free space) or, for larger payloads, flushing
    /// pending bytes and handing `payload` to the provider directly
    /// (zero-copy).
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.check_open()?;
        if payload.len() <= self.free() {
            return self.append(payload);
        }
        self.flush_buffer()?;
        self.provider.write(payload)
    }

    /// Gathering write: flushes pending bytes, then hands every buffer in
    /// `payloads` to the provider together.
    pub fn write_payload_list(&mut self, payloads: &[&[u8]]) -> Result<()> {
        self.check_open()?;
        self.flush_buffer()?;
        self.provider.write_vectored(payloads)
    }

    /// Flushes pending bytes, then delegates to the provider's
    /// `transfer_from`, using the (now-empty) write buffer as scratch.
    pub fn transfer_from(&mut self, source: &mut Source, length: u64) -> Result<u64> {
        self.check_open()?;
        self.flush_buffer()?;
        self.provider
            .transfer_from(source, length, self.write_buf.as_mut_slice())
    }

    /// Writes out pending bytes and flushes the underlying provider.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_buffer()?;
        self.provider.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_buffer()?;
        self.provider.close()?;
        self.closed = true;
        self.write_buf.release();
        Ok(())
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::UnpooledAllocator;
    use std::sync::{Arc, Mutex};

    fn sink_into(buf: Arc<Mutex<Vec<u8>>>) -> BufferedSink {
        struct VecWriter(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for VecWriter {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        BufferedSink::new(
            Sink::Stream(Box::new(VecWriter(buf))),
            Arc::new(UnpooledAllocator::default()),
            16,
        )
        .unwrap()
    }

    #[test]
    fn small_writes_stay_buffered_until_flush() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut sink = sink_into(out.clone());
        sink.write(0x01).unwrap();
        sink.write(0x02).unwrap();
        assert!(out.lock().unwrap().is_empty());
        sink.flush().unwrap();
        assert_eq!(&out.lock().unwrap()[..], &[0x01, 0x02]);
    }

    #[test]
    fn large_payload_bypasses_buffer() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut sink = sink_into(out.clone());
        sink.write(0xAA).unwrap();
        let payload = vec![0xBBu8; 64];
        sink.write_payload(&payload).unwrap();
        sink.flush().unwrap();
        let written = out.lock().unwrap();
        assert_eq!(written[0], 0xAA);
        assert_eq!(&written[1..], &payload[..]);
    }

    #[test]
    fn reserve_and_patch_header_round_trips() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut sink = sink_into(out.clone());
        let offset = sink.reserve_header(2).unwrap();
        sink.write(0x42).unwrap();
        sink.patch_header(offset, &[0x01, 0x02]).unwrap();
        sink.flush().unwrap();
        assert_eq!(&out.lock().unwrap()[..], &[0x01, 0x02, 0x42]);
    }

    #[test]
    fn write_format_u32_emits_big_endian() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut sink = sink_into(out.clone());
        sink.write_format_u32(0xCE, 256).unwrap();
        sink.flush().unwrap();
        assert_eq!(&out.lock().unwrap()[..], &[0xCE, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn close_flushes_pending_bytes() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut sink = sink_into(out.clone());
        sink.write(0x09).unwrap();
        sink.close().unwrap();
        assert_eq!(&out.lock().unwrap()[..], &[0x09]);
    }
}
