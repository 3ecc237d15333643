//! Pluggable byte consumers (component D).
//!
//! Mirrors [`super::source::Source`]'s shape: a closed, tagged variant set
//! rather than a trait-object hierarchy. `Channel`-flavored sinks detect the
//! "non-blocking channel used where a blocking one is required" condition
//! described in `spec.md` §4.D by mapping `io::ErrorKind::WouldBlock` (and
//! the degenerate `Ok(0)`-forever case `std::io::Write::write_all` already
//! turns into `WriteZero`) onto [`Error::NonBlockingChannel`], which is the
//! idiomatic Rust signal for exactly the symptom the spec describes.

use std::io::{self, IoSlice, Read, Write};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::buffer::Allocator;
use crate::error::{Error, Result};
use crate::io::source::Source;

/// A byte consumer. See the module documentation for why this is an enum.
pub enum Sink {
    /// Wraps any blocking `Write` implementer.
    Stream(Box<dyn Write + Send>),
    /// Wraps a `Write` implementer that additionally represents a channel;
    /// paired with a `Channel`-flavored [`Source`], `transfer_from` takes a
    /// direct `io::copy` fast path instead of relaying through a scratch
    /// buffer.
    Channel(Box<dyn Write + Send>),
    /// Appends to a growable in-memory buffer, publishing the final result
    /// into `output` once [`Sink::close`] is called.
    InMemoryGrowable(GrowableSink),
    /// Discards everything written to it.
    Discarding,
}

/// Backing state for [`Sink::InMemoryGrowable`].
pub struct GrowableSink {
    allocator: Arc<dyn Allocator>,
    buffer: BytesMut,
    max_capacity: usize,
    output: Arc<Mutex<Option<Bytes>>>,
}

impl GrowableSink {
    pub fn new(allocator: Arc<dyn Allocator>, initial_capacity: usize, max_capacity: usize, output: Arc<Mutex<Option<Bytes>>>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(initial_capacity.max(16)),
            allocator,
            max_capacity,
            output,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.buffer.len() + data.len() > self.buffer.capacity() {
            let needed = self.buffer.len() + data.len();
            if needed > self.max_capacity {
                return Err(Error::size_limit_exceeded(format!(
                    "in-memory sink would grow to {needed} bytes, exceeding max {}",
                    self.max_capacity
                )));
            }
            let mut new_capacity = self.buffer.capacity().max(16);
            while new_capacity < needed {
                new_capacity = (new_capacity * 2).min(self.max_capacity).max(new_capacity + 1);
            }
            // Leasing and releasing through the allocator keeps the
            // growable sink's memory traffic visible to the same pool
            // accounting every other buffer acquisition goes through, even
            // though the actual resize below is a plain `BytesMut` copy.
            let _ = self.allocator.get_byte_buffer(new_capacity)?;
            let mut grown = BytesMut::with_capacity(new_capacity);
            grown.extend_from_slice(&self.buffer);
            self.buffer = grown;
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {
        let final_bytes = std::mem::take(&mut self.buffer).freeze();
        *self.output.lock().expect("output slot poisoned") = Some(final_bytes);
    }
}

impl Sink {
    /// Writes all bytes in `buf`.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Sink::Stream(w) => Ok(w.write_all(buf)?),
            Sink::Channel(w) => write_channel(w.as_mut(), buf),
            Sink::InMemoryGrowable(g) => g.write(buf),
            Sink::Discarding => Ok(()),
        }
    }

    /// Gathering write: writes every buffer in `bufs`, in order, as a
    /// single vectored write where the underlying provider supports it,
    /// falling back to sequential `write` calls otherwise.
    pub fn write_vectored(&mut self, bufs: &[&[u8]]) -> Result<()> {
        match self {
            Sink::Stream(w) => {
                let slices: Vec<IoSlice> = bufs.iter().map(|b| IoSlice::new(b)).collect();
                write_all_vectored(w.as_mut(), &slices)?;
                Ok(())
            }
            Sink::Channel(w) => {
                for buf in bufs {
                    write_channel(w.as_mut(), buf)?;
                }
                Ok(())
            }
            _ => {
                for buf in bufs {
                    self.write(buf)?;
                }
                Ok(())
            }
        }
    }

    /// Copies exactly `length` bytes from `source`, using `scratch` as a
    /// relay buffer unless both ends are `Channel`-flavored, in which case
    /// a direct `io::copy` is used instead.
    pub fn transfer_from(&mut self, source: &mut Source, length: u64, scratch: &mut [u8]) -> Result<u64> {
        if let (Sink::Channel(w), true) = (&mut *self, source.is_channel()) {
            trace!(length, "channel-to-channel transfer taking the direct copy path");
            let mut limited = source.by_ref().take(length);
            let copied = io::copy(&mut limited, w)?;
            if copied < length {
                return Err(Error::unexpected_end((length - copied) as usize, 0));
            }
            return Ok(copied);
        }
        let mut remaining = length;
        let mut copied = 0u64;
        while remaining > 0 {
            let want = (remaining as usize).min(scratch.len());
            let read = source.read(&mut scratch[..want], want)?;
            if read == 0 {
                return Err(Error::unexpected_end(remaining as usize, 0));
            }
            self.write(&scratch[..read])?;
            remaining -= read as u64;
            copied += read as u64;
        }
        Ok(copied)
    }

    pub fn flush(&mut self) -> Result<()> {
        match self {
            Sink::Stream(w) => Ok(w.flush()?),
            Sink::Channel(w) => Ok(w.flush()?),
            Sink::InMemoryGrowable(_) | Sink::Discarding => Ok(()),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        if let Sink::InMemoryGrowable(g) = self {
            g.close();
        }
        *self = Sink::Discarding;
        Ok(())
    }
}

impl io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match Sink::write(self, buf) {
            Ok(()) => Ok(buf.len()),
            Err(Error::Io(e)) => Err(e),
            Err(other) => Err(io::Error::new(io::ErrorKind::Other, other)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match Sink::flush(self) {
            Ok(()) => Ok(()),
            Err(Error::Io(e)) => Err(e),
            Err(other) => Err(io::Error::new(io::ErrorKind::Other, other)),
        }
    }
}

fn write_channel(w: &mut (impl Write + ?Sized), buf: &[u8]) -> Result<()> {
    let mut offset = 0;
    while offset < buf.len() {
        match w.write(&buf[offset..]) {
            Ok(0) => {
                return Err(Error::non_blocking_channel(
                    "channel write returned 0 bytes with no error; underlying channel is likely non-blocking",
                ));
            }
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(Error::non_blocking_channel(
                    "channel write returned WouldBlock; this crate requires a blocking channel",
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn write_all_vectored(w: &mut (impl Write + ?Sized), mut bufs: &[IoSlice]) -> io::Result<()> {
    // `IoSlice` does not implement `Clone`, so advancing past fully
    // consumed slices is done by index rather than by mutating in place.
    while !bufs.is_empty() {
        let n = w.write_vectored(bufs)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer list"));
        }
        let mut advanced = 0usize;
        let mut skip = 0usize;
        for (i, b) in bufs.iter().enumerate() {
            if advanced + b.len() <= n {
                advanced += b.len();
                skip = i + 1;
            } else {
                break;
            }
        }
        if skip == bufs.len() {
            return Ok(());
        }
        let remainder_offset = n - advanced;
        let remaining_first = &bufs[skip][remainder_offset..];
        if !remaining_first.is_empty() {
            w.write_all(remaining_first)?;
        }
        bufs = &bufs[skip + 1..];
    }
    Ok(())
}
