//! Pluggable byte producers (component C).
//!
//! `spec.md` §4.C describes source providers as a sum type over
//! stream/channel/in-memory/empty collaborators, each exposing the same
//! `read`/`skip`/`transfer_to`/`close` contract. We re-express that as a
//! Rust enum dispatching to per-variant methods rather than a trait-object
//! hierarchy, since the variant set is closed and known up front — the
//! tagged-variant shape this crate's lineage recommends for exactly this
//! situation (provider polymorphism without inheritance).
//!
//! Every `read` returns `Ok(0)` at end-of-input, following `std::io::Read`
//! convention, rather than the `-1` sentinel a host language without a
//! dedicated "no more bytes" return value would use.

use std::io::{self, Read, Write};

use bytes::Bytes;
use tracing::trace;

use crate::error::Result;

/// A byte producer. See the module documentation for the rationale behind
/// representing this as an enum rather than a trait object hierarchy.
pub enum Source {
    /// Wraps any blocking `Read` implementer (the Rust analogue of an
    /// `InputStream` collaborator).
    Stream(Box<dyn Read + Send>),
    /// Wraps a `Read` implementer that additionally represents a channel:
    /// `transfer_to` between two `Channel` ends takes the zero-copy fast
    /// path in [`super::sink::Sink`] instead of draining through a scratch
    /// buffer.
    Channel(Box<dyn Read + Send>),
    /// An exhaustible in-memory payload.
    InMemory(Bytes),
    /// Always reports end-of-input immediately.
    Empty,
}

impl Source {
    /// Reads up to `buf.len()` bytes, returning the number of bytes read,
    /// or `0` at end of input. `min_hint` is advisory and is currently only
    /// consulted by the `Stream` variant, which may choose to read less
    /// than `buf.len()` when it knows less is available without blocking —
    /// Rust's `Read` trait gives us no portable `available()` probe, so in
    /// practice every variant here simply reads as much as `buf` allows.
    pub fn read(&mut self, buf: &mut [u8], _min_hint: usize) -> Result<usize> {
        match self {
            Source::Stream(r) => Ok(r.read(buf)?),
            Source::Channel(r) => Ok(r.read(buf)?),
            Source::InMemory(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes_advance(bytes, n);
                Ok(n)
            }
            Source::Empty => Ok(0),
        }
    }

    /// Advances past `n` bytes, using `scratch` to drain bytes that must be
    /// read (and discarded) because the underlying source has no native
    /// seek-forward.
    pub fn skip(&mut self, mut n: u64, scratch: &mut [u8]) -> Result<()> {
        if let Source::InMemory(bytes) = self {
            let skip = (n as usize).min(bytes.len());
            bytes_advance(bytes, skip);
            n -= skip as u64;
        }
        while n > 0 {
            let want = (n as usize).min(scratch.len());
            let read = self.read(&mut scratch[..want], want)?;
            if read == 0 {
                return Err(crate::error::Error::unexpected_end(n as usize, 0));
            }
            n -= read as u64;
        }
        Ok(())
    }

    /// Copies exactly `length` bytes to `sink`, using `scratch` as a
    /// relay buffer. `Channel`-to-`Channel` transfers are special-cased in
    /// [`super::sink::Sink::transfer_from`], which introspects both ends
    /// before falling back to this generic loop.
    pub fn transfer_to(&mut self, sink: &mut dyn Write, length: u64, scratch: &mut [u8]) -> Result<u64> {
        if let Source::InMemory(bytes) = self {
            // Already fully resident; skip the scratch buffer entirely.
            let n = (length as usize).min(bytes.len());
            sink.write_all(&bytes[..n])?;
            bytes_advance(bytes, n);
            if (n as u64) < length {
                return Err(crate::error::Error::unexpected_end(
                    (length - n as u64) as usize,
                    0,
                ));
            }
            return Ok(n as u64);
        }
        let mut remaining = length;
        let mut copied = 0u64;
        while remaining > 0 {
            let want = (remaining as usize).min(scratch.len());
            let read = self.read(&mut scratch[..want], want)?;
            if read == 0 {
                return Err(crate::error::Error::unexpected_end(remaining as usize, 0));
            }
            sink.write_all(&scratch[..read])?;
            remaining -= read as u64;
            copied += read as u64;
        }
        Ok(copied)
    }

    pub fn close(&mut self) -> Result<()> {
        trace!("closing source");
        // `Read` has no `close` of its own in Rust; dropping the boxed
        // reader (by replacing it with `Empty`) releases any owned fd/socket.
        *self = Source::Empty;
        Ok(())
    }

    /// True if this variant is a `Channel`, used by the sink's fast-path
    /// introspection for `transfer_from`/`transfer_to`.
    pub(crate) fn is_channel(&self) -> bool {
        matches!(self, Source::Channel(_))
    }
}

fn bytes_advance(bytes: &mut Bytes, n: usize) {
    let _ = bytes.split_to(n);
}

impl io::Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        match self.read(buf, len) {
            Ok(n) => Ok(n),
            Err(crate::error::Error::Io(e)) => Err(e),
            Err(other) => Err(io::Error::new(io::ErrorKind::Other, other)),
        }
    }
}
