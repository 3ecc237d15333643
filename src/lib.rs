//! A buffered, pooled-allocator MessagePack reader/writer pair.
//!
//! The crate is organized in layers, each building on the one before:
//!
//! - [`buffer`] — size-classed buffer pooling and leased buffer handles.
//! - [`io`] — pluggable source/sink providers and the buffered read/write
//!   buffers built on top of them.
//! - [`format`] — the MessagePack format byte table and classifiers.
//! - [`codec`] — the high-level [`Reader`]/[`Writer`] pair, timestamp
//!   packing, and string encode/decode.
//!
//! [`MessagePack`] is the crate's front door: it wires a [`buffer::Allocator`]
//! to a source or sink and hands back a ready-to-use [`codec::Reader`] or
//! [`codec::Writer`].

pub mod buffer;
pub mod codec;
pub mod error;
pub mod format;
pub mod io;
pub mod options;

pub use codec::{IdentifierCache, Reader, Timestamp, Writer};
pub use error::{Error, Result};
pub use format::ValueType;
pub use options::{ReaderOptions, WriterOptions};

use std::sync::Arc;

use buffer::{Allocator, AllocatorOptions, PooledAllocator};
use io::{BufferedSink, BufferedSource, Sink, Source, DEFAULT_READ_BUFFER_CAPACITY, DEFAULT_WRITE_BUFFER_CAPACITY};

/// Entry point for constructing readers and writers against a shared
/// allocator. Most callers should keep one `MessagePack` per allocator and
/// reuse it across many short-lived readers/writers, so pooled buffers
/// actually get reused.
pub struct MessagePack {
    allocator: Arc<dyn Allocator>,
}

impl MessagePack {
    /// Builds a `MessagePack` backed by a [`PooledAllocator`] configured
    /// with `options`.
    pub fn pooled(options: AllocatorOptions) -> Self {
        Self {
            allocator: Arc::new(PooledAllocator::new(options)),
        }
    }

    /// Builds a `MessagePack` whose allocator never retains anything across
    /// leases. Useful for short-lived, one-shot encode/decode calls where
    /// pooling overhead isn't worth it.
    pub fn unpooled() -> Self {
        Self {
            allocator: Arc::new(buffer::UnpooledAllocator::default()),
        }
    }

    /// Wraps an existing allocator, e.g. one shared with unrelated buffer
    /// consumers elsewhere in a host application.
    pub fn with_allocator(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Builds a [`Reader`] over any blocking [`std::io::Read`] implementer.
    pub fn reader(&self, source: impl std::io::Read + Send + 'static) -> Result<Reader> {
        self.reader_with_capacity(source, DEFAULT_READ_BUFFER_CAPACITY)
    }

    pub fn reader_with_capacity(&self, source: impl std::io::Read + Send + 'static, capacity: usize) -> Result<Reader> {
        let buffered = BufferedSource::new(Source::Stream(Box::new(source)), self.allocator.clone(), capacity)?;
        Ok(Reader::new(buffered, self.allocator.clone()))
    }

    /// Builds a [`Reader`] over an in-memory payload, without any
    /// intermediate copy.
    pub fn reader_over_bytes(&self, bytes: bytes::Bytes) -> Result<Reader> {
        let buffered = BufferedSource::new(Source::InMemory(bytes), self.allocator.clone(), DEFAULT_READ_BUFFER_CAPACITY)?;
        Ok(Reader::new(buffered, self.allocator.clone()))
    }

    /// Builds a [`Reader`] over any blocking [`std::io::Read`] implementer,
    /// applying `options` (e.g. a skip-iteration cap or identifier cache).
    pub fn reader_with_options(
        &self,
        source: impl std::io::Read + Send + 'static,
        options: ReaderOptions,
    ) -> Result<Reader> {
        let buffered = BufferedSource::new(
            Source::Stream(Box::new(source)),
            self.allocator.clone(),
            DEFAULT_READ_BUFFER_CAPACITY,
        )?;
        Ok(Reader::with_options(buffered, self.allocator.clone(), options))
    }

    /// Builds a [`Reader`] over an in-memory payload, applying `options`.
    pub fn reader_over_bytes_with_options(&self, bytes: bytes::Bytes, options: ReaderOptions) -> Result<Reader> {
        let buffered = BufferedSource::new(Source::InMemory(bytes), self.allocator.clone(), DEFAULT_READ_BUFFER_CAPACITY)?;
        Ok(Reader::with_options(buffered, self.allocator.clone(), options))
    }

    /// Builds a [`Writer`] over any blocking [`std::io::Write`] implementer.
    pub fn writer(&self, sink: impl std::io::Write + Send + 'static) -> Result<Writer> {
        self.writer_with_capacity(sink, DEFAULT_WRITE_BUFFER_CAPACITY)
    }

    pub fn writer_with_capacity(&self, sink: impl std::io::Write + Send + 'static, capacity: usize) -> Result<Writer> {
        let buffered = BufferedSink::new(Sink::Stream(Box::new(sink)), self.allocator.clone(), capacity)?;
        Ok(Writer::new(buffered))
    }

    /// Builds a [`Writer`] over any blocking [`std::io::Write`] implementer,
    /// applying `options` (e.g. an identifier cache).
    pub fn writer_with_options(&self, sink: impl std::io::Write + Send + 'static, options: WriterOptions) -> Result<Writer> {
        let buffered = BufferedSink::new(Sink::Stream(Box::new(sink)), self.allocator.clone(), DEFAULT_WRITE_BUFFER_CAPACITY)?;
        Ok(Writer::with_options(buffered, options))
    }

    /// Builds a [`Writer`] that appends to a growable in-memory buffer.
    /// `output` receives the final bytes once the writer is closed.
    pub fn writer_to_bytes(
        &self,
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Result<(Writer, Arc<std::sync::Mutex<Option<bytes::Bytes>>>)> {
        let output = Arc::new(std::sync::Mutex::new(None));
        let growable = io::GrowableSink::new(self.allocator.clone(), initial_capacity, max_capacity, output.clone());
        let buffered = BufferedSink::new(Sink::InMemoryGrowable(growable), self.allocator.clone(), DEFAULT_WRITE_BUFFER_CAPACITY)?;
        Ok((Writer::new(buffered), output))
    }
}
