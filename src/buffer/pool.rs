//! Size-classed buffer allocator with pooling (component B).
//!
//! [`PooledAllocator`] maintains power-of-two-classed free lists for byte
//! and char buffers, mirroring the free-list-per-size-class shape used by
//! slab allocators in this codebase's lineage, generalized from a single
//! unclassed free list to the size-classed scheme `spec.md` §4.B requires.
//! [`UnpooledAllocator`] implements the same [`Allocator`] trait without
//! retaining anything across leases, for callers who want predictable
//! memory release over reuse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tracing::trace;

use crate::buffer::leased::{ByteRecycler, CharRecycler, LeasedByteBuffer, LeasedCharBuffer};
use crate::error::{Error, Result};

/// The smallest size class a pooled allocator will ever hand out, matching
/// the minimum read/write buffer capacity `spec.md` §4.E/§4.F require (a
/// header plus an 8-byte value must always fit).
pub const MIN_CLASS: usize = 16;

/// Configuration for [`PooledAllocator`]. Field defaults match `spec.md`
/// §6's "Recognized options for pooled allocator" table. This is a plain
/// struct rather than a fluent builder per §9 ("Option handling") — the
/// builder/factory façade is an out-of-scope external collaborator.
#[derive(Debug, Clone)]
pub struct AllocatorOptions {
    pub max_byte_buffer_capacity: usize,
    pub max_char_buffer_capacity: usize,
    pub max_pooled_byte_buffer_capacity: usize,
    pub max_pooled_char_buffer_capacity: usize,
    pub max_byte_buffer_pool_capacity: usize,
    pub max_char_buffer_pool_capacity: usize,
    pub prefer_direct_buffers: bool,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            max_byte_buffer_capacity: usize::MAX,
            max_char_buffer_capacity: usize::MAX,
            max_pooled_byte_buffer_capacity: 1024 * 1024,
            max_pooled_char_buffer_capacity: 512 * 1024,
            max_byte_buffer_pool_capacity: 64 * 1024 * 1024,
            max_char_buffer_pool_capacity: 32 * 1024 * 1024,
            prefer_direct_buffers: false,
        }
    }
}

/// Whether a pooled byte buffer's backing storage should be treated as
/// direct (off-heap-preferred) or ordinary heap storage. Both variants
/// currently allocate equivalent `BytesMut` storage — see DESIGN.md for why
/// the type-level distinction is kept even though the two backends are
/// presently identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Heap,
    Direct,
}

/// Rounds `min_capacity` up to the nearest power of two, floored at
/// [`MIN_CLASS`].
pub(crate) fn size_class(min_capacity: usize) -> usize {
    if min_capacity <= MIN_CLASS {
        return MIN_CLASS;
    }
    min_capacity.next_power_of_two()
}

/// Leases and recycles byte/char buffers, enforcing capacity limits. Both
/// [`PooledAllocator`] and [`UnpooledAllocator`] implement this one
/// interface (`spec.md` §4.B: "pooled and unpooled variants behind one
/// interface").
pub trait Allocator: Send + Sync + 'static {
    fn get_byte_buffer(&self, min_capacity: usize) -> Result<LeasedByteBuffer>;
    fn get_char_buffer(&self, min_capacity: usize) -> Result<LeasedCharBuffer>;
    fn max_byte_capacity(&self) -> usize;
    fn max_char_capacity(&self) -> usize;
    fn close(&self);
}

struct ByteFreeLists {
    // Keyed by (size class, kind) so heap and direct buffers never share a
    // free list, per `spec.md` §4.B.
    classes: Mutex<HashMap<(usize, BufferKind), Vec<BytesMut>>>,
    pooled_bytes: AtomicUsize,
}

struct CharFreeLists {
    classes: Mutex<HashMap<usize, Vec<String>>>,
    pooled_chars: AtomicUsize,
}

/// A size-classed, pooling [`Allocator`]. See `spec.md` §4.B for the full
/// classify/lease/release algorithm this implements.
pub struct PooledAllocator {
    options: AllocatorOptions,
    bytes: Arc<ByteFreeLists>,
    chars: Arc<CharFreeLists>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl PooledAllocator {
    pub fn new(options: AllocatorOptions) -> Self {
        Self {
            options,
            bytes: Arc::new(ByteFreeLists {
                classes: Mutex::new(HashMap::new()),
                pooled_bytes: AtomicUsize::new(0),
            }),
            chars: Arc::new(CharFreeLists {
                classes: Mutex::new(HashMap::new()),
                pooled_chars: AtomicUsize::new(0),
            }),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    fn buffer_kind(&self, class: usize) -> BufferKind {
        if self.options.prefer_direct_buffers && class <= self.options.max_pooled_byte_buffer_capacity {
            BufferKind::Direct
        } else {
            BufferKind::Heap
        }
    }
}

struct PoolByteRecycler {
    bytes: Arc<ByteFreeLists>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    max_pooled_capacity: usize,
    max_pool_capacity: usize,
    kind: BufferKind,
}

impl ByteRecycler for PoolByteRecycler {
    fn reclaim(&self, storage: Option<BytesMut>, capacity: usize) {
        let Some(mut buf) = storage else { return };
        if self.closed.load(Ordering::Acquire) {
            trace!(capacity, "dropping returned byte buffer: allocator closed");
            return;
        }
        if capacity > self.max_pooled_capacity {
            trace!(capacity, "dropping returned byte buffer: exceeds pooled class cap");
            return;
        }
        let mut classes = self.bytes.classes.lock().expect("free-list lock poisoned");
        let current_total = self.bytes.pooled_bytes.load(Ordering::Relaxed);
        if current_total.saturating_add(capacity) > self.max_pool_capacity {
            trace!(capacity, current_total, "dropping returned byte buffer: pool at capacity");
            return;
        }
        buf.clear();
        classes.entry((capacity, self.kind)).or_default().push(buf);
        self.bytes.pooled_bytes.fetch_add(capacity, Ordering::Relaxed);
    }
}

struct PoolCharRecycler {
    chars: Arc<CharFreeLists>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    max_pooled_capacity: usize,
    max_pool_capacity: usize,
}

impl CharRecycler for PoolCharRecycler {
    fn reclaim(&self, storage: Option<String>, capacity: usize) {
        let Some(mut s) = storage else { return };
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if capacity > self.max_pooled_capacity {
            return;
        }
        let mut classes = self.chars.classes.lock().expect("free-list lock poisoned");
        let current_total = self.chars.pooled_chars.load(Ordering::Relaxed);
        if current_total.saturating_add(capacity) > self.max_pool_capacity {
            return;
        }
        s.clear();
        classes.entry(capacity).or_default().push(s);
        self.chars.pooled_chars.fetch_add(capacity, Ordering::Relaxed);
    }
}

impl Allocator for PooledAllocator {
    fn get_byte_buffer(&self, min_capacity: usize) -> Result<LeasedByteBuffer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::programming_error("allocator is closed"));
        }
        if min_capacity > self.options.max_byte_buffer_capacity {
            return Err(Error::size_limit_exceeded(format!(
                "requested byte buffer capacity {min_capacity} exceeds max {}",
                self.options.max_byte_buffer_capacity
            )));
        }
        let class = size_class(min_capacity);
        let kind = self.buffer_kind(class);
        let pooled = {
            let mut classes = self.bytes.classes.lock().expect("free-list lock poisoned");
            classes.get_mut(&(class, kind)).and_then(|list| list.pop())
        };
        let buf = match pooled {
            Some(mut buf) => {
                self.bytes.pooled_bytes.fetch_sub(class, Ordering::Relaxed);
                buf.clear();
                buf.resize(class, 0);
                buf
            }
            None => {
                trace!(class, ?kind, "allocating fresh byte buffer for size class");
                let mut buf = BytesMut::zeroed(class);
                buf.resize(class, 0);
                buf
            }
        };
        let max_pooled_capacity = if class > self.options.max_pooled_byte_buffer_capacity {
            0 // never pool this class; see classify rule below.
        } else {
            self.options.max_pooled_byte_buffer_capacity
        };
        let recycler = Arc::new(PoolByteRecycler {
            bytes: self.bytes.clone(),
            closed: self.closed.clone(),
            max_pooled_capacity,
            max_pool_capacity: self.options.max_byte_buffer_pool_capacity,
            kind,
        });
        Ok(LeasedByteBuffer::new(buf, recycler))
    }

    fn get_char_buffer(&self, min_capacity: usize) -> Result<LeasedCharBuffer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::programming_error("allocator is closed"));
        }
        if min_capacity > self.options.max_char_buffer_capacity {
            return Err(Error::size_limit_exceeded(format!(
                "requested char buffer capacity {min_capacity} exceeds max {}",
                self.options.max_char_buffer_capacity
            )));
        }
        let class = size_class(min_capacity);
        let pooled = {
            let mut classes = self.chars.classes.lock().expect("free-list lock poisoned");
            classes.get_mut(&class).and_then(|list| list.pop())
        };
        let s = match pooled {
            Some(mut s) => {
                self.chars.pooled_chars.fetch_sub(class, Ordering::Relaxed);
                s.clear();
                s
            }
            None => String::with_capacity(class),
        };
        let max_pooled_capacity = if class > self.options.max_pooled_char_buffer_capacity {
            0
        } else {
            self.options.max_pooled_char_buffer_capacity
        };
        let recycler = Arc::new(PoolCharRecycler {
            chars: self.chars.clone(),
            closed: self.closed.clone(),
            max_pooled_capacity,
            max_pool_capacity: self.options.max_char_buffer_pool_capacity,
        });
        Ok(LeasedCharBuffer::new(s, recycler))
    }

    fn max_byte_capacity(&self) -> usize {
        self.options.max_byte_buffer_capacity
    }

    fn max_char_capacity(&self) -> usize {
        self.options.max_char_buffer_capacity
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut classes = self.bytes.classes.lock().expect("free-list lock poisoned");
        classes.clear();
        self.bytes.pooled_bytes.store(0, Ordering::Relaxed);
        let mut char_classes = self.chars.classes.lock().expect("free-list lock poisoned");
        char_classes.clear();
        self.chars.pooled_chars.store(0, Ordering::Relaxed);
    }
}

impl Drop for PooledAllocator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Recycler that never pools anything: every release drops its storage.
struct NoopByteRecycler;
impl ByteRecycler for NoopByteRecycler {
    fn reclaim(&self, _storage: Option<BytesMut>, _capacity: usize) {}
}
struct NoopCharRecycler;
impl CharRecycler for NoopCharRecycler {
    fn reclaim(&self, _storage: Option<String>, _capacity: usize) {}
}

/// An [`Allocator`] that allocates exactly what is asked for (rounded up to
/// the same size class used by [`PooledAllocator`], for behavioral
/// consistency) and never retains anything across leases.
pub struct UnpooledAllocator {
    max_byte_capacity: usize,
    max_char_capacity: usize,
    closed: std::sync::atomic::AtomicBool,
}

impl UnpooledAllocator {
    pub fn new(max_byte_capacity: usize, max_char_capacity: usize) -> Self {
        Self {
            max_byte_capacity,
            max_char_capacity,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl Default for UnpooledAllocator {
    fn default() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }
}

impl Allocator for UnpooledAllocator {
    fn get_byte_buffer(&self, min_capacity: usize) -> Result<LeasedByteBuffer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::programming_error("allocator is closed"));
        }
        if min_capacity > self.max_byte_capacity {
            return Err(Error::size_limit_exceeded(format!(
                "requested byte buffer capacity {min_capacity} exceeds max {}",
                self.max_byte_capacity
            )));
        }
        let class = size_class(min_capacity);
        let buf = BytesMut::zeroed(class);
        Ok(LeasedByteBuffer::new(buf, Arc::new(NoopByteRecycler)))
    }

    fn get_char_buffer(&self, min_capacity: usize) -> Result<LeasedCharBuffer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::programming_error("allocator is closed"));
        }
        if min_capacity > self.max_char_capacity {
            return Err(Error::size_limit_exceeded(format!(
                "requested char buffer capacity {min_capacity} exceeds max {}",
                self.max_char_capacity
            )));
        }
        let class = size_class(min_capacity);
        Ok(LeasedCharBuffer::new(
            String::with_capacity(class),
            Arc::new(NoopCharRecycler),
        ))
    }

    fn max_byte_capacity(&self) -> usize {
        self.max_byte_capacity
    }

    fn max_char_capacity(&self) -> usize {
        self.max_char_capacity
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_class_rounds_up_to_power_of_two_floored_at_min() {
        assert_eq!(size_class(0), MIN_CLASS);
        assert_eq!(size_class(1), MIN_CLASS);
        assert_eq!(size_class(16), 16);
        assert_eq!(size_class(17), 32);
        assert_eq!(size_class(1024), 1024);
        assert_eq!(size_class(1025), 2048);
    }

    #[test]
    fn leasing_beyond_max_capacity_fails() {
        let allocator = PooledAllocator::new(AllocatorOptions {
            max_byte_buffer_capacity: 64,
            ..Default::default()
        });
        assert!(allocator.get_byte_buffer(32).is_ok());
        let err = allocator.get_byte_buffer(128).unwrap_err();
        assert_eq!(err.code(), "buffer.size_limit_exceeded");
    }

    #[test]
    fn released_buffer_is_reused_from_its_size_class() {
        let allocator = PooledAllocator::new(AllocatorOptions::default());
        {
            let mut buf = allocator.get_byte_buffer(100).unwrap();
            buf.as_mut_slice()[0] = 0xaa;
        } // dropped -> released -> recycled into the 128-byte class.
        let classes = allocator.bytes.classes.lock().unwrap();
        assert!(classes.contains_key(&(128, BufferKind::Heap)));
    }

    #[test]
    fn recycled_buffer_is_cleared_before_reuse() {
        let allocator = PooledAllocator::new(AllocatorOptions::default());
        {
            let mut buf = allocator.get_byte_buffer(16).unwrap();
            buf.as_mut_slice().fill(0xff);
        }
        let buf = allocator.get_byte_buffer(16).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn closing_allocator_discards_pool_and_rejects_new_leases() {
        let allocator = PooledAllocator::new(AllocatorOptions::default());
        {
            let _buf = allocator.get_byte_buffer(16).unwrap();
        }
        allocator.close();
        assert!(allocator.get_byte_buffer(16).is_err());
        let classes = allocator.bytes.classes.lock().unwrap();
        assert!(classes.is_empty());
    }

    #[test]
    fn buffers_returned_after_close_are_not_pooled() {
        let allocator = PooledAllocator::new(AllocatorOptions::default());
        let buf = allocator.get_byte_buffer(16).unwrap();
        allocator.close();
        drop(buf);
        let classes = allocator.bytes.classes.lock().unwrap();
        assert!(classes.is_empty());
    }

    #[test]
    fn unpooled_allocator_never_reuses_buffers() {
        let allocator = UnpooledAllocator::default();
        let a = allocator.get_byte_buffer(64).unwrap();
        drop(a);
        let b = allocator.get_byte_buffer(64).unwrap();
        assert_eq!(b.capacity(), 64);
    }

    #[test]
    fn pool_trace_events_are_observable_through_a_subscriber() {
        // Pool hit/miss/grow accounting is only ever surfaced via `tracing`
        // events (no return value exposes it) — wire up a subscriber here so
        // that's exercised by at least one test, the same way a caller would
        // enable logging to diagnose pool thrashing in production.
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("trace"))
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let allocator = PooledAllocator::new(AllocatorOptions::default());
        let _ = allocator.get_byte_buffer(100).unwrap();
        let _ = allocator.get_byte_buffer(100).unwrap();
    }

    #[test]
    fn class_exceeding_max_pooled_capacity_is_never_pooled() {
        let allocator = PooledAllocator::new(AllocatorOptions {
            max_pooled_byte_buffer_capacity: 32,
            ..Default::default()
        });
        {
            let _buf = allocator.get_byte_buffer(1024).unwrap();
        }
        let classes = allocator.bytes.classes.lock().unwrap();
        assert!(classes.is_empty(), "1024-byte class exceeds the 32-byte pooled cap");
    }
}
