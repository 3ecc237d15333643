//! Leased buffer handles: a borrowed buffer drawn from an [`Allocator`](super::Allocator),
//! returned to its pool (or simply dropped) when the lease ends.
//!
//! The recycling hook is a `Drop`-based `Arc<dyn Recycler>` callback, the
//! same shape used for returning pooled `BytesMut` storage to a free list in
//! zero-copy buffer pools elsewhere in this codebase's lineage: the pool
//! implementation is injected at lease time so the lease itself stays
//! allocator-agnostic, and release is guaranteed to run exactly once even if
//! the caller forgets to call it explicitly.

use std::sync::Arc;

use bytes::BytesMut;

use crate::error::{Error, Result};

/// Notified exactly once when a [`LeasedByteBuffer`]'s last owner drops it
/// or calls [`LeasedByteBuffer::release`].
pub(crate) trait ByteRecycler: Send + Sync + 'static {
    fn reclaim(&self, storage: Option<BytesMut>, capacity: usize);
}

/// Notified exactly once when a [`LeasedCharBuffer`] is released.
pub(crate) trait CharRecycler: Send + Sync + 'static {
    fn reclaim(&self, storage: Option<String>, capacity: usize);
}

/// A byte buffer on loan from an allocator.
///
/// Invariants (see `spec.md` §3 "Leased buffer"): at most one owner at a
/// time (enforced by normal Rust ownership — a `LeasedByteBuffer` is not
/// `Clone`); release is idempotent; any access after release is a
/// programming error, not a silent no-op, since silently returning stale
/// data would hide caller bugs.
pub struct LeasedByteBuffer {
    storage: Option<BytesMut>,
    capacity: usize,
    recycler: Arc<dyn ByteRecycler>,
    released: bool,
}

impl LeasedByteBuffer {
    pub(crate) fn new(storage: BytesMut, recycler: Arc<dyn ByteRecycler>) -> Self {
        let capacity = storage.capacity();
        Self {
            storage: Some(storage),
            capacity,
            recycler,
            released: false,
        }
    }

    /// Total capacity of the underlying storage. Always `>=` the
    /// `min_capacity` requested when this buffer was leased.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrows the full backing storage as a byte slice of exactly
    /// [`capacity`](Self::capacity) bytes. Callers impose their own
    /// position/limit discipline on top of this raw slice (see
    /// [`crate::io::buffered_source::BufferedSource`] and
    /// [`crate::io::buffered_sink::BufferedSink`]).
    pub fn as_slice(&self) -> &[u8] {
        debug_assert!(!self.released, "use of a released LeasedByteBuffer");
        &self.storage.as_ref().expect("storage present before release")[..self.capacity]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert!(!self.released, "use of a released LeasedByteBuffer");
        let cap = self.capacity;
        &mut self.storage.as_mut().expect("storage present before release")[..cap]
    }

    /// Checks out of the "released" guard without actually returning the
    /// buffer; used by callers (like `try_as_ref`-style helpers) that want a
    /// `Result` rather than a `debug_assert!` panic on misuse in release
    /// builds.
    pub fn ensure_open(&self) -> Result<()> {
        if self.released {
            Err(Error::programming_error(
                "operation on a released LeasedByteBuffer",
            ))
        } else {
            Ok(())
        }
    }

    /// Releases the lease, returning the buffer to its pool (if any).
    /// Idempotent: calling this twice (or dropping after calling it) is a
    /// no-op on the second occasion.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let storage = self.storage.take();
        self.recycler.reclaim(storage, self.capacity);
    }
}

impl Drop for LeasedByteBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

/// A `String`-backed scratch buffer on loan from an allocator, used by the
/// string decoder (`spec.md` §4.I) to accumulate decoded text across
/// refills. Capacity here is measured in bytes of backing storage, sized
/// pessimistically by the caller against the maximum possible expansion
/// factor from encoded bytes to `char`s.
pub struct LeasedCharBuffer {
    storage: Option<String>,
    capacity: usize,
    recycler: Arc<dyn CharRecycler>,
    released: bool,
}

impl LeasedCharBuffer {
    pub(crate) fn new(storage: String, recycler: Arc<dyn CharRecycler>) -> Self {
        let capacity = storage.capacity();
        Self {
            storage: Some(storage),
            capacity,
            recycler,
            released: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_mut_string(&mut self) -> &mut String {
        debug_assert!(!self.released, "use of a released LeasedCharBuffer");
        self.storage.as_mut().expect("storage present before release")
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut storage = self.storage.take();
        if let Some(s) = storage.as_mut() {
            s.clear();
        }
        self.recycler.reclaim(storage, self.capacity);
    }
}

impl Drop for LeasedCharBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRecycler(Arc<AtomicUsize>);
    impl ByteRecycler for CountingRecycler {
        fn reclaim(&self, _storage: Option<BytesMut>, _capacity: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut leased = LeasedByteBuffer::new(
            BytesMut::zeroed(16),
            Arc::new(CountingRecycler(count.clone())),
        );
        leased.release();
        leased.release();
        drop(leased);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_without_explicit_release_still_reclaims_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let leased = LeasedByteBuffer::new(
            BytesMut::zeroed(16),
            Arc::new(CountingRecycler(count.clone())),
        );
        drop(leased);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ensure_open_fails_after_release() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut leased = LeasedByteBuffer::new(
            BytesMut::zeroed(16),
            Arc::new(CountingRecycler(count)),
        );
        leased.release();
        assert!(leased.ensure_open().is_err());
    }
}
