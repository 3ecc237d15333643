//! Construction options for [`crate::codec::Reader`] and [`crate::codec::Writer`].
//!
//! Plain `Clone + Debug` structs with `Default` impls, per `spec.md` §6 and
//! §9 ("Option handling") — no fluent builder layer, since the
//! factory/builder façade is an out-of-scope external collaborator. The
//! allocator and read/write buffer capacity live on [`crate::MessagePack`]'s
//! constructors rather than here, since they're needed before a `Reader` or
//! `Writer` exists at all (to build the underlying buffered source/sink);
//! these options cover everything that only matters once one does.

use crate::codec::IdentifierCache;

/// Options accepted when constructing a [`crate::codec::Reader`].
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Bounds [`crate::codec::Reader::skip_value`]'s running counter, as a
    /// safety valve a caller can opt into when parsing untrusted input. The
    /// default (`None`) is unbounded, matching the reference behavior this
    /// crate traces to (`spec.md` is silent on a cap; bounding by available
    /// input alone is the documented default).
    pub max_skip_iterations: Option<u64>,
    /// When set, decoded strings are interned through this cache instead of
    /// always allocating a fresh `String` (`spec.md` §4.I "Identifier
    /// variant"). Only consulted by [`crate::codec::Reader::read_identifier`],
    /// never by [`crate::codec::Reader::read_str`].
    pub identifier_cache: Option<IdentifierCache>,
}

/// Options accepted when constructing a [`crate::codec::Writer`].
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    /// When set, encoded identifier bytes are cached by value so repeated
    /// writes of the same short string (e.g. a recurring map key) skip
    /// re-encoding. Only consulted by
    /// [`crate::codec::Writer::write_identifier`], never by
    /// [`crate::codec::Writer::write_str`].
    pub identifier_cache: Option<IdentifierCache>,
}

impl std::fmt::Debug for IdentifierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierCache").field("bytes_used", &self.bytes_used()).finish()
    }
}

impl Clone for IdentifierCache {
    /// Clones into a fresh, empty cache at the same budget. Cache *entries*
    /// are an implementation-local optimization, not observable state, so
    /// cloning the accumulated entries themselves isn't required for
    /// correctness — only the budget needs to carry over.
    fn clone(&self) -> Self {
        IdentifierCache::new(self.budget())
    }
}
