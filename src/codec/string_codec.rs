//! String encode/decode (component I).
//!
//! The MessagePack string header's length field is a byte count, and Rust
//! strings are already validated, length-known UTF-8 byte sequences — so
//! unlike a UTF-16-native host, encoding a `&str` never needs the
//! reserve-then-patch trick this module's header-writing helpers still
//! expose for the one case that does need it: encoding from a source whose
//! byte length isn't known up front (e.g. [`write_str_from_chars`]).

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::Allocator;
use crate::error::{Error, Result};
use crate::format::{FIXSTR_MAX_LEN, FIXSTR_PREFIX, STR16, STR32, STR8};
use crate::io::{BufferedSink, BufferedSource};

/// Writes a string header sized for `len` UTF-8 bytes, choosing the
/// narrowest format per `spec.md` §4.A's str family.
pub(crate) fn write_str_header(sink: &mut BufferedSink, len: usize) -> Result<()> {
    if len <= FIXSTR_MAX_LEN as usize {
        sink.write(FIXSTR_PREFIX | len as u8)
    } else if len <= u8::MAX as usize {
        sink.write_format_u8(STR8, len as u8)
    } else if len <= u16::MAX as usize {
        sink.write_format_u16(STR16, len as u16)
    } else if len <= u32::MAX as usize {
        sink.write_format_u32(STR32, len as u32)
    } else {
        Err(Error::size_limit_exceeded(format!(
            "string length {len} exceeds the 32-bit str32 header"
        )))
    }
}

/// Writes `s` as a complete MessagePack string value.
pub fn write_str(sink: &mut BufferedSink, s: &str) -> Result<()> {
    write_str_header(sink, s.len())?;
    sink.write_payload(s.as_bytes())
}

/// Encodes a string assembled from `chars` without first materializing it,
/// by reserving a pessimistic str32 header, streaming the UTF-8 bytes
/// through the sink, and patching the header once the actual length is
/// known. Falls back to str32's 4-byte header unconditionally since the
/// final length isn't known at reservation time; callers with a known
/// length should prefer [`write_str`], which picks the narrowest header.
pub fn write_str_from_chars(sink: &mut BufferedSink, chars: impl Iterator<Item = char>) -> Result<()> {
    let header_offset = sink.reserve_header(5)?;
    sink.patch_header(header_offset, &[STR32, 0, 0, 0, 0])?;
    let mut encoded_len: u32 = 0;
    let mut char_buf = [0u8; 4];
    for c in chars {
        let bytes = c.encode_utf8(&mut char_buf).as_bytes();
        sink.write_payload(bytes)?;
        encoded_len = encoded_len
            .checked_add(bytes.len() as u32)
            .ok_or_else(|| Error::size_limit_exceeded("encoded string exceeds 2^32 bytes"))?;
    }
    // The header is only safely patchable while still unflushed; callers
    // are responsible for not flushing between `reserve_header` and here,
    // same as the patch contract `BufferedSink` documents.
    sink.patch_header(header_offset, &encoded_len.to_be_bytes())?;
    Ok(())
}

/// Reads a MessagePack string payload of `len` bytes and validates it as
/// UTF-8, leasing a byte buffer from `allocator` for the read so the lease
/// participates in the same pool accounting every other buffer does.
pub fn read_str(source: &mut BufferedSource, allocator: &Arc<dyn Allocator>, len: u32) -> Result<String> {
    let len = len as usize;
    let mut leased = allocator.get_byte_buffer(len.max(1))?;
    source.read_payload(&mut leased.as_mut_slice()[..len])?;
    let s = std::str::from_utf8(&leased.as_slice()[..len])
        .map_err(|e| Error::invalid_string_encoding(format!("string payload is not valid UTF-8: {e}")))?
        .to_owned();
    leased.release();
    Ok(s)
}

/// Bounds how much decoded-string memory a [`IdentifierCache`] retains.
pub const DEFAULT_IDENTIFIER_CACHE_BYTE_BUDGET: usize = 64 * 1024;

/// An optional decorator that interns repeatedly-decoded strings (e.g. map
/// keys in a schema-like payload) behind `Arc<str>`, so a reader processing
/// many structurally similar values doesn't re-allocate the same short
/// strings over and over. Bounded by a byte budget; once the budget is
/// exhausted new strings are returned uninterned rather than evicting
/// existing entries, since eviction policy isn't specified and a simple
/// first-come cache is sufficient for the common case (a small, stable set
/// of recurring keys).
pub struct IdentifierCache {
    entries: HashMap<String, Arc<str>>,
    budget: usize,
    used: usize,
}

impl IdentifierCache {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            budget,
            used: 0,
        }
    }

    /// Returns a shared handle for `s`, interning it if it's new and the
    /// budget allows, or simply wrapping it in a fresh `Arc` otherwise.
    pub fn intern(&mut self, s: String) -> Arc<str> {
        if let Some(existing) = self.entries.get(&s) {
            return existing.clone();
        }
        let cost = s.len();
        if self.used + cost > self.budget {
            return Arc::from(s);
        }
        let shared: Arc<str> = Arc::from(s.as_str());
        self.used += cost;
        self.entries.insert(s, shared.clone());
        shared
    }

    pub fn bytes_used(&self) -> usize {
        self.used
    }

    pub fn budget(&self) -> usize {
        self.budget
    }
}

impl Default for IdentifierCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_CACHE_BYTE_BUDGET)
    }
}
