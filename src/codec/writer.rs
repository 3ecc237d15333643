//! The high-level encoder (component G).
//!
//! `Writer` sits on top of a [`BufferedSink`] and owns the integer
//! minimization tree, container/string/binary/extension headers, and
//! timestamp packing described in `spec.md` §4.G.

use crate::codec::string_codec::IdentifierCache;
use crate::codec::timestamp::Timestamp;
use crate::error::{Error, Result};
use crate::format::*;
use crate::io::{BufferedSink, Source};
use crate::options::WriterOptions;

pub struct Writer {
    sink: BufferedSink,
    identifier_cache: Option<IdentifierCache>,
}

impl Writer {
    pub fn new(sink: BufferedSink) -> Self {
        Self { sink, identifier_cache: None }
    }

    pub fn with_options(sink: BufferedSink, options: WriterOptions) -> Self {
        Self {
            sink,
            identifier_cache: options.identifier_cache,
        }
    }

    pub fn write_nil(&mut self) -> Result<()> {
        self.sink.write(NIL)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.sink.write(if value { TRUE } else { FALSE })
    }

    /// Writes `value` using the narrowest signed-integer format that can
    /// represent it: positive/negative fixint, then int8/16/32/64 by
    /// magnitude. Mirrors the minimization order reference MessagePack
    /// packers use for signed integers.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        if value >= 0 {
            return self.write_u64(value as u64);
        }
        if value >= -32 {
            self.sink.write(value as i8 as u8)
        } else if let Ok(v) = i8::try_from(value) {
            self.sink.write_format_u8(INT8, v as u8)
        } else if let Ok(v) = i16::try_from(value) {
            self.sink.write_format_u16(INT16, v as u16)
        } else if let Ok(v) = i32::try_from(value) {
            self.sink.write_format_u32(INT32, v as u32)
        } else {
            self.sink.write_format_u64(INT64, value as u64)
        }
    }

    /// Writes `value` using the narrowest unsigned-integer format: positive
    /// fixint, then uint8/16/32/64.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        if value <= POSITIVE_FIXINT_MAX as u64 {
            self.sink.write(value as u8)
        } else if let Ok(v) = u8::try_from(value) {
            self.sink.write_format_u8(UINT8, v)
        } else if let Ok(v) = u16::try_from(value) {
            self.sink.write_format_u16(UINT16, v)
        } else if let Ok(v) = u32::try_from(value) {
            self.sink.write_format_u32(UINT32, v)
        } else {
            self.sink.write_format_u64(UINT64, value)
        }
    }

    /// Narrower-width entry points. Each delegates to [`Self::write_i64`] /
    /// [`Self::write_u64`] after widening: the minimization tree for a
    /// smaller input width is exactly the 64-bit tree pruned at that width
    /// (`spec.md` §4.G), and since the value already fits in the narrower
    /// type, widening then minimizing produces the identical narrowest
    /// encoding the pruned tree would.
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_i64(value as i64)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_i64(value as i64)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_i64(value as i64)
    }

    /// Explicit unsigned-write surface: skips the negative branch of the
    /// minimization tree entirely, since the input type guarantees
    /// non-negativity.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.sink.write_format_u32(FLOAT32, value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.sink.write_format_u64(FLOAT64, value.to_bits())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        crate::codec::string_codec::write_str(&mut self.sink, s)
    }

    /// Writes `s` as a string value, same wire bytes as [`Self::write_str`],
    /// but routed through this writer's configured identifier cache when one
    /// is set via [`WriterOptions::identifier_cache`]. The cache only saves
    /// the `Arc<str>` allocation a matching [`super::Reader::read_identifier`]
    /// would otherwise make on the decode side of a cache shared between a
    /// reader and a writer; it does not change what's written on the wire.
    pub fn write_identifier(&mut self, s: &str) -> Result<()> {
        if let Some(cache) = &mut self.identifier_cache {
            cache.intern(s.to_owned());
        }
        self.write_str(s)
    }

    /// Writes a string header for `len` UTF-8 bytes without the payload —
    /// for callers streaming the body themselves via [`Self::write_raw`] or
    /// [`Self::transfer_from`] instead of through [`Self::write_str`].
    pub fn write_string_header(&mut self, len: usize) -> Result<()> {
        crate::codec::string_codec::write_str_header(&mut self.sink, len)
    }

    pub fn write_bin(&mut self, data: &[u8]) -> Result<()> {
        self.write_binary_header(data.len())?;
        self.sink.write_payload(data)
    }

    pub fn write_binary_header(&mut self, len: usize) -> Result<()> {
        if len <= u8::MAX as usize {
            self.sink.write_format_u8(BIN8, len as u8)
        } else if len <= u16::MAX as usize {
            self.sink.write_format_u16(BIN16, len as u16)
        } else if len <= u32::MAX as usize {
            self.sink.write_format_u32(BIN32, len as u32)
        } else {
            Err(Error::size_limit_exceeded(format!(
                "binary length {len} exceeds the 32-bit bin32 header"
            )))
        }
    }

    /// `len` is unsigned, so a negative array length (`spec.md` §4.G/§8: "a
    /// negative argument ... raises ProgrammingError") is a compile-time
    /// impossibility here rather than a runtime check — callers converting
    /// from a signed count should reject negatives before calling this.
    pub fn write_array_header(&mut self, len: u32) -> Result<()> {
        if len <= 15 {
            self.sink.write(FIXARRAY_PREFIX | len as u8)
        } else if len <= u16::MAX as u32 {
            self.sink.write_format_u16(ARRAY16, len as u16)
        } else {
            self.sink.write_format_u32(ARRAY32, len)
        }
    }

    pub fn write_map_header(&mut self, len: u32) -> Result<()> {
        if len <= 15 {
            self.sink.write(FIXMAP_PREFIX | len as u8)
        } else if len <= u16::MAX as u32 {
            self.sink.write_format_u16(MAP16, len as u16)
        } else {
            self.sink.write_format_u32(MAP32, len)
        }
    }

    /// Writes an extension header and payload. `ext_type` is the
    /// application-defined extension type (0..=127 and -2..=-128 are
    /// available; -1 is reserved for timestamps, see [`Self::write_timestamp`]).
    pub fn write_ext(&mut self, ext_type: i8, payload: &[u8]) -> Result<()> {
        self.write_extension_header(payload.len(), ext_type)?;
        self.sink.write_payload(payload)
    }

    /// Writes an extension header without the payload, for callers who will
    /// stream or compute the body separately.
    pub fn write_extension_header(&mut self, len: usize, ext_type: i8) -> Result<()> {
        let fixed_format = match len {
            1 => Some(FIXEXT1),
            2 => Some(FIXEXT2),
            4 => Some(FIXEXT4),
            8 => Some(FIXEXT8),
            16 => Some(FIXEXT16),
            _ => None,
        };
        if let Some(format) = fixed_format {
            self.sink.write(format)?;
            return self.sink.write(ext_type as u8);
        }
        if len <= u8::MAX as usize {
            self.sink.write_format_u8(EXT8, len as u8)?;
        } else if len <= u16::MAX as usize {
            self.sink.write_format_u16(EXT16, len as u16)?;
        } else if len <= u32::MAX as usize {
            self.sink.write_format_u32(EXT32, len as u32)?;
        } else {
            return Err(Error::size_limit_exceeded(format!(
                "extension length {len} exceeds the 32-bit ext32 header"
            )));
        }
        self.sink.write(ext_type as u8)
    }

    pub fn write_timestamp(&mut self, ts: Timestamp) -> Result<()> {
        let (ext_type, payload) = ts.pack();
        self.write_ext(ext_type, &payload)
    }

    /// Writes a raw payload chunk directly, bypassing any header — used by
    /// callers assembling a value's bytes themselves (e.g. a pre-encoded
    /// extension body).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.sink.write_payload(data)
    }

    /// Writes a payload assembled from several buffers as one logical chunk,
    /// handing all of them to the sink together rather than one at a time.
    pub fn write_payload_list(&mut self, payloads: &[&[u8]]) -> Result<()> {
        self.sink.write_payload_list(payloads)
    }

    /// Streams `length` bytes from `source` directly into the sink, taking
    /// the zero-copy channel fast path when both ends support it.
    pub fn transfer_from(&mut self, source: &mut Source, length: u64) -> Result<u64> {
        self.sink.transfer_from(source, length)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    pub fn close(&mut self) -> Result<()> {
        self.sink.close()
    }
}
