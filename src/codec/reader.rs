//! The high-level decoder (component H).
//!
//! `Reader` sits on top of a [`BufferedSource`] and owns type dispatch
//! (widening reads with overflow detection), container/string/binary/
//! extension header decoding, timestamp unpacking, and the iterative
//! `skip_value` algorithm described in `spec.md` §4.H.

use std::sync::Arc;

use crate::buffer::Allocator;
use crate::codec::string_codec::{self, IdentifierCache};
use crate::codec::timestamp::Timestamp;
use crate::error::{Error, Result};
use crate::format::*;
use crate::io::{BufferedSource, Sink};
use crate::options::ReaderOptions;

pub struct Reader {
    source: BufferedSource,
    allocator: Arc<dyn Allocator>,
    max_skip_iterations: Option<u64>,
    identifier_cache: Option<IdentifierCache>,
}

impl Reader {
    pub fn new(source: BufferedSource, allocator: Arc<dyn Allocator>) -> Self {
        Self {
            source,
            allocator,
            max_skip_iterations: None,
            identifier_cache: None,
        }
    }

    pub fn with_options(source: BufferedSource, allocator: Arc<dyn Allocator>, options: ReaderOptions) -> Self {
        Self {
            source,
            allocator,
            max_skip_iterations: options.max_skip_iterations,
            identifier_cache: options.identifier_cache,
        }
    }

    /// Peeks the next format byte's [`ValueType`] without consuming it.
    /// Idempotent: calling this repeatedly without an intervening read
    /// returns the same answer.
    pub fn next_type(&mut self) -> Result<ValueType> {
        let format = self.source.next_byte()?;
        if format == RESERVED {
            return Err(Error::invalid_header("format byte 0xc1 is reserved"));
        }
        Ok(FORMAT_TABLE.lookup(format))
    }

    pub fn read_nil(&mut self) -> Result<()> {
        let format = self.source.read_byte()?;
        if format != NIL {
            return Err(Error::type_mismatch(format!("expected nil, got format byte 0x{format:02x}")));
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let format = self.source.read_byte()?;
        match format {
            TRUE => Ok(true),
            FALSE => Ok(false),
            other => Err(Error::type_mismatch(format!("expected bool, got format byte 0x{other:02x}"))),
        }
    }

    /// Reads an integer of any width/signedness and widens it to `i64`,
    /// failing with `TypeMismatch` if the format byte isn't an integer or
    /// (for `uint64`) the value doesn't fit in `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        let format = self.source.read_byte()?;
        if is_positive_fixint(format) {
            return Ok(format as i64);
        }
        if is_negative_fixint(format) {
            return Ok(format as i8 as i64);
        }
        match format {
            UINT8 => Ok(self.source.read_u_byte()? as i64),
            UINT16 => Ok(self.source.read_u_short()? as i64),
            UINT32 => Ok(self.source.read_u_int()? as i64),
            UINT64 => {
                let v = self.source.read_u_long()?;
                i64::try_from(v).map_err(|_| Error::type_mismatch(format!("uint64 value {v} does not fit in i64")))
            }
            INT8 => Ok(self.source.read_byte()? as i8 as i64),
            INT16 => Ok(self.source.read_short()? as i64),
            INT32 => Ok(self.source.read_int()? as i64),
            INT64 => self.source.read_long(),
            other => Err(Error::type_mismatch(format!("expected integer, got format byte 0x{other:02x}"))),
        }
    }

    /// Reads an integer of any width and widens it to `u64`, failing with
    /// `TypeMismatch` if the format byte isn't an integer or the value is
    /// negative.
    pub fn read_u64(&mut self) -> Result<u64> {
        let format = self.source.read_byte()?;
        if is_positive_fixint(format) {
            return Ok(format as u64);
        }
        if is_negative_fixint(format) {
            return Err(Error::type_mismatch("negative fixint does not fit in u64"));
        }
        match format {
            UINT8 => Ok(self.source.read_u_byte()? as u64),
            UINT16 => Ok(self.source.read_u_short()? as u64),
            UINT32 => Ok(self.source.read_u_int()? as u64),
            UINT64 => self.source.read_u_long(),
            INT8 => {
                let v = self.source.read_byte()? as i8;
                u64::try_from(v).map_err(|_| Error::type_mismatch(format!("int8 value {v} is negative")))
            }
            INT16 => {
                let v = self.source.read_short()?;
                u64::try_from(v).map_err(|_| Error::type_mismatch(format!("int16 value {v} is negative")))
            }
            INT32 => {
                let v = self.source.read_int()?;
                u64::try_from(v).map_err(|_| Error::type_mismatch(format!("int32 value {v} is negative")))
            }
            INT64 => {
                let v = self.source.read_long()?;
                u64::try_from(v).map_err(|_| Error::type_mismatch(format!("int64 value {v} is negative")))
            }
            other => Err(Error::type_mismatch(format!("expected integer, got format byte 0x{other:02x}"))),
        }
    }

    /// Reads an integer and narrows it to `i8`, failing with `TypeMismatch`
    /// (overflow detail included) if the decoded value doesn't fit — unlike
    /// [`Self::read_i64`], which accepts any integer format and only fails
    /// when the value can't fit in 64 bits.
    pub fn read_i8(&mut self) -> Result<i8> {
        let v = self.read_i64()?;
        i8::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in i8")))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let v = self.read_i64()?;
        i16::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in i16")))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let v = self.read_i64()?;
        i32::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in i32")))
    }

    /// Reads an integer and narrows it to `u8`, rejecting negative values
    /// and values too large for the width, both as `TypeMismatch`.
    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.read_u64()?;
        u8::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in u8")))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = self.read_u64()?;
        u16::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in u16")))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = self.read_u64()?;
        u32::try_from(v).map_err(|_| Error::type_mismatch(format!("value {v} does not fit in u32")))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let format = self.source.read_byte()?;
        if format != FLOAT32 {
            return Err(Error::type_mismatch(format!("expected float32, got format byte 0x{format:02x}")));
        }
        Ok(f32::from_bits(self.source.read_u_int()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let format = self.source.read_byte()?;
        if format != FLOAT64 {
            return Err(Error::type_mismatch(format!("expected float64, got format byte 0x{format:02x}")));
        }
        Ok(f64::from_bits(self.source.read_u_long()?))
    }

    /// Reads a string header, returning the byte length of the payload that
    /// follows. Separated from [`Self::read_str`] so callers can stream the
    /// payload themselves (e.g. via [`Self::read_payload`] or
    /// [`Self::transfer_to`]) instead of materializing a `String`.
    pub fn read_string_header(&mut self) -> Result<u32> {
        let format = self.source.read_byte()?;
        if is_fixstr(format) {
            return Ok(fixstr_len(format) as u32);
        }
        match format {
            STR8 => self.source.read_length8(),
            STR16 => self.source.read_length16(),
            STR32 => self.source.read_length32(),
            other => Err(Error::type_mismatch(format!("expected string, got format byte 0x{other:02x}"))),
        }
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_string_header()?;
        string_codec::read_str(&mut self.source, &self.allocator, len)
    }

    /// Reads a binary header, returning the byte length of the payload that
    /// follows, without consuming the payload.
    pub fn read_binary_header(&mut self) -> Result<u32> {
        let format = self.source.read_byte()?;
        match format {
            BIN8 => self.source.read_length8(),
            BIN16 => self.source.read_length16(),
            BIN32 => self.source.read_length32(),
            other => Err(Error::type_mismatch(format!("expected binary, got format byte 0x{other:02x}"))),
        }
    }

    pub fn read_bin(&mut self) -> Result<Vec<u8>> {
        let len = self.read_binary_header()? as usize;
        let mut out = vec![0u8; len];
        self.source.read_payload(&mut out)?;
        Ok(out)
    }

    pub fn read_array_header(&mut self) -> Result<u32> {
        let format = self.source.read_byte()?;
        if is_fixarray(format) {
            return Ok(fixarray_len(format) as u32);
        }
        match format {
            ARRAY16 => self.source.read_length16(),
            ARRAY32 => self.source.read_length32(),
            other => Err(Error::type_mismatch(format!("expected array, got format byte 0x{other:02x}"))),
        }
    }

    pub fn read_map_header(&mut self) -> Result<u32> {
        let format = self.source.read_byte()?;
        if is_fixmap(format) {
            return Ok(fixmap_len(format) as u32);
        }
        match format {
            MAP16 => self.source.read_length16(),
            MAP32 => self.source.read_length32(),
            other => Err(Error::type_mismatch(format!("expected map, got format byte 0x{other:02x}"))),
        }
    }

    /// Reads an extension header, returning its type and payload length
    /// without consuming the payload — callers read the payload separately
    /// via [`Self::read_payload`] or [`Self::read_timestamp`].
    pub fn read_extension_header(&mut self) -> Result<(i8, u32)> {
        let format = self.source.read_byte()?;
        let len = match format {
            FIXEXT1 => 1,
            FIXEXT2 => 2,
            FIXEXT4 => 4,
            FIXEXT8 => 8,
            FIXEXT16 => 16,
            EXT8 => self.source.read_length8()?,
            EXT16 => self.source.read_length16()?,
            EXT32 => self.source.read_length32()?,
            other => return Err(Error::type_mismatch(format!("expected extension, got format byte 0x{other:02x}"))),
        };
        let ext_type = self.source.read_byte()? as i8;
        Ok((ext_type, len))
    }

    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        let (ext_type, len) = self.read_extension_header()?;
        let mut payload = vec![0u8; len as usize];
        self.source.read_payload(&mut payload)?;
        Timestamp::unpack(ext_type, &payload)
    }

    /// Reads a string value the same way [`Self::read_str`] does, but
    /// interns the result through this reader's configured identifier
    /// cache (`spec.md` §4.I "Identifier variant") when one is set via
    /// [`ReaderOptions::identifier_cache`], avoiding a fresh allocation for
    /// a string this reader has already decoded before. Falls back to a
    /// plain decode (wrapped in a fresh `Arc`) when no cache is configured.
    pub fn read_identifier(&mut self) -> Result<std::sync::Arc<str>> {
        let s = self.read_str()?;
        match &mut self.identifier_cache {
            Some(cache) => Ok(cache.intern(s)),
            None => Ok(std::sync::Arc::from(s)),
        }
    }

    /// Reads exactly `dst.len()` raw payload bytes, e.g. an extension body
    /// whose header was already consumed via [`Self::read_extension_header`].
    pub fn read_payload(&mut self, dst: &mut [u8]) -> Result<()> {
        self.source.read_payload(dst)
    }

    /// Streams `length` bytes directly into `sink`, bypassing an
    /// intermediate `Vec`, taking the zero-copy channel fast path when both
    /// ends support it.
    pub fn transfer_to(&mut self, sink: &mut Sink, length: u64) -> Result<u64> {
        self.source.transfer_to(sink, length)
    }

    /// Skips `count` consecutive top-level values, correctly accounting for
    /// nested containers via a running counter rather than recursion: each
    /// array of length `m` adds `m` to the remaining count, each map of
    /// length `m` adds `2*m` (keys and values are both values to skip).
    pub fn skip_value(&mut self, count: u64) -> Result<()> {
        let mut remaining = count;
        let mut iterations: u64 = 0;
        while remaining > 0 {
            if let Some(max) = self.max_skip_iterations {
                if iterations >= max {
                    return Err(Error::size_limit_exceeded(format!(
                        "skip_value exceeded the configured cap of {max} iterations"
                    )));
                }
            }
            iterations += 1;
            remaining -= 1;
            let format = self.source.read_byte()?;
            if is_fixint(format) {
                continue;
            }
            if is_fixstr(format) {
                self.source.skip(fixstr_len(format) as u64)?;
                continue;
            }
            if is_fixarray(format) {
                remaining += fixarray_len(format) as u64;
                continue;
            }
            if is_fixmap(format) {
                remaining += 2 * fixmap_len(format) as u64;
                continue;
            }
            match format {
                NIL | FALSE | TRUE => {}
                UINT8 | INT8 => self.source.skip(1)?,
                UINT16 | INT16 => self.source.skip(2)?,
                UINT32 | INT32 | FLOAT32 => self.source.skip(4)?,
                UINT64 | INT64 | FLOAT64 => self.source.skip(8)?,
                STR8 | BIN8 => {
                    let len = self.source.read_length8()?;
                    self.source.skip(len as u64)?;
                }
                STR16 | BIN16 => {
                    let len = self.source.read_length16()?;
                    self.source.skip(len as u64)?;
                }
                STR32 | BIN32 => {
                    let len = self.source.read_length32()?;
                    self.source.skip(len as u64)?;
                }
                ARRAY16 => remaining += self.source.read_length16()? as u64,
                ARRAY32 => remaining += self.source.read_length32()? as u64,
                MAP16 => remaining += 2 * self.source.read_length16()? as u64,
                MAP32 => remaining += 2 * self.source.read_length32()? as u64,
                FIXEXT1 => self.source.skip(1 + 1)?,
                FIXEXT2 => self.source.skip(1 + 2)?,
                FIXEXT4 => self.source.skip(1 + 4)?,
                FIXEXT8 => self.source.skip(1 + 8)?,
                FIXEXT16 => self.source.skip(1 + 16)?,
                EXT8 => {
                    let len = self.source.read_length8()?;
                    self.source.skip(1 + len as u64)?;
                }
                EXT16 => {
                    let len = self.source.read_length16()?;
                    self.source.skip(1 + len as u64)?;
                }
                EXT32 => {
                    let len = self.source.read_length32()?;
                    self.source.skip(1 + len as u64)?;
                }
                RESERVED => return Err(Error::invalid_header("format byte 0xc1 is reserved")),
                other => return Err(Error::invalid_header(format!("unrecognized format byte 0x{other:02x}"))),
            }
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::UnpooledAllocator;
    use crate::io::Source;
    use bytes::Bytes;

    fn reader_over(data: &[u8]) -> Reader {
        let allocator: Arc<dyn Allocator> = Arc::new(UnpooledAllocator::default());
        let source = BufferedSource::new(Source::InMemory(Bytes::copy_from_slice(data)), allocator.clone(), 32).unwrap();
        Reader::new(source, allocator)
    }

    #[test]
    fn reads_positive_and_negative_fixint() {
        let mut r = reader_over(&[0x2a, 0xfb]);
        assert_eq!(r.read_i64().unwrap(), 42);
        assert_eq!(r.read_i64().unwrap(), -5);
    }

    #[test]
    fn widens_uint8_to_i64() {
        let mut r = reader_over(&[UINT8, 200]);
        assert_eq!(r.read_i64().unwrap(), 200);
    }

    #[test]
    fn read_u64_rejects_negative_fixint() {
        let mut r = reader_over(&[0xff]);
        let err = r.read_u64().unwrap_err();
        assert_eq!(err.code(), "codec.type_mismatch");
    }

    #[test]
    fn read_i64_rejects_float_format() {
        let mut r = reader_over(&[FLOAT32, 0, 0, 0, 0]);
        let err = r.read_i64().unwrap_err();
        assert_eq!(err.code(), "codec.type_mismatch");
    }

    #[test]
    fn reads_fixstr() {
        let mut r = reader_over(&[0xA5, b'H', b'e', b'l', b'l', b'o']);
        assert_eq!(r.read_str().unwrap(), "Hello");
    }

    #[test]
    fn reads_empty_map_header() {
        let mut r = reader_over(&[0x80]);
        assert_eq!(r.read_map_header().unwrap(), 0);
    }

    #[test]
    fn reads_epoch_timestamp() {
        let mut r = reader_over(&[FIXEXT4, 0xff, 0x00, 0x00, 0x00, 0x00]);
        let ts = r.read_timestamp().unwrap();
        assert_eq!(ts, Timestamp::new(0, 0).unwrap());
    }

    #[test]
    fn skip_value_skips_flat_scalar() {
        let mut r = reader_over(&[UINT32, 0, 0, 1, 0, 0x2a]);
        r.skip_value(1).unwrap();
        assert_eq!(r.read_i64().unwrap(), 42);
    }

    #[test]
    fn skip_value_skips_nested_array() {
        // [1, [2, 3]], then a trailing 99 to confirm the cursor lands right after.
        let mut r = reader_over(&[0x92, 0x01, 0x92, 0x02, 0x03, 0x2a]);
        r.skip_value(1).unwrap();
        assert_eq!(r.read_i64().unwrap(), 42);
    }

    #[test]
    fn skip_value_skips_map_keys_and_values() {
        // {"a": 1}, then trailing 42.
        let mut r = reader_over(&[0x81, 0xA1, b'a', 0x01, 0x2a]);
        r.skip_value(1).unwrap();
        assert_eq!(r.read_i64().unwrap(), 42);
    }

    #[test]
    fn skip_value_rejects_reserved_byte() {
        let mut r = reader_over(&[RESERVED]);
        let err = r.skip_value(1).unwrap_err();
        assert_eq!(err.code(), "codec.invalid_header");
    }

    #[test]
    fn next_type_does_not_consume() {
        let mut r = reader_over(&[NIL]);
        assert_eq!(r.next_type().unwrap(), ValueType::Nil);
        assert_eq!(r.next_type().unwrap(), ValueType::Nil);
        r.read_nil().unwrap();
    }

    #[test]
    fn narrow_integer_reads_reject_values_that_overflow_the_width() {
        // int16(-33): fits i16 but not i8.
        let mut r = reader_over(&[INT16, 0xff, 0xdf]);
        let err = r.read_i8().unwrap_err();
        assert_eq!(err.code(), "codec.type_mismatch");
    }

    #[test]
    fn narrow_unsigned_read_accepts_value_that_fits() {
        let mut r = reader_over(&[UINT16, 0x00, 0xc8]);
        assert_eq!(r.read_u8(), Ok(200));
    }

    #[test]
    fn skip_value_honors_configured_iteration_cap() {
        let allocator: Arc<dyn Allocator> = Arc::new(crate::buffer::UnpooledAllocator::default());
        let source = BufferedSource::new(
            crate::io::Source::InMemory(bytes::Bytes::from_static(&[0x92, 0x01, 0x02])),
            allocator.clone(),
            32,
        )
        .unwrap();
        let mut r = Reader::with_options(
            source,
            allocator,
            ReaderOptions {
                max_skip_iterations: Some(1),
                ..Default::default()
            },
        );
        let err = r.skip_value(1).unwrap_err();
        assert_eq!(err.code(), "buffer.size_limit_exceeded");
    }

    #[test]
    fn read_identifier_interns_repeated_strings() {
        let allocator: Arc<dyn Allocator> = Arc::new(crate::buffer::UnpooledAllocator::default());
        let mut data = Vec::new();
        data.push(0xA2); // fixstr, len 2
        data.extend_from_slice(b"id");
        data.push(0xA2);
        data.extend_from_slice(b"id");
        let source = BufferedSource::new(crate::io::Source::InMemory(bytes::Bytes::from(data)), allocator.clone(), 32).unwrap();
        let mut r = Reader::with_options(
            source,
            allocator,
            ReaderOptions {
                identifier_cache: Some(IdentifierCache::default()),
                ..Default::default()
            },
        );
        let a = r.read_identifier().unwrap();
        let b = r.read_identifier().unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}
