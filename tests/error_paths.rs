//! Error-path checks from `spec.md` §8 ("Error paths"): the specific
//! failure scenarios the spec calls out by name, each asserted against the
//! stable error code rather than the `Display` text.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use oxmsgpack::MessagePack;

struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);
impl std::io::Write for SharedVecWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn encode(f: impl FnOnce(&mut oxmsgpack::Writer)) -> Vec<u8> {
    let msgpack = MessagePack::unpooled();
    let out = Arc::new(Mutex::new(Vec::new()));
    let mut writer = msgpack.writer(SharedVecWriter(out.clone())).unwrap();
    f(&mut writer);
    writer.close().unwrap();
    out.lock().unwrap().clone()
}

#[test]
fn reading_float_where_stream_contains_int_raises_type_mismatch() {
    let bytes = encode(|w| w.write_i64(7).unwrap());
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
    let err = reader.read_f32().unwrap_err();
    assert_eq!(err.code(), "codec.type_mismatch");
}

#[test]
fn reading_u8_where_stream_contains_negative_int8_raises_type_mismatch_with_overflow_detail() {
    let bytes = encode(|w| w.write_i64(-1).unwrap());
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
    let err = reader.read_u8().unwrap_err();
    assert_eq!(err.code(), "codec.type_mismatch");
    assert!(err.to_string().contains('-') || err.to_string().contains("negative"));
}

#[test]
fn reading_any_value_from_an_empty_source_raises_unexpected_end() {
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::new()).unwrap();
    let err = reader.read_i64().unwrap_err();
    assert_eq!(err.code(), "io.unexpected_end");
}

#[test]
fn reading_a_value_header_from_an_empty_source_raises_unexpected_end_before_next_type() {
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::new()).unwrap();
    let err = reader.next_type().unwrap_err();
    assert_eq!(err.code(), "io.unexpected_end");
}

#[test]
fn reserved_format_byte_is_rejected_as_invalid_header() {
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::from_static(&[0xc1])).unwrap();
    let err = reader.next_type().unwrap_err();
    assert_eq!(err.code(), "codec.invalid_header");
}

#[test]
fn truncated_multi_byte_value_raises_unexpected_end() {
    // uint32 format byte with only two of its four payload bytes present.
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack
        .reader_over_bytes(Bytes::from_static(&[0xce, 0x00, 0x01]))
        .unwrap();
    let err = reader.read_u64().unwrap_err();
    assert_eq!(err.code(), "io.unexpected_end");
}

#[test]
fn timestamp_extension_with_invalid_length_raises_invalid_header() {
    // fixext with type -1 but a payload length (2 bytes) that isn't 4/8/12.
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack
        .reader_over_bytes(Bytes::from_static(&[0xd5, 0xff, 0x00, 0x00]))
        .unwrap();
    let err = reader.read_timestamp().unwrap_err();
    assert_eq!(err.code(), "codec.invalid_header");
}

#[test]
fn string_header_length_with_high_bit_set_raises_size_limit_exceeded() {
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack
        .reader_over_bytes(Bytes::from_static(&[0xdb, 0x80, 0x00, 0x00, 0x00]))
        .unwrap();
    let err = reader.read_string_header().unwrap_err();
    assert_eq!(err.code(), "buffer.size_limit_exceeded");
}

#[test]
fn invalid_utf8_string_payload_raises_invalid_string_encoding() {
    let msgpack = MessagePack::unpooled();
    // fixstr of length 2 with bytes that are not valid UTF-8.
    let mut reader = msgpack
        .reader_over_bytes(Bytes::from_static(&[0xa2, 0xff, 0xfe]))
        .unwrap();
    let err = reader.read_str().unwrap_err();
    assert_eq!(err.code(), "codec.invalid_string_encoding");
}

#[test]
fn use_after_close_is_a_programming_error() {
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack
        .reader_over_bytes(Bytes::from_static(&[0x2a]))
        .unwrap();
    reader.close().unwrap();
    let err = reader.read_i64().unwrap_err();
    assert_eq!(err.code(), "codec.programming_error");
}

#[test]
fn allocator_request_beyond_max_capacity_raises_size_limit_exceeded() {
    use oxmsgpack::buffer::{Allocator, AllocatorOptions, PooledAllocator};
    let allocator = PooledAllocator::new(AllocatorOptions {
        max_byte_buffer_capacity: 64,
        ..Default::default()
    });
    let err = allocator.get_byte_buffer(128).unwrap_err();
    assert_eq!(err.code(), "buffer.size_limit_exceeded");
}
