//! Boundary checks for minimal integer encoding and string/array/map length
//! class transitions.

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

fn round_trip_int(value: i64) -> i64 {
    let bytes = encode(|w| w.write_i64(value).unwrap());
    let msgpack = MessagePack::unpooled();
    let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
    reader.read_i64().unwrap()
}

#[test]
fn signed_integer_minimization_boundaries() {
    for &v in &[
        0i64,
        (1 << 7) - 1,
        -(1 << 5),
        -(1 << 5) - 1,
        i8::MIN as i64,
        i8::MAX as i64,
        i16::MIN as i64,
        i16::MAX as i64,
        i32::MIN as i64,
        i32::MAX as i64,
        i64::MIN,
        i64::MAX,
        (1u64 << 8) as i64 - 1,
        (1u64 << 16) as i64 - 1,
        (1u64 << 32) as i64 - 1,
    ] {
        assert_eq!(round_trip_int(v), v, "round trip failed for {v}");
    }
}

#[test]
fn unsigned_values_beyond_i64_max_round_trip_via_u64() {
    let msgpack = MessagePack::unpooled();
    for &v in &[u64::MAX, 1u64 << 63, (1u64 << 32) - 1, u32::MAX as u64 + 1] {
        let bytes = encode(|w| w.write_u64(v).unwrap());
        let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
        assert_eq!(reader.read_u64().unwrap(), v);
    }
}

fn string_of_len(n: usize) -> String {
    "a".repeat(n)
}

#[test]
fn string_length_class_boundaries() {
    let msgpack = MessagePack::unpooled();
    for &n in &[0usize, 31, 32, 255, 256, 65535, 65536] {
        let s = string_of_len(n);
        let bytes = encode(|w| w.write_str(&s).unwrap());
        let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
        assert_eq!(reader.read_str().unwrap(), s);
    }
}

#[test]
fn array_length_class_boundaries() {
    let msgpack = MessagePack::unpooled();
    for &n in &[0u32, 15, 16, 65535, 65536] {
        let bytes = encode(|w| {
            w.write_array_header(n).unwrap();
            for i in 0..n {
                w.write_i64(i as i64).unwrap();
            }
        });
        let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
        assert_eq!(reader.read_array_header().unwrap(), n);
        for i in 0..n {
            assert_eq!(reader.read_i64().unwrap(), i as i64);
        }
    }
}

#[test]
fn map_length_class_boundaries() {
    let msgpack = MessagePack::unpooled();
    for &n in &[0u32, 15, 16, 65535] {
        let bytes = encode(|w| {
            w.write_map_header(n).unwrap();
            for i in 0..n {
                w.write_i64(i as i64).unwrap();
                w.write_bool(i % 2 == 0).unwrap();
            }
        });
        let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
        assert_eq!(reader.read_map_header().unwrap(), n);
        for i in 0..n {
            assert_eq!(reader.read_i64().unwrap(), i as i64);
            assert_eq!(reader.read_bool().unwrap(), i % 2 == 0);
        }
    }
}

#[test]
fn extension_exact_vs_non_exact_length_forms() {
    let msgpack = MessagePack::unpooled();
    for &n in &[1usize, 2, 3, 4, 8, 9, 16, 17, 255, 256] {
        let payload = vec![0x42u8; n];
        let bytes = encode(|w| w.write_ext(7, &payload).unwrap());
        let mut reader = msgpack.reader_over_bytes(Bytes::from(bytes)).unwrap();
        let (ext_type, len) = reader.read_extension_header().unwrap();
        assert_eq!(ext_type, 7);
        assert_eq!(len as usize, n);
        let mut dst = vec![0u8; n];
        reader.read_payload(&mut dst).unwrap();
        assert_eq!(dst, payload);
    }
}
