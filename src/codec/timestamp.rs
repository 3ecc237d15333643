//! Timestamp extension packing (`spec.md` §4.G/§4.H, "Timestamp").
//!
//! MessagePack reserves extension type `-1` for timestamps and defines
//! three wire encodings depending on the magnitude of the value: a 32-bit
//! seconds-only form, a combined 34-bit-seconds/30-bit-nanoseconds form, and
//! a full 64-bit-seconds/32-bit-nanoseconds form.

use crate::error::{Error, Result};
use crate::format::EXT_TYPE_TIMESTAMP;

/// Seconds and nanoseconds since the Unix epoch. `nanos` is always in
/// `0..1_000_000_000`; negative instants are represented by a negative
/// `seconds` with a still-nonnegative `nanos` (the same convention
/// `std::time::Duration`-adjacent timestamp types use).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

const NANOS_PER_SEC: u32 = 1_000_000_000;
// timestamp 64 packs nanoseconds into the top 30 bits and seconds into the
// bottom 34 bits of a single u64; valid only for 0 <= seconds < 2^34.
const TIMESTAMP64_MAX_SECONDS: u64 = 1 << 34;

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Result<Self> {
        if nanos >= NANOS_PER_SEC {
            return Err(Error::invalid_header(format!(
                "timestamp nanoseconds {nanos} must be less than {NANOS_PER_SEC}"
            )));
        }
        Ok(Self { seconds, nanos })
    }

    /// Which of the three wire encodings this value is eligible for, from
    /// smallest to largest.
    fn wire_len(&self) -> usize {
        if self.nanos == 0 && self.seconds >= 0 && self.seconds <= u32::MAX as i64 {
            4
        } else if self.seconds >= 0 && (self.seconds as u64) < TIMESTAMP64_MAX_SECONDS {
            8
        } else {
            12
        }
    }

    /// Packs this value into its minimal wire form, returning the extension
    /// type (always [`EXT_TYPE_TIMESTAMP`]) and the payload bytes.
    pub fn pack(&self) -> (i8, Vec<u8>) {
        match self.wire_len() {
            4 => (EXT_TYPE_TIMESTAMP, (self.seconds as u32).to_be_bytes().to_vec()),
            8 => {
                let combined = ((self.nanos as u64) << 34) | (self.seconds as u64);
                (EXT_TYPE_TIMESTAMP, combined.to_be_bytes().to_vec())
            }
            _ => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(&self.nanos.to_be_bytes());
                buf.extend_from_slice(&self.seconds.to_be_bytes());
                (EXT_TYPE_TIMESTAMP, buf)
            }
        }
    }

    /// Unpacks a timestamp payload of length 4, 8, or 12. Any other length,
    /// or an extension type other than [`EXT_TYPE_TIMESTAMP`], is an
    /// `InvalidMessageHeader` per `spec.md` §4.H.
    pub fn unpack(ext_type: i8, payload: &[u8]) -> Result<Self> {
        if ext_type != EXT_TYPE_TIMESTAMP {
            return Err(Error::invalid_header(format!(
                "extension type {ext_type} is not the reserved timestamp type {EXT_TYPE_TIMESTAMP}"
            )));
        }
        match payload.len() {
            4 => {
                let seconds = u32::from_be_bytes(payload.try_into().unwrap());
                Ok(Timestamp {
                    seconds: seconds as i64,
                    nanos: 0,
                })
            }
            8 => {
                let combined = u64::from_be_bytes(payload.try_into().unwrap());
                let nanos = (combined >> 34) as u32;
                let seconds = (combined & ((1u64 << 34) - 1)) as i64;
                Timestamp::new(seconds, nanos)
            }
            12 => {
                let nanos = u32::from_be_bytes(payload[0..4].try_into().unwrap());
                let seconds = i64::from_be_bytes(payload[4..12].try_into().unwrap());
                Timestamp::new(seconds, nanos)
            }
            other => Err(Error::invalid_header(format!(
                "timestamp extension payload must be 4, 8, or 12 bytes, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_packs_as_timestamp32() {
        let ts = Timestamp::new(0, 0).unwrap();
        let (ext_type, payload) = ts.pack();
        assert_eq!(ext_type, -1);
        assert_eq!(payload, vec![0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn nonzero_nanos_packs_as_timestamp64() {
        let ts = Timestamp::new(1_000_000_000, 500).unwrap();
        let (_, payload) = ts.pack();
        assert_eq!(payload.len(), 8);
        let round_tripped = Timestamp::unpack(-1, &payload).unwrap();
        assert_eq!(round_tripped, ts);
    }

    #[test]
    fn seconds_beyond_34_bits_packs_as_timestamp96() {
        let ts = Timestamp::new(1i64 << 40, 7).unwrap();
        let (_, payload) = ts.pack();
        assert_eq!(payload.len(), 12);
        let round_tripped = Timestamp::unpack(-1, &payload).unwrap();
        assert_eq!(round_tripped, ts);
    }

    #[test]
    fn negative_seconds_forces_timestamp96() {
        let ts = Timestamp::new(-5, 0).unwrap();
        let (_, payload) = ts.pack();
        assert_eq!(payload.len(), 12);
        let round_tripped = Timestamp::unpack(-1, &payload).unwrap();
        assert_eq!(round_tripped, ts);
    }

    #[test]
    fn unpack_rejects_wrong_extension_type() {
        let err = Timestamp::unpack(5, &[0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), "codec.invalid_header");
    }

    #[test]
    fn unpack_rejects_bad_length() {
        let err = Timestamp::unpack(-1, &[0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), "codec.invalid_header");
    }

    #[test]
    fn new_rejects_nanos_overflow() {
        assert!(Timestamp::new(0, 1_000_000_000).is_err());
    }
}
