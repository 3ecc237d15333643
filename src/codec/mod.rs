//! The MessagePack value codec: timestamp packing, string encode/decode,
//! and the high-level [`Writer`]/[`Reader`] pair (components G, H, I).

pub mod reader;
pub mod string_codec;
pub mod timestamp;
pub mod writer;

pub use reader::Reader;
pub use string_codec::IdentifierCache;
pub use timestamp::Timestamp;
pub use writer::Writer;
