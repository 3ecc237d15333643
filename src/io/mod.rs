//! Pluggable I/O providers and the buffered reader/writer pair that sits
//! on top of them (components C through F).

pub mod buffered_sink;
pub mod buffered_source;
pub mod sink;
pub mod source;

pub use buffered_sink::{BufferedSink, DEFAULT_WRITE_BUFFER_CAPACITY, MIN_WRITE_BUFFER_CAPACITY};
pub use buffered_source::{BufferedSource, DEFAULT_READ_BUFFER_CAPACITY, MIN_READ_BUFFER_CAPACITY};
pub use sink::{GrowableSink, Sink};
pub use source::Source;
