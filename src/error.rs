//! Stable error taxonomy for the codec, buffer, and I/O layers.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias
//! over [`Error`]. Each variant carries a stable `<domain>.<reason>` code
//! (see [`Error::code`]) so callers can match on a string without coupling
//! to the enum's shape — the convention mirrors how cross-cutting error
//! taxonomies are exposed in larger service frameworks, scaled down to a
//! single flat enum since this crate has only one layer of errors to report.

use std::fmt;
use std::io;

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The full set of error kinds this crate can raise.
///
/// See `spec.md` §7 for the authoritative description of when each kind is
/// raised and what propagation guarantees apply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source ended before a value (or a requested number of bytes) was
    /// fully consumed.
    #[error("unexpected end of input: needed {needed} more byte(s), had {available}")]
    UnexpectedEnd {
        /// Bytes still required when the source reported end-of-input.
        needed: usize,
        /// Bytes actually available at the time of failure.
        available: usize,
    },

    /// The format byte on the wire is incompatible with the requested read,
    /// including integer values that do not fit in the requested width.
    #[error("type mismatch: {detail}")]
    TypeMismatch {
        /// Human-readable detail, e.g. the overflowing value or the format
        /// byte that was encountered.
        detail: String,
    },

    /// A format byte is reserved, or an extension/timestamp header carries
    /// an invalid length.
    #[error("invalid message header: {detail}")]
    InvalidMessageHeader {
        /// Human-readable detail.
        detail: String,
    },

    /// The string encoder/decoder encountered malformed or unmappable input.
    #[error("invalid string encoding: {detail}")]
    InvalidStringEncoding {
        /// Human-readable detail, including the offending byte/char range
        /// when available.
        detail: String,
    },

    /// A length-encoded value had its high bit set (i.e. would be negative
    /// if interpreted as signed), or a buffer request exceeded the
    /// allocator's configured maximum capacity.
    #[error("size limit exceeded: {detail}")]
    SizeLimitExceeded {
        /// Human-readable detail.
        detail: String,
    },

    /// The underlying I/O provider raised an error.
    #[error("I/O error")]
    Io(#[source] io::Error),

    /// A channel-backed provider returned a partial read/write with no
    /// associated error, which is the documented symptom of a non-blocking
    /// channel being used where this crate requires a blocking one.
    #[error("non-blocking channel: {detail}")]
    NonBlockingChannel {
        /// Human-readable detail.
        detail: String,
    },

    /// Use-after-close, a negative length argument, a buffer capacity below
    /// the configured minimum, or similar misuse of the API by the caller.
    #[error("programming error: {detail}")]
    ProgrammingError {
        /// Human-readable detail.
        detail: String,
    },
}

impl Error {
    /// Returns the stable `<domain>.<reason>` code for this error, suitable
    /// for metrics labels or log fields that must not carry the
    /// human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnexpectedEnd { .. } => "io.unexpected_end",
            Error::TypeMismatch { .. } => "codec.type_mismatch",
            Error::InvalidMessageHeader { .. } => "codec.invalid_header",
            Error::InvalidStringEncoding { .. } => "codec.invalid_string_encoding",
            Error::SizeLimitExceeded { .. } => "buffer.size_limit_exceeded",
            Error::Io(_) => "io.provider_error",
            Error::NonBlockingChannel { .. } => "io.non_blocking_channel",
            Error::ProgrammingError { .. } => "codec.programming_error",
        }
    }

    pub(crate) fn unexpected_end(needed: usize, available: usize) -> Self {
        Error::UnexpectedEnd { needed, available }
    }

    pub(crate) fn type_mismatch(detail: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn invalid_header(detail: impl fmt::Display) -> Self {
        Error::InvalidMessageHeader {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn invalid_string_encoding(detail: impl fmt::Display) -> Self {
        Error::InvalidStringEncoding {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn size_limit_exceeded(detail: impl fmt::Display) -> Self {
        Error::SizeLimitExceeded {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn non_blocking_channel(detail: impl fmt::Display) -> Self {
        Error::NonBlockingChannel {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn programming_error(detail: impl fmt::Display) -> Self {
        Error::ProgrammingError {
            detail: detail.to_string(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io(source)
    }
}
