//! Errors associated with encoding and decoding AMQP 0-9-1 data types

/// Encoding and decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input ended before a complete value could be read
    #[error("Unexpected end of input, needed {needed} more bytes")]
    UnexpectedEof {
        /// Number of bytes still missing
        needed: usize,
    },

    /// A short string is limited to 255 bytes
    #[error("Short string length {0} exceeds 255 bytes")]
    ShortStringTooLong(usize),

    /// A long string or table exceeds `u32::MAX` bytes
    #[error("Length {0} exceeds u32::MAX")]
    LengthOverflow(usize),

    /// A short string is not valid UTF-8
    #[error("Invalid UTF-8 in short string")]
    InvalidUtf8,

    /// The type tag of a field value is not recognized
    #[error("Unknown field value type tag {0:#04x}")]
    UnknownFieldType(u8),

    /// The (class-id, method-id) pair is not recognized
    #[error("Unknown method class-id={class_id} method-id={method_id}")]
    UnknownMethod {
        /// Class id
        class_id: u16,
        /// Method id
        method_id: u16,
    },

    /// Content headers are only defined for the basic class
    #[error("Unsupported content class-id {0}")]
    UnsupportedContentClass(u16),

    /// The property flags use bits that are not defined
    #[error("Invalid property flags {0:#06x}")]
    InvalidPropertyFlags(u16),

    /// Tables and arrays are nested deeper than the decoder accepts
    #[error("Field tables and arrays nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// A length prefixed structure was not fully consumed
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}
