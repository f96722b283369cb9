//! Error types for schema construction, decoding and encoding.

use crate::text::TextEncoding;

/// Errors produced while constructing a codec. A schema that fails here is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Integer, enum, bitmask, bit struct and size prefix widths are limited to 1..=4 bytes.
    #[error("integer fields must be 1 to 4 bytes wide, got {0}")]
    InvalidIntegerSize(usize),
    /// IEEE 754 values are either 4 or 8 bytes wide.
    #[error("floating point fields must be 4 or 8 bytes wide, got {0}")]
    InvalidFloatSize(usize),
    /// A string field has no way to determine its length.
    #[error("string field `{0}` needs a size, a size field, a size prefix or null termination")]
    UnsizedString(String),
    /// A delimited string was configured with an empty delimiter.
    #[error("delimited string `{0}` has an empty delimiter")]
    EmptyDelimiter(String),
    /// A bit element is zero bits wide or wider than 32 bits.
    #[error("bit element `{name}` must be 1 to 32 bits wide, got {width}")]
    InvalidBitWidth { name: String, width: usize },
    /// Bit element widths do not add up to the bit struct size.
    #[error("bit struct `{name}` holds {expected} bits but its elements cover {actual}")]
    BitWidthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    /// A bitmask flag points past the last bit of the mask.
    #[error("flag `{flag}` of `{name}` uses bit {position} of a {bits}-bit mask")]
    InvalidBitPosition {
        name: String,
        flag: String,
        position: u32,
        bits: usize,
    },
    /// Checksums are limited to 1..=8 bytes.
    #[error("checksum of `{name}` must be 1 to 8 bytes wide, got {width}")]
    InvalidChecksumSize { name: String, width: usize },
    /// A declarative schema could not be turned into codecs.
    #[error("invalid schema definition for `{name}`: {reason}")]
    InvalidDefinition { name: String, reason: String },
}

/// Errors produced while decoding a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The field needs more bytes than the buffer has left.
    #[error("field `{field}` needs {needed} bytes but only {available} remain")]
    OutOfBounds {
        field: String,
        needed: usize,
        available: usize,
    },
    /// A size, count or dispatch reference has not been decoded yet.
    #[error("field `{field}` references `{reference}`, which has no value")]
    MissingField { field: String, reference: String },
    /// A size or count reference holds something other than a non-negative integer.
    #[error("field `{field}` expected a non-negative integer size, found {found}")]
    InvalidSize { field: String, found: String },
    /// The bytes are not valid in the configured text encoding.
    #[error("field `{field}` is not valid {encoding} text")]
    InvalidText {
        field: String,
        encoding: TextEncoding,
    },
}

/// Errors produced while encoding a value tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The value tree has no entry for the field.
    #[error("field `{0}` is missing from the value tree")]
    MissingField(String),
    /// The value has the wrong shape for the field.
    #[error("field `{field}` expected {expected}, found {found}")]
    InvalidValue {
        field: String,
        expected: &'static str,
        found: String,
    },
    /// The value does not fit into the declared width.
    #[error("value {value} of field `{field}` does not fit into {bits} bits")]
    OutOfRange {
        field: String,
        value: String,
        bits: usize,
    },
    /// The symbol is not part of the field's choice table or bitfield.
    #[error("`{choice}` is not a known choice of field `{field}`")]
    UnknownChoice { field: String, choice: String },
    /// An inclusive delimited string does not end with its delimiter.
    #[error("field `{0}` does not end with its delimiter")]
    MissingDelimiter(String),
    /// No selector case matches the dispatch value.
    #[error("no case of selector `{field}` matches {value}")]
    NoMatchingCase { field: String, value: String },
    /// The text cannot be represented in the configured encoding.
    #[error("field `{field}` cannot be encoded as {encoding} text")]
    InvalidText {
        field: String,
        encoding: TextEncoding,
    },
}
