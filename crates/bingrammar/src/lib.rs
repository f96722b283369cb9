//! # bingrammar
//!
//! Declarative binary codecs. Describe a packet layout once as a [`Schema`]
//! of field codecs, then decode byte slices into an ordered value tree and
//! encode value trees back into bytes.
//!
//! Besides fixed-width scalars, fields may be sized by a prefix or by an
//! earlier sibling, repeated, dispatched on an earlier value, or wrapped in a
//! checksum. Encoding fills in derived fields (sizes, counts, checksums) so
//! callers only provide the payload.
//!
//! ## Example
//!
//! ```
//! use bingrammar::{Binary, BinaryOptions, Schema, Value, uint8};
//!
//! let schema = Schema::new().field(uint8("len")).field(
//!     Binary::new("data", BinaryOptions { size_field: Some("len".into()), ..Default::default() })
//!         .unwrap(),
//! );
//!
//! let parsed = schema.parse(&[0x02, 0xca, 0xfe]).unwrap();
//! assert_eq!(parsed["data"], Value::Bytes(vec![0xca, 0xfe]));
//!
//! let mut record = parsed.clone();
//! record.insert("data".into(), Value::Bytes(vec![1, 2, 3]));
//! assert_eq!(schema.encode(&record).unwrap(), vec![0x03, 1, 2, 3]);
//! ```

#[macro_use]
mod tracing_macros;

pub mod binary;
pub mod bitmask;
pub mod bits;
pub mod bitstruct;
pub mod checksum;
pub mod delim;
pub mod enumeration;
pub mod errors;
pub mod field;
pub mod magic;
pub mod numeric;
pub mod repetition;
pub mod schema;
pub mod selector;
#[cfg(feature = "serde")]
pub mod serde;
pub mod string;
pub mod text;
pub mod transform;
pub mod value;

pub use binary::{Binary, BinaryOptions, bcd, bcd_transform};
pub use bitmask::{BitMask, BitMaskOptions, bitfield};
pub use bitstruct::{BitElement, BitKind, BitStruct, BitStructOptions};
pub use checksum::{
    Algorithm, Crc, crc8, crc8_1wire, crc8_xor, crc16, crc16_ccitt, crc16_kermit, crc16_modbus,
    crc16_xmodem, crc24, crc32,
};
pub use delim::{DelimOptions, DelimString};
pub use enumeration::{EnumOptions, Enumeration, choices};
pub use errors::{DecodeError, EncodeError, SchemaError};
pub use field::{Codec, EncodeContext, Endian, FieldRef, Iteration, ParseContext, Prefix};
pub use magic::Magic;
pub use numeric::{
    Float, FloatOptions, Int, IntegerOptions, UInt, double, float, int8, int16, int32, uint8,
    uint16, uint32,
};
pub use repetition::{ContextField, Loop, LoopOptions, Repetitions};
pub use schema::{Schema, encode, make_template, parse};
pub use selector::{Case, Match, Selector, SelectorOptions};
pub use string::{BinString, StringOptions, ascii_float, ascii_integer};
pub use text::TextEncoding;
pub use transform::Transform;
pub use value::{Record, Value};
