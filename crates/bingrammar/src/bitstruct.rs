//! Sub-byte fields packed into a 1 to 4 byte accumulator.
//!
//! The accumulator is read as one unsigned integer in the field's byte order.
//! Elements then take their bits from the most significant end downward, so
//! the first element of a one byte struct owns bit 7.
//!
//! ```
//! use bingrammar::{BitElement, BitStruct, BitStructOptions, Schema, Value};
//!
//! let schema = Schema::new().field(
//!     BitStruct::new(
//!         "nibbles",
//!         BitStructOptions {
//!             size: 1,
//!             elements: vec![BitElement::uint("a", 4), BitElement::int("b", 4)],
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap(),
//! );
//!
//! let parsed = schema.parse(&[0x5f]).unwrap();
//! let nibbles = parsed["nibbles"].as_map().unwrap();
//! assert_eq!(nibbles["a"], Value::UInt(5));
//! assert_eq!(nibbles["b"], Value::Int(-1));
//! ```

use indexmap::IndexMap;

use crate::{
    bitmask::{check_bitfield, flags_of, mask_of},
    bits::{mask, read_uint, sign_extend, slice_bits, to_twos_complement, write_uint},
    enumeration::{lookup_code, lookup_symbol},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, Endian, FieldRef, ParseContext, check_integer_size, invalid_value},
    transform::{Transform, backward},
    value::{Record, Value},
};

/// How a bit element interprets its slice.
#[derive(Debug, Clone, PartialEq)]
pub enum BitKind {
    /// Single bit boolean.
    Flag,
    UInt(usize),
    /// Two's complement signed integer.
    Int(usize),
    Enum {
        width: usize,
        choices: IndexMap<String, u64>,
    },
    /// Flag set; position 0 is the most significant bit of the slice.
    Mask {
        width: usize,
        bitfield: IndexMap<String, u32>,
    },
}

impl BitKind {
    pub fn width(&self) -> usize {
        match self {
            BitKind::Flag => 1,
            BitKind::UInt(width) | BitKind::Int(width) => *width,
            BitKind::Enum { width, .. } | BitKind::Mask { width, .. } => *width,
        }
    }
}

/// A named slice of a [`BitStruct`].
#[derive(Debug, Clone, PartialEq)]
pub struct BitElement {
    pub name: String,
    pub kind: BitKind,
}

impl BitElement {
    pub fn flag(name: impl Into<String>) -> Self {
        BitElement {
            name: name.into(),
            kind: BitKind::Flag,
        }
    }

    pub fn uint(name: impl Into<String>, width: usize) -> Self {
        BitElement {
            name: name.into(),
            kind: BitKind::UInt(width),
        }
    }

    pub fn int(name: impl Into<String>, width: usize) -> Self {
        BitElement {
            name: name.into(),
            kind: BitKind::Int(width),
        }
    }

    pub fn enumeration(name: impl Into<String>, width: usize, choices: IndexMap<String, u64>) -> Self {
        BitElement {
            name: name.into(),
            kind: BitKind::Enum { width, choices },
        }
    }

    pub fn mask(name: impl Into<String>, width: usize, bitfield: IndexMap<String, u32>) -> Self {
        BitElement {
            name: name.into(),
            kind: BitKind::Mask { width, bitfield },
        }
    }

    fn decode(&self, slice: u64) -> Value {
        match &self.kind {
            BitKind::Flag => Value::Bool(slice != 0),
            BitKind::UInt(_) => Value::UInt(slice),
            BitKind::Int(width) => Value::Int(sign_extend(slice, *width)),
            BitKind::Enum { choices, .. } => lookup_symbol(choices, slice),
            BitKind::Mask { width, bitfield } => flags_of(bitfield, slice, *width),
        }
    }

    /// Unshifted slice for `value`. `field` is the qualified element name.
    fn encode(&self, value: &Value, field: &str) -> Result<u64, EncodeError> {
        let width = self.kind.width();
        let raw = match &self.kind {
            BitKind::Flag => {
                let set = value
                    .as_bool()
                    .ok_or_else(|| invalid_value(field, "bool", value))?;
                u64::from(set)
            }
            BitKind::UInt(_) => value
                .as_u64()
                .ok_or_else(|| invalid_value(field, "unsigned integer", value))?,
            BitKind::Int(_) => {
                let signed = value
                    .as_i64()
                    .ok_or_else(|| invalid_value(field, "signed integer", value))?;
                to_twos_complement(signed, width, field)?
            }
            BitKind::Enum { choices, .. } => lookup_code(choices, value, field)?,
            BitKind::Mask { bitfield, .. } => mask_of(bitfield, value, width, field)?,
        };

        if raw > mask(width) {
            return Err(EncodeError::OutOfRange {
                field: field.to_string(),
                value: raw.to_string(),
                bits: width,
            });
        }
        Ok(raw)
    }

    fn template(&self) -> Value {
        match &self.kind {
            BitKind::Flag => Value::Bool(false),
            BitKind::UInt(_) => Value::UInt(0),
            BitKind::Int(_) => Value::Int(0),
            BitKind::Enum { choices, .. } => choices
                .keys()
                .next()
                .map_or(Value::Null, |k| Value::Text(k.clone())),
            BitKind::Mask { .. } => Value::List(Vec::new()),
        }
    }
}

/// Options of [`BitStruct`].
#[derive(Debug, Clone)]
pub struct BitStructOptions {
    /// Accumulator width in bytes (1..=4). Element widths must add up to `size * 8`.
    /// Ignored when `size_field` is set.
    pub size: usize,
    pub elements: Vec<BitElement>,
    pub endian: Option<Endian>,
    /// Earlier sibling holding the accumulator width in bytes. The width still
    /// comes from the elements; a decoded value that disagrees is an error and
    /// encoding rewrites the sibling.
    pub size_field: Option<FieldRef>,
    pub size_field_transform: Option<Transform>,
}

impl Default for BitStructOptions {
    fn default() -> Self {
        BitStructOptions {
            size: 1,
            elements: Vec::new(),
            endian: None,
            size_field: None,
            size_field_transform: None,
        }
    }
}

/// Bit-level struct. Decodes to a map keyed by element name.
#[derive(Debug, Clone)]
pub struct BitStruct {
    name: String,
    /// Accumulator width in bytes.
    size: usize,
    opts: BitStructOptions,
}

impl BitStruct {
    pub fn new(name: impl Into<String>, opts: BitStructOptions) -> Result<Self, SchemaError> {
        let name = name.into();
        if opts.size_field.is_none() {
            check_integer_size(opts.size)?;
        }

        for element in &opts.elements {
            let width = element.kind.width();
            if !(1..=32).contains(&width) {
                return Err(SchemaError::InvalidBitWidth {
                    name: element.name.clone(),
                    width,
                });
            }
            if let BitKind::Mask { bitfield, .. } = &element.kind {
                check_bitfield(&element.name, bitfield, width)?;
            }
        }

        let actual: usize = opts.elements.iter().map(|e| e.kind.width()).sum();
        let size = match opts.size_field {
            Some(_) => actual / 8,
            None => opts.size,
        };
        if actual != size * 8 || !(1..=4).contains(&size) {
            return Err(SchemaError::BitWidthMismatch {
                name,
                expected: size.clamp(1, 4) * 8,
                actual,
            });
        }

        Ok(BitStruct { name, size, opts })
    }
}

impl Codec for BitStruct {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        if let Some(field) = &self.opts.size_field {
            let declared = ctx.size_of(field, self.opts.size_field_transform.as_ref(), &self.name)?;
            if declared != self.size {
                debug!(field = %self.name, declared, width = self.size, "bit struct size disagrees with elements");
                return Err(DecodeError::InvalidSize {
                    field: self.name.clone(),
                    found: declared.to_string(),
                });
            }
        }

        let acc = read_uint(data, self.size, ctx.endian_or(self.opts.endian), &self.name)?;

        let mut remaining = self.size * 8;
        let mut out = Record::new();
        for element in &self.opts.elements {
            let width = element.kind.width();
            let slice = slice_bits(acc, remaining, width);
            remaining -= width;

            out.insert(element.name.clone(), element.decode(slice));
        }

        Ok((Value::Map(out), self.size))
    }

    fn prepare_encode(&self, ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        if let Some(field) = &self.opts.size_field {
            let size = backward(self.opts.size_field_transform.as_ref(), Value::from(self.size));
            ctx.write_back(field, size);
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let members = value
            .as_map()
            .ok_or_else(|| invalid_value(&self.name, "map", value))?;

        let mut acc = 0u64;
        let mut remaining = self.size * 8;
        for element in &self.opts.elements {
            let field = format!("{}.{}", self.name, element.name);
            let member = members
                .get(&element.name)
                .ok_or_else(|| EncodeError::MissingField(field.clone()))?;

            let width = element.kind.width();
            remaining -= width;
            acc |= element.encode(member, &field)? << remaining;
        }

        write_uint(acc, self.size, ctx.endian_or(self.opts.endian), &self.name)
    }

    fn make_struct(&self) -> Value {
        Value::Map(
            self.opts
                .elements
                .iter()
                .map(|e| (e.name.clone(), e.template()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Schema, bitmask::bitfield, enumeration::choices, numeric::uint8, record};

    fn bit_struct(size: usize, elements: Vec<BitElement>) -> Schema {
        Schema::new().field(
            BitStruct::new(
                "bit",
                BitStructOptions {
                    size,
                    elements,
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_bit_flags() {
        let elements = (1..=8).map(|i| BitElement::flag(format!("bit{i}"))).collect();
        let schema = bit_struct(1, elements);

        let parsed = schema.parse(&[0x05]).unwrap();
        let bits = parsed["bit"].as_map().unwrap();
        let set: Vec<&str> = bits
            .iter()
            .filter(|(_, v)| **v == Value::Bool(true))
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(set, ["bit6", "bit8"]);
        assert_eq!(schema.encode(&parsed).unwrap(), vec![0x05]);
    }

    #[test]
    fn test_bit_uint_and_int() {
        let unsigned = bit_struct(1, vec![BitElement::uint("a", 4), BitElement::uint("b", 4)]);
        let parsed = unsigned.parse(&[0x5f]).unwrap();
        assert_eq!(parsed["bit"], Value::Map(record! { "a" => 5u8, "b" => 15u8 }));
        assert_eq!(unsigned.encode(&parsed).unwrap(), vec![0x5f]);

        let signed = bit_struct(1, vec![BitElement::uint("a", 4), BitElement::int("b", 4)]);
        let parsed = signed.parse(&[0x5f]).unwrap();
        assert_eq!(parsed["bit"], Value::Map(record! { "a" => 5u8, "b" => -1i64 }));
        assert_eq!(signed.encode(&parsed).unwrap(), vec![0x5f]);
    }

    #[test]
    fn test_bit_enum() {
        let schema = bit_struct(
            1,
            vec![
                BitElement::uint("int1", 4),
                BitElement::enumeration("enum", 4, choices([("nothing", 0), ("all", 15)])),
            ],
        );
        let parsed = schema.parse(&[0x5f]).unwrap();
        assert_eq!(parsed["bit"], Value::Map(record! { "int1" => 5u8, "enum" => "all" }));

        let unknown = schema.parse(&[0x51]).unwrap();
        assert_eq!(unknown["bit"].as_map().unwrap()["enum"], Value::Null);
    }

    #[test]
    fn test_bit_integration() {
        let schema = bit_struct(
            2,
            vec![
                BitElement::uint("int1", 4),
                BitElement::mask("mask", 3, bitfield([("bit0", 0), ("bit1", 1), ("bit2", 2)])),
                BitElement::flag("flag"),
                BitElement::enumeration("enum", 2, choices([("nothing", 0), ("all", 3)])),
                BitElement::int("int2", 6),
            ],
        );

        let parsed = schema.parse(&[0x53, 0xf0]).unwrap();
        let expected = record! {
            "int1" => 5u8,
            "mask" => vec![Value::from("bit2")],
            "flag" => true,
            "enum" => "all",
            "int2" => -16i64,
        };
        assert_eq!(parsed["bit"], Value::Map(expected));
        assert_eq!(schema.encode(&parsed).unwrap(), vec![0x53, 0xf0]);
    }

    #[test]
    fn test_bit_struct_little_endian() {
        let schema = bit_struct(2, vec![BitElement::uint("hi", 4), BitElement::uint("lo", 12)]);
        let be = schema.parse(&[0x12, 0x34]).unwrap();
        let le = schema.parse_with(&[0x34, 0x12], Endian::Little).unwrap();
        assert_eq!(be, le);
        assert_eq!(schema.encode_with(&le, Endian::Little).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn test_bit_struct_width_mismatch() {
        let err = BitStruct::new(
            "bit",
            BitStructOptions {
                size: 1,
                elements: vec![BitElement::uint("a", 4)],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::BitWidthMismatch {
                name: "bit".into(),
                expected: 8,
                actual: 4
            }
        );

        let err = BitStruct::new(
            "bit",
            BitStructOptions {
                size: 1,
                elements: vec![BitElement::uint("a", 0), BitElement::uint("b", 8)],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidBitWidth {
                name: "a".into(),
                width: 0
            }
        );
    }

    #[test]
    fn test_bit_struct_encode_errors() {
        let schema = bit_struct(1, vec![BitElement::uint("a", 4), BitElement::int("b", 4)]);

        let missing = record! { "bit" => record! { "a" => 1u8 } };
        assert_eq!(
            schema.encode(&missing),
            Err(EncodeError::MissingField("bit.b".into()))
        );

        let too_big = record! { "bit" => record! { "a" => 16u8, "b" => 0i64 } };
        assert!(matches!(
            schema.encode(&too_big),
            Err(EncodeError::OutOfRange { bits: 4, .. })
        ));

        let too_small = record! { "bit" => record! { "a" => 0u8, "b" => -9i64 } };
        assert!(matches!(
            schema.encode(&too_small),
            Err(EncodeError::OutOfRange { bits: 4, .. })
        ));
    }

    fn sized_by(transform: Option<Transform>, elements: Vec<BitElement>) -> Result<BitStruct, SchemaError> {
        BitStruct::new(
            "bit",
            BitStructOptions {
                elements,
                size_field: Some("n".into()),
                size_field_transform: transform,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_bit_struct_size_field() {
        let elements = vec![BitElement::uint("a", 4), BitElement::uint("b", 12)];
        let schema = Schema::new()
            .field(uint8("n"))
            .field(sized_by(None, elements).unwrap());

        let parsed = schema.parse(&[0x02, 0x12, 0x34]).unwrap();
        assert_eq!(parsed["bit"], Value::Map(record! { "a" => 1u8, "b" => 0x234u16 }));

        assert_eq!(
            schema.parse(&[0x01, 0x12, 0x34]),
            Err(DecodeError::InvalidSize {
                field: "bit".into(),
                found: "1".into()
            })
        );

        let stale = record! { "n" => 0u8, "bit" => record! { "a" => 1u8, "b" => 0x234u16 } };
        assert_eq!(schema.encode(&stale).unwrap(), vec![0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_bit_struct_size_field_transform() {
        let elements = vec![BitElement::flag("f"), BitElement::uint("rest", 23)];
        let schema = Schema::new()
            .field(uint8("n"))
            .field(sized_by(Some(Transform::offset(1)), elements).unwrap());

        let data = [0x02, 0x80, 0x00, 0x05];
        let parsed = schema.parse(&data).unwrap();
        assert_eq!(parsed["bit"], Value::Map(record! { "f" => true, "rest" => 5u8 }));
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_bit_struct_size_field_needs_whole_bytes() {
        let err = sized_by(None, vec![BitElement::uint("a", 4), BitElement::uint("b", 8)]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::BitWidthMismatch {
                name: "bit".into(),
                expected: 8,
                actual: 12
            }
        );

        let err = sized_by(None, vec![BitElement::uint("a", 20), BitElement::uint("b", 20)]).unwrap_err();
        assert!(matches!(err, SchemaError::BitWidthMismatch { actual: 40, .. }));
    }

    #[test]
    fn test_bit_struct_template() {
        let schema = bit_struct(1, vec![BitElement::flag("f"), BitElement::int("i", 7)]);
        assert_eq!(
            schema.make_template()["bit"],
            Value::Map(record! { "f" => false, "i" => 0i64 })
        );
    }
}
