//! Serde-deserializable schema description.
//!
//! These types describe a schema as data, for example a JSON file shipped with
//! an application, and are turned into a [`Schema`] with `Schema::try_from`.
//! Closures cannot be described this way, so transforms are limited to linear
//! ones and loop contexts to picking the element of a list field.
//!
//! ```json
//! { "fields": [
//!     { "type": "uint", "name": "len" },
//!     { "type": "binary", "name": "data", "size_field": "len" }
//! ] }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    binary::{Binary, BinaryOptions, bcd},
    bitmask::{BitMask, BitMaskOptions},
    bitstruct::{BitElement, BitStruct, BitStructOptions},
    checksum::{Algorithm, Crc},
    delim::{DelimOptions, DelimString},
    enumeration::{EnumOptions, Enumeration},
    errors::SchemaError,
    field::{Codec, Endian, FieldRef, Prefix},
    magic::Magic,
    numeric::{Float, FloatOptions, Int, IntegerOptions, UInt},
    repetition::{ContextField, Loop, LoopOptions, Repetitions},
    schema::Schema,
    selector::{Case, Match, Selector, SelectorOptions},
    string::{BinString, StringOptions, ascii_float, ascii_integer},
    text::TextEncoding,
    transform::Transform,
};

/// Top-level schema definition: fields in wire order.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SchemaDef {
    pub fields: Vec<FieldDef>,
}

/// Description of a single field, tagged by `"type"`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDef {
    Uint(IntegerDef),
    Int(IntegerDef),
    Float(FloatDef),
    Binary(BinaryDef),
    Bcd(BcdDef),
    String(StringDef),
    AsciiInteger(StringDef),
    AsciiFloat(StringDef),
    Delim(DelimDef),
    Magic(MagicDef),
    Enum(EnumDef),
    BitMask(BitMaskDef),
    BitStruct(BitStructDef),
    Loop(LoopDef),
    Selector(SelectorDef),
    Crc(CrcDef),
}

fn one() -> usize {
    1
}

fn four() -> usize {
    4
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegerDef {
    pub name: String,
    #[serde(default = "one")]
    pub size: usize,
    #[serde(default)]
    pub endian: Option<Endian>,
    #[serde(default)]
    pub transform: Option<TransformDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FloatDef {
    pub name: String,
    #[serde(default = "four")]
    pub size: usize,
    #[serde(default)]
    pub endian: Option<Endian>,
    #[serde(default)]
    pub transform: Option<TransformDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinaryDef {
    pub name: String,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub size_prefix: Option<PrefixDef>,
    #[serde(default)]
    pub size_field: Option<FieldRefDef>,
    #[serde(default)]
    pub size_field_transform: Option<TransformDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BcdDef {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StringDef {
    pub name: String,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub encoding: TextEncoding,
    #[serde(default)]
    pub null_terminated: bool,
    #[serde(default)]
    pub size_prefix: Option<PrefixDef>,
    #[serde(default)]
    pub size_field: Option<FieldRefDef>,
    #[serde(default)]
    pub size_field_transform: Option<TransformDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DelimDef {
    pub name: String,
    /// Defaults to CR LF.
    #[serde(default)]
    pub delimiter: Option<BytesDef>,
    #[serde(default)]
    pub inclusive: bool,
    #[serde(default)]
    pub encoding: TextEncoding,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MagicDef {
    pub name: String,
    pub data: BytesDef,
    /// Encoding of textual `data`; plain UTF-8 bytes when absent.
    #[serde(default)]
    pub encoding: Option<TextEncoding>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnumDef {
    pub name: String,
    #[serde(default = "one")]
    pub size: usize,
    pub choices: IndexMap<String, u64>,
    #[serde(default)]
    pub endian: Option<Endian>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BitMaskDef {
    pub name: String,
    #[serde(default = "one")]
    pub size: usize,
    pub bitfield: IndexMap<String, u32>,
    #[serde(default)]
    pub endian: Option<Endian>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BitStructDef {
    pub name: String,
    #[serde(default = "one")]
    pub size: usize,
    pub elements: Vec<BitElementDef>,
    #[serde(default)]
    pub endian: Option<Endian>,
    #[serde(default)]
    pub size_field: Option<FieldRefDef>,
    #[serde(default)]
    pub size_field_transform: Option<TransformDef>,
}

/// Element of a bit struct; `bits` is the width of the slice.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BitElementDef {
    Flag {
        name: String,
    },
    Uint {
        name: String,
        bits: usize,
    },
    Int {
        name: String,
        bits: usize,
    },
    Enum {
        name: String,
        bits: usize,
        choices: IndexMap<String, u64>,
    },
    Mask {
        name: String,
        bits: usize,
        bitfield: IndexMap<String, u32>,
    },
}

/// Loop definition. The count comes from `count_prefix`, `count_field` or
/// `count`, in that order; with none of them the loop is unbounded.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoopDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub count_field: Option<FieldRefDef>,
    #[serde(default)]
    pub count_prefix: Option<PrefixDef>,
    /// List field whose entries become the per-element context.
    #[serde(default)]
    pub context_field: Option<FieldRefDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SelectorDef {
    pub name: String,
    pub field: FieldRefDef,
    pub cases: Vec<CaseDef>,
    #[serde(default)]
    pub size_field: Option<FieldRefDef>,
    #[serde(default)]
    pub size_field_transform: Option<TransformDef>,
    #[serde(default)]
    pub flatten: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaseDef {
    pub matches: MatchDef,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum MatchDef {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CrcDef {
    pub name: String,
    pub algorithm: Algorithm,
    pub fields: Vec<FieldDef>,
}

/// Text (taken as ASCII) or a list of byte values.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum BytesDef {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct PrefixDef {
    pub size: usize,
    #[serde(default)]
    pub endian: Option<Endian>,
}

/// Either a sibling name or `{ "iteration": "index" | "repetitions" | "context" }`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum FieldRefDef {
    Sibling(String),
    Iteration { iteration: IterationRefDef },
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum IterationRefDef {
    Index,
    Repetitions,
    Context,
}

/// Linear transform `value * scale + offset`. An offset alone, if integral,
/// keeps integers integral.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub struct TransformDef {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
}

impl From<TransformDef> for Transform {
    fn from(value: TransformDef) -> Self {
        match (value.scale, value.offset) {
            (None, None) => Transform::identity(),
            (None, Some(offset)) if offset.fract() == 0.0 => Transform::offset(offset as i64),
            (scale, offset) => Transform::linear(scale.unwrap_or(1.0), offset.unwrap_or(0.0)),
        }
    }
}

impl From<FieldRefDef> for FieldRef {
    fn from(value: FieldRefDef) -> Self {
        match value {
            FieldRefDef::Sibling(name) => FieldRef::Sibling(name),
            FieldRefDef::Iteration { iteration } => match iteration {
                IterationRefDef::Index => FieldRef::Index,
                IterationRefDef::Repetitions => FieldRef::Repetitions,
                IterationRefDef::Context => FieldRef::Context,
            },
        }
    }
}

impl From<PrefixDef> for Prefix {
    fn from(value: PrefixDef) -> Self {
        Prefix {
            size: value.size,
            endian: value.endian,
        }
    }
}

impl From<MatchDef> for Match {
    fn from(value: MatchDef) -> Self {
        match value {
            MatchDef::Int(v) => Match::Int(v),
            MatchDef::Text(v) => Match::Text(v),
            MatchDef::Bytes(v) => Match::Bytes(v),
        }
    }
}

impl From<BytesDef> for Vec<u8> {
    fn from(value: BytesDef) -> Self {
        match value {
            BytesDef::Text(text) => text.into_bytes(),
            BytesDef::Bytes(bytes) => bytes,
        }
    }
}

impl From<BitElementDef> for BitElement {
    fn from(value: BitElementDef) -> Self {
        match value {
            BitElementDef::Flag { name } => BitElement::flag(name),
            BitElementDef::Uint { name, bits } => BitElement::uint(name, bits),
            BitElementDef::Int { name, bits } => BitElement::int(name, bits),
            BitElementDef::Enum { name, bits, choices } => BitElement::enumeration(name, bits, choices),
            BitElementDef::Mask { name, bits, bitfield } => BitElement::mask(name, bits, bitfield),
        }
    }
}

impl FieldDef {
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Uint(d) | FieldDef::Int(d) => &d.name,
            FieldDef::Float(d) => &d.name,
            FieldDef::Binary(d) => &d.name,
            FieldDef::Bcd(d) => &d.name,
            FieldDef::String(d) | FieldDef::AsciiInteger(d) | FieldDef::AsciiFloat(d) => &d.name,
            FieldDef::Delim(d) => &d.name,
            FieldDef::Magic(d) => &d.name,
            FieldDef::Enum(d) => &d.name,
            FieldDef::BitMask(d) => &d.name,
            FieldDef::BitStruct(d) => &d.name,
            FieldDef::Loop(d) => &d.name,
            FieldDef::Selector(d) => &d.name,
            FieldDef::Crc(d) => &d.name,
        }
    }
}

fn integer_options(def: &IntegerDef) -> IntegerOptions {
    IntegerOptions {
        size: def.size,
        endian: def.endian,
        transform: def.transform.map(Transform::from),
    }
}

fn string_options(def: StringDef) -> StringOptions {
    StringOptions {
        size: def.size,
        encoding: def.encoding,
        null_terminated: def.null_terminated,
        size_prefix: def.size_prefix.map(Prefix::from),
        size_field: def.size_field.map(FieldRef::from),
        size_field_transform: def.size_field_transform.map(Transform::from),
        transform: None,
    }
}

fn nested(fields: Vec<FieldDef>) -> Result<Schema, SchemaError> {
    Schema::try_from(SchemaDef { fields })
}

pub(crate) fn build_field(def: FieldDef) -> Result<Arc<dyn Codec>, SchemaError> {
    if def.name().trim().is_empty() {
        return Err(SchemaError::InvalidDefinition {
            name: def.name().to_string(),
            reason: "field names must not be empty".to_string(),
        });
    }

    let codec: Arc<dyn Codec> = match def {
        FieldDef::Uint(d) => Arc::new(UInt::new(d.name.clone(), integer_options(&d))?),
        FieldDef::Int(d) => Arc::new(Int::new(d.name.clone(), integer_options(&d))?),
        FieldDef::Float(d) => Arc::new(Float::new(
            d.name,
            FloatOptions {
                size: d.size,
                endian: d.endian,
                transform: d.transform.map(Transform::from),
            },
        )?),
        FieldDef::Binary(d) => Arc::new(Binary::new(
            d.name,
            BinaryOptions {
                size: d.size,
                size_prefix: d.size_prefix.map(Prefix::from),
                size_field: d.size_field.map(FieldRef::from),
                size_field_transform: d.size_field_transform.map(Transform::from),
                transform: None,
            },
        )?),
        FieldDef::Bcd(d) => Arc::new(bcd(d.name, d.size)),
        FieldDef::String(d) => Arc::new(BinString::new(d.name.clone(), string_options(d))?),
        FieldDef::AsciiInteger(d) => Arc::new(ascii_integer(d.name.clone(), string_options(d))?),
        FieldDef::AsciiFloat(d) => Arc::new(ascii_float(d.name.clone(), string_options(d))?),
        FieldDef::Delim(d) => {
            let mut opts = DelimOptions {
                inclusive: d.inclusive,
                encoding: d.encoding,
                ..Default::default()
            };
            if let Some(delimiter) = d.delimiter {
                opts.delimiter = delimiter.into();
            }
            Arc::new(DelimString::new(d.name, opts)?)
        }
        FieldDef::Magic(d) => match (d.data, d.encoding) {
            (BytesDef::Text(text), Some(encoding)) => Arc::new(Magic::text(d.name, &text, encoding)?),
            (data, _) => Arc::new(Magic::new(d.name, Vec::from(data))),
        },
        FieldDef::Enum(d) => Arc::new(Enumeration::new(
            d.name,
            EnumOptions {
                size: d.size,
                choices: d.choices,
                endian: d.endian,
            },
        )?),
        FieldDef::BitMask(d) => Arc::new(BitMask::new(
            d.name,
            BitMaskOptions {
                size: d.size,
                bitfield: d.bitfield,
                endian: d.endian,
            },
        )?),
        FieldDef::BitStruct(d) => Arc::new(BitStruct::new(
            d.name,
            BitStructOptions {
                size: d.size,
                elements: d.elements.into_iter().map(BitElement::from).collect(),
                endian: d.endian,
                size_field: d.size_field.map(FieldRef::from),
                size_field_transform: d.size_field_transform.map(Transform::from),
            },
        )?),
        FieldDef::Loop(d) => {
            let repetitions = match (d.count_prefix, d.count_field, d.count) {
                (Some(prefix), _, _) => Repetitions::Prefixed(prefix.into()),
                (None, Some(field), _) => Repetitions::Field(field.into()),
                (None, None, Some(count)) => Repetitions::Fixed(count),
                (None, None, None) => Repetitions::Unbounded,
            };
            Arc::new(Loop::new(
                d.name,
                LoopOptions {
                    schema: nested(d.fields)?,
                    repetitions,
                    context_field: d.context_field.map(|f| ContextField::element_of(FieldRef::from(f))),
                },
            )?)
        }
        FieldDef::Selector(d) => {
            let cases = d
                .cases
                .into_iter()
                .map(|c| nested(c.fields).map(|schema| Case::new(Match::from(c.matches), schema)))
                .collect::<Result<Vec<_>, _>>()?;

            Arc::new(Selector::new(
                d.name,
                SelectorOptions {
                    field: d.field.into(),
                    cases,
                    size_field: d.size_field.map(FieldRef::from),
                    size_field_transform: d.size_field_transform.map(Transform::from),
                    flatten: d.flatten,
                },
            ))
        }
        FieldDef::Crc(d) => Arc::new(Crc::with_algorithm(d.name, nested(d.fields)?, d.algorithm)),
    };

    Ok(codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        record,
        value::{Record, Value},
    };

    fn compile(json: &str) -> Schema {
        let def: SchemaDef = serde_json::from_str(json).unwrap();
        Schema::try_from(def).unwrap()
    }

    #[test]
    fn test_deserialize_and_parse() {
        let schema = compile(
            r#"{ "fields": [
                { "type": "magic", "name": "sync", "data": [170, 85] },
                { "type": "uint", "name": "len" },
                { "type": "binary", "name": "data", "size_field": "len" },
                { "type": "uint", "name": "temp", "size": 2, "endian": "little",
                  "transform": { "scale": 0.5 } }
            ] }"#,
        );

        let data = [0xaa, 0x55, 0x02, 0x01, 0x02, 0xe8, 0x03];
        let parsed = schema.parse(&data).unwrap();
        assert_eq!(parsed["sync"], Value::Bool(true));
        assert_eq!(parsed["data"], Value::Bytes(vec![1, 2]));
        assert_eq!(parsed["temp"], Value::Float(500.0));
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_deserialize_combinators() {
        let schema = compile(
            r#"{ "fields": [
                { "type": "uint", "name": "kind" },
                { "type": "loop", "name": "items", "count_prefix": { "size": 1 },
                  "fields": [ { "type": "uint", "name": "v" } ] },
                { "type": "selector", "name": "body", "field": "kind", "flatten": true,
                  "cases": [
                      { "matches": 1, "fields": [ { "type": "string", "name": "s", "null_terminated": true } ] },
                      { "matches": 2, "fields": [ { "type": "uint", "name": "n", "size": 2 } ] }
                  ] },
                { "type": "crc", "name": "crc", "algorithm": "crc8_xor",
                  "fields": [ { "type": "uint", "name": "x" } ] }
            ] }"#,
        );

        let data = [0x02, 0x02, 0x0a, 0x0b, 0x01, 0x00, 0x07, 0x07];
        let parsed = schema.parse(&data).unwrap();
        assert_eq!(parsed["items"].as_list().unwrap().len(), 2);
        assert_eq!(parsed["body"], Value::UInt(0x0100));
        assert_eq!(parsed["x"], Value::UInt(7));
        assert_eq!(parsed["crc"], Value::Bool(true));
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_deserialize_bit_struct() {
        let schema = compile(
            r#"{ "fields": [
                { "type": "bit_struct", "name": "bits", "elements": [
                    { "type": "uint", "name": "a", "bits": 4 },
                    { "type": "int", "name": "b", "bits": 4 }
                ] }
            ] }"#,
        );
        let parsed = schema.parse(&[0x5f]).unwrap();
        assert_eq!(parsed["bits"], Value::Map(record! { "a" => 5u8, "b" => -1i64 }));

        let sized = compile(
            r#"{ "fields": [
                { "type": "uint", "name": "n" },
                { "type": "bit_struct", "name": "bits", "size_field": "n", "elements": [
                    { "type": "uint", "name": "a", "bits": 16 }
                ] }
            ] }"#,
        );
        let encoded = sized.encode(&record! { "bits" => record! { "a" => 0x0102u16 } }).unwrap();
        assert_eq!(encoded, vec![0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_deserialize_text_magic() {
        let schema = compile(
            r#"{ "fields": [ { "type": "magic", "name": "sig", "data": "MZ", "encoding": "utf16_le" } ] }"#,
        );
        assert_eq!(schema.encode(&Record::new()).unwrap(), vec![b'M', 0, b'Z', 0]);
    }

    #[test]
    fn test_iteration_refs() {
        let def: FieldRefDef = serde_json::from_str(r#"{ "iteration": "index" }"#).unwrap();
        assert_eq!(FieldRef::from(def), FieldRef::Index);

        let def: FieldRefDef = serde_json::from_str(r#""len""#).unwrap();
        assert_eq!(FieldRef::from(def), FieldRef::Sibling("len".into()));
    }

    #[test]
    fn test_transform_defs() {
        let shift = Transform::from(TransformDef {
            scale: None,
            offset: Some(2.0),
        });
        assert_eq!(shift.apply(Value::UInt(1)), Value::UInt(3));

        let linear = Transform::from(TransformDef {
            scale: Some(2.0),
            offset: None,
        });
        assert_eq!(linear.apply(Value::UInt(1)), Value::Float(2.0));

        let identity = Transform::from(TransformDef::default());
        assert_eq!(identity.apply(Value::UInt(1)), Value::UInt(1));
    }

    #[test]
    fn test_invalid_definitions() {
        let def: SchemaDef =
            serde_json::from_str(r#"{ "fields": [ { "type": "uint", "name": "u", "size": 8 } ] }"#).unwrap();
        assert_eq!(
            Schema::try_from(def).unwrap_err(),
            SchemaError::InvalidIntegerSize(8)
        );

        let def: SchemaDef =
            serde_json::from_str(r#"{ "fields": [ { "type": "uint", "name": " " } ] }"#).unwrap();
        assert!(matches!(
            Schema::try_from(def),
            Err(SchemaError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_value_json_round_trip() {
        let schema = compile(
            r#"{ "fields": [
                { "type": "uint", "name": "n" },
                { "type": "binary", "name": "b", "size": 2 }
            ] }"#,
        );
        let parsed = schema.parse(&[0x01, 0xca, 0xfe]).unwrap();

        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, r#"{"n":1,"b":[202,254]}"#);

        let back: crate::value::Record = serde_json::from_str(&json).unwrap();
        assert_eq!(schema.encode(&back).unwrap(), vec![0x01, 0xca, 0xfe]);
    }
}
