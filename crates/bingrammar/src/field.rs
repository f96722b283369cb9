//! The field descriptor contract shared by every codec, and the per-call
//! contexts the engines thread through it.

use std::{collections::HashMap, fmt};

use crate::{
    errors::{DecodeError, EncodeError},
    value::{Record, Value},
};

/// Byte order of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    /// Maps the `bigEndian` flag convention onto an [`Endian`].
    pub fn from_big_endian(big_endian: bool) -> Self {
        if big_endian { Endian::Big } else { Endian::Little }
    }
}

/// A named, composable unit that knows how to decode, encode and template one field.
///
/// Codecs hold configuration only. Everything derived while decoding or encoding
/// (sizes, counts, serialized branches) travels through [`ParseContext`] and
/// [`EncodeContext`], so one codec instance can serve any number of calls.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Key of this field in the value tree.
    fn name(&self) -> &str;

    /// Decodes the field from the start of `data`, returning the value and the
    /// number of bytes consumed. Earlier siblings are visible through `ctx`.
    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError>;

    /// Derives dependent values (sizes, counts, cached branches) into `ctx`
    /// before any field of the schema is serialized.
    fn prepare_encode(&self, _ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        Ok(())
    }

    /// Serializes `value`, the entry stored under [`Codec::name`].
    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError>;

    /// Default value used by [`crate::Schema::make_template`].
    fn make_struct(&self) -> Value;
}

/// Positional metadata of the loop iteration a nested schema runs in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Iteration {
    /// Zero-based index of the current element.
    pub index: usize,
    /// Total repetition count, `None` for loops that run until the buffer ends.
    pub repetitions: Option<usize>,
    /// Value derived from the loop's context field for this index.
    pub context: Option<Value>,
}

/// Where a size, count or dispatch value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// A sibling decoded earlier in the same schema.
    Sibling(String),
    /// Index of the enclosing loop iteration.
    Index,
    /// Repetition count of the enclosing loop.
    Repetitions,
    /// Context value of the enclosing loop iteration.
    Context,
}

impl FieldRef {
    /// Looks the reference up in `fields` or `iteration`.
    pub fn resolve(&self, fields: &Record, iteration: Option<&Iteration>) -> Option<Value> {
        match self {
            FieldRef::Sibling(name) => fields.get(name).cloned(),
            FieldRef::Index => iteration.map(|it| Value::from(it.index)),
            FieldRef::Repetitions => iteration.and_then(|it| it.repetitions.map(Value::from)),
            FieldRef::Context => iteration.and_then(|it| it.context.clone()),
        }
    }

    /// Name of the referenced sibling, if this is a sibling reference.
    pub fn sibling(&self) -> Option<&str> {
        match self {
            FieldRef::Sibling(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Sibling(name) => f.write_str(name),
            FieldRef::Index => f.write_str("<loop index>"),
            FieldRef::Repetitions => f.write_str("<loop repetitions>"),
            FieldRef::Context => f.write_str("<loop context>"),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(value: &str) -> Self {
        FieldRef::Sibling(value.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(value: String) -> Self {
        FieldRef::Sibling(value)
    }
}

/// Prefix holding a byte length or repetition count ahead of the data it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    /// Width of the prefix in bytes (1..=4).
    pub size: usize,
    /// Byte order of the prefix; inherits the call's endianness when `None`.
    pub endian: Option<Endian>,
}

impl Prefix {
    pub fn new(size: usize) -> Self {
        Prefix { size, endian: None }
    }

    pub fn with_endian(size: usize, endian: Endian) -> Self {
        Prefix {
            size,
            endian: Some(endian),
        }
    }
}

/// Decode-time state: siblings decoded so far plus the enclosing iteration.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Values decoded so far, in schema order.
    pub fields: Record,
    pub iteration: Option<Iteration>,
    /// Endianness inherited by fields without an override.
    pub endian: Endian,
}

impl ParseContext {
    pub fn new(iteration: Option<Iteration>, endian: Endian) -> Self {
        ParseContext {
            fields: Record::new(),
            iteration,
            endian,
        }
    }

    /// Resolves `reference` as a byte size or count for `field`.
    pub fn size_of(
        &self,
        reference: &FieldRef,
        transform: Option<&crate::transform::Transform>,
        field: &str,
    ) -> Result<usize, DecodeError> {
        let raw = reference
            .resolve(&self.fields, self.iteration.as_ref())
            .ok_or_else(|| DecodeError::MissingField {
                field: field.to_string(),
                reference: reference.to_string(),
            })?;
        let value = match transform {
            Some(t) => t.apply(raw),
            None => raw,
        };

        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| DecodeError::InvalidSize {
                field: field.to_string(),
                found: value.to_string(),
            })
    }

    pub fn endian_or(&self, endian: Option<Endian>) -> Endian {
        endian.unwrap_or(self.endian)
    }
}

/// Encode-time state: the value tree being encoded, derived values written by
/// `prepare_encode`, and the enclosing iteration.
#[derive(Debug, Clone, Default)]
pub struct EncodeContext {
    /// The record being encoded. `prepare_encode` may rewrite entries
    /// (sizes, counts) before they are serialized.
    pub fields: Record,
    /// Bytes serialized ahead of time by `prepare_encode`, keyed by field name.
    pub derived: HashMap<String, Vec<u8>>,
    pub iteration: Option<Iteration>,
    pub endian: Endian,
}

impl EncodeContext {
    pub fn new(fields: Record, iteration: Option<Iteration>, endian: Endian) -> Self {
        EncodeContext {
            fields,
            derived: HashMap::new(),
            iteration,
            endian,
        }
    }

    /// Stores a derived size or count into the referenced sibling. Iteration
    /// metadata is read-only, so non-sibling references are left untouched.
    pub fn write_back(&mut self, reference: &FieldRef, value: Value) {
        if let Some(name) = reference.sibling() {
            self.fields.insert(name.to_string(), value);
        }
    }

    /// Resolves `reference` against the record being encoded.
    pub fn lookup(&self, reference: &FieldRef) -> Option<Value> {
        reference.resolve(&self.fields, self.iteration.as_ref())
    }

    pub fn endian_or(&self, endian: Option<Endian>) -> Endian {
        endian.unwrap_or(self.endian)
    }
}

pub(crate) fn invalid_value(field: &str, expected: &'static str, found: &Value) -> EncodeError {
    match found {
        Value::Null => EncodeError::MissingField(field.to_string()),
        _ => EncodeError::InvalidValue {
            field: field.to_string(),
            expected,
            found: found.kind().to_string(),
        },
    }
}

pub(crate) fn check_integer_size(size: usize) -> Result<(), crate::errors::SchemaError> {
    if (1..=4).contains(&size) {
        Ok(())
    } else {
        Err(crate::errors::SchemaError::InvalidIntegerSize(size))
    }
}
