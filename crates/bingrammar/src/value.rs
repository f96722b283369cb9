//! The decoded value tree.
//!
//! A schema decodes into a [`Record`]: an insertion-ordered map from field name
//! to [`Value`]. Nested schemas (bit structs, loop elements, selector branches)
//! produce nested records, so the tree mirrors the shape of the schema.

use std::{borrow::Cow, fmt};

use indexmap::IndexMap;

/// Ordered field map produced by a decode and consumed by an encode.
pub type Record = IndexMap<String, Value>;

/// A single decoded value.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// No value: unmatched enums and selectors, missing delimiters.
    #[default]
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(Record),
    /// Raw bytes. Serialized as an array of numbers.
    Bytes(Vec<u8>),
}

impl Value {
    /// Unsigned view of the value. Accepts non-negative integers and
    /// non-negative finite floats (rounded to the nearest integer).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Float(v) if v.is_finite() && *v >= 0.0 && *v <= u64::MAX as f64 => {
                Some(v.round() as u64)
            }
            _ => None,
        }
    }

    /// Signed view of the value. Accepts integers in `i64` range and finite floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v)
                if v.is_finite() && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 =>
            {
                Some(v.round() as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Byte view of the value. A list of byte-sized integers is accepted too,
    /// which is what a JSON round trip turns [`Value::Bytes`] into.
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Value::Bytes(v) => Some(Cow::Borrowed(v)),
            Value::List(values) => values
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Cow::Owned),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::UInt(_) => "unsigned integer",
            Value::Int(_) => "signed integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => {
                f.write_str("0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Map(record) => {
                f.write_str("{")?;
                for (i, (k, v)) in record.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::UInt(value.into())
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::UInt(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::UInt(value as u64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Map(value)
    }
}

/// Builds a [`Record`] from `name => value` pairs.
///
/// ```
/// use bingrammar::{record, Value};
///
/// let r = record! { "id" => 7u8, "name" => "probe" };
/// assert_eq!(r["id"], Value::UInt(7));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert(::std::string::String::from($name), $crate::Value::from($value)); )+
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_u64_coercions() {
        assert_eq!(Value::UInt(5).as_u64(), Some(5));
        assert_eq!(Value::Int(5).as_u64(), Some(5));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::Float(9.9999999).as_u64(), Some(10));
        assert_eq!(Value::Float(-1.0).as_u64(), None);
        assert_eq!(Value::Text("5".into()).as_u64(), None);
    }

    #[test]
    fn test_as_bytes_from_list() {
        let list = Value::List(vec![Value::UInt(1), Value::Int(2), Value::UInt(255)]);
        assert_eq!(list.as_bytes().unwrap().as_ref(), &[1, 2, 255]);

        let too_big = Value::List(vec![Value::UInt(256)]);
        assert!(too_big.as_bytes().is_none());
    }

    #[test]
    fn test_record_macro_keeps_order() {
        let r = record! { "b" => 1u8, "a" => 2u8 };
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn test_display() {
        let v = Value::Map(record! { "data" => vec![0x0du8, 0x0a], "ok" => true });
        assert_eq!(v.to_string(), "{data: 0x0d0a, ok: true}");
    }
}
