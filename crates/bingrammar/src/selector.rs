//! Variant dispatch: pick one of several nested schemas by the value of an
//! earlier field.

use crate::{
    bits::take,
    errors::{DecodeError, EncodeError},
    field::{Codec, EncodeContext, FieldRef, ParseContext, invalid_value},
    schema::Schema,
    transform::{Transform, backward},
    value::{Record, Value},
};

/// Value a [`Case`] matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// Matches signed and unsigned integers of equal value.
    Int(i64),
    Text(String),
    /// Compared byte by byte.
    Bytes(Vec<u8>),
}

impl Match {
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Match::Int(expected), Value::Int(v)) => expected == v,
            (Match::Int(expected), Value::UInt(v)) => i64::try_from(*v).is_ok_and(|v| v == *expected),
            (Match::Text(expected), Value::Text(v)) => expected == v,
            (Match::Bytes(expected), value) => value
                .as_bytes()
                .is_some_and(|bytes| bytes.as_ref() == expected.as_slice()),
            _ => false,
        }
    }
}

macro_rules! match_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Match {
            fn from(value: $t) -> Self {
                Match::Int(value.into())
            }
        })*
    };
}

match_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<&str> for Match {
    fn from(value: &str) -> Self {
        Match::Text(value.to_string())
    }
}

impl From<String> for Match {
    fn from(value: String) -> Self {
        Match::Text(value)
    }
}

impl From<Vec<u8>> for Match {
    fn from(value: Vec<u8>) -> Self {
        Match::Bytes(value)
    }
}

impl From<&[u8]> for Match {
    fn from(value: &[u8]) -> Self {
        Match::Bytes(value.to_vec())
    }
}

/// One branch of a [`Selector`].
#[derive(Debug, Clone)]
pub struct Case {
    pub matches: Match,
    pub schema: Schema,
}

impl Case {
    pub fn new(matches: impl Into<Match>, schema: Schema) -> Self {
        Case {
            matches: matches.into(),
            schema,
        }
    }

    /// Name of the only field of a single field branch.
    fn single_field(&self) -> Option<&str> {
        match self.schema.fields() {
            [only] => Some(only.name()),
            _ => None,
        }
    }
}

/// Options of [`Selector`].
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    /// Field whose value picks the branch.
    pub field: FieldRef,
    /// Branches, tried in order. The first match wins.
    pub cases: Vec<Case>,
    /// Bounds the branch region. Without it the branch gets the rest of the
    /// buffer and the selector consumes what the branch consumed.
    pub size_field: Option<FieldRef>,
    pub size_field_transform: Option<Transform>,
    /// Replace the map of a single field branch with that field's value.
    pub flatten: bool,
}

impl SelectorOptions {
    pub fn new(field: impl Into<FieldRef>, cases: Vec<Case>) -> Self {
        SelectorOptions {
            field: field.into(),
            cases,
            size_field: None,
            size_field_transform: None,
            flatten: false,
        }
    }
}

/// Variant dispatch. Decodes to the branch's map, or [`Value::Null`] when no
/// case matches.
#[derive(Debug, Clone)]
pub struct Selector {
    name: String,
    opts: SelectorOptions,
}

impl Selector {
    pub fn new(name: impl Into<String>, opts: SelectorOptions) -> Self {
        Selector {
            name: name.into(),
            opts,
        }
    }

    fn select(&self, dispatch: &Value) -> Option<&Case> {
        self.opts.cases.iter().find(|case| case.matches.matches(dispatch))
    }

    fn flattened<'a>(&self, case: &'a Case) -> Option<&'a str> {
        if self.opts.flatten {
            case.single_field()
        } else {
            None
        }
    }
}

impl Codec for Selector {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let dispatch = self
            .opts
            .field
            .resolve(&ctx.fields, ctx.iteration.as_ref())
            .ok_or_else(|| DecodeError::MissingField {
                field: self.name.clone(),
                reference: self.opts.field.to_string(),
            })?;

        let region = match &self.opts.size_field {
            Some(field) => {
                let size = ctx.size_of(field, self.opts.size_field_transform.as_ref(), &self.name)?;
                take(data, size, &self.name)?
            }
            None => data,
        };

        let Some(case) = self.select(&dispatch) else {
            debug!(field = %self.name, %dispatch, "no matching case");
            return Ok((Value::Null, region.len()));
        };

        let (mut record, used) = case
            .schema
            .parse_scoped(region, ctx.iteration.clone(), ctx.endian)?;
        let consumed = match self.opts.size_field {
            Some(_) => region.len(),
            None => used,
        };

        let value = match self.flattened(case) {
            Some(only) => record.shift_remove(only).unwrap_or_default(),
            None => Value::Map(record),
        };
        Ok((value, consumed))
    }

    fn prepare_encode(&self, ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        let Some(value) = ctx.fields.get(&self.name).cloned() else {
            return Ok(());
        };
        let dispatch = ctx
            .lookup(&self.opts.field)
            .ok_or_else(|| EncodeError::MissingField(self.opts.field.to_string()))?;
        let case = self.select(&dispatch).ok_or_else(|| EncodeError::NoMatchingCase {
            field: self.name.clone(),
            value: dispatch.to_string(),
        })?;

        let record = match self.flattened(case) {
            Some(only) => {
                let mut record = Record::new();
                record.insert(only.to_string(), value);
                record
            }
            None => value
                .as_map()
                .cloned()
                .ok_or_else(|| invalid_value(&self.name, "map", &value))?,
        };

        let bytes = case
            .schema
            .encode_scoped(record, ctx.iteration.clone(), ctx.endian)?;

        if let Some(field) = &self.opts.size_field {
            let size = backward(self.opts.size_field_transform.as_ref(), Value::from(bytes.len()));
            ctx.write_back(field, size);
        }
        ctx.derived.insert(self.name.clone(), bytes);
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        ctx.derived
            .get(&self.name)
            .cloned()
            .ok_or_else(|| invalid_value(&self.name, "map", value))
    }

    fn make_struct(&self) -> Value {
        let Some(case) = self.opts.cases.first() else {
            return Value::Null;
        };
        let mut template = case.schema.make_template();
        match self.flattened(case) {
            Some(only) => template.shift_remove(only).unwrap_or_default(),
            None => Value::Map(template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::{Binary, BinaryOptions},
        numeric::{uint8, uint16},
        record,
        string::{BinString, StringOptions},
    };

    fn tagged(flatten: bool, sized: bool) -> Schema {
        let cases = vec![
            Case::new(1, Schema::new().field(uint16("number"))),
            Case::new(
                2,
                Schema::new().field(
                    BinString::new(
                        "text",
                        StringOptions {
                            null_terminated: true,
                            ..Default::default()
                        },
                    )
                    .unwrap(),
                ),
            ),
            Case::new(
                3,
                Schema::new().field(uint8("a")).field(uint8("b")),
            ),
        ];

        let mut opts = SelectorOptions::new("tag", cases);
        opts.flatten = flatten;

        let mut schema = Schema::new().field(uint8("tag"));
        if sized {
            opts.size_field = Some("len".into());
            schema = schema.field(uint8("len"));
        }
        schema.field(Selector::new("body", opts)).field(uint8("tail"))
    }

    #[test]
    fn test_selector_dispatch() {
        let schema = tagged(false, false);

        let parsed = schema.parse(&[0x01, 0x12, 0x34, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Map(record! { "number" => 0x1234u16 }));
        assert_eq!(parsed["tail"], Value::UInt(0xff));

        let parsed = schema.parse(&[0x03, 0x0a, 0x0b, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Map(record! { "a" => 10u8, "b" => 11u8 }));
        assert_eq!(schema.encode(&parsed).unwrap(), vec![0x03, 0x0a, 0x0b, 0xff]);
    }

    #[test]
    fn test_selector_flatten() {
        let schema = tagged(true, false);

        let parsed = schema.parse(&[0x02, b'h', b'i', 0x00, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Text("hi".into()));
        assert_eq!(schema.encode(&parsed).unwrap(), vec![0x02, b'h', b'i', 0x00, 0xff]);

        // only single field branches collapse
        let parsed = schema.parse(&[0x03, 0x0a, 0x0b, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Map(record! { "a" => 10u8, "b" => 11u8 }));
    }

    #[test]
    fn test_selector_size_field() {
        let schema = tagged(false, true);

        // the branch reads 2 bytes of a 3 byte region
        let parsed = schema.parse(&[0x01, 0x03, 0x12, 0x34, 0x56, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Map(record! { "number" => 0x1234u16 }));
        assert_eq!(parsed["tail"], Value::UInt(0xff));

        // encoding derives the size from the serialized branch
        assert_eq!(
            schema.encode(&parsed).unwrap(),
            vec![0x01, 0x02, 0x12, 0x34, 0xff]
        );
    }

    #[test]
    fn test_selector_no_match() {
        let schema = tagged(false, true);
        let parsed = schema.parse(&[0x09, 0x02, 0xaa, 0xbb, 0xff]).unwrap();
        assert_eq!(parsed["body"], Value::Null);
        assert_eq!(parsed["tail"], Value::UInt(0xff));

        assert_eq!(
            schema.encode(&parsed),
            Err(EncodeError::NoMatchingCase {
                field: "body".into(),
                value: "9".into()
            })
        );
    }

    #[test]
    fn test_selector_missing_dispatch() {
        let schema = Schema::new().field(Selector::new(
            "body",
            SelectorOptions::new("tag", vec![Case::new(1, Schema::new())]),
        ));
        assert_eq!(
            schema.parse(&[]),
            Err(DecodeError::MissingField {
                field: "body".into(),
                reference: "tag".into()
            })
        );
    }

    #[test]
    fn test_selector_matches_text_and_bytes() {
        let body = || Schema::new().field(uint8("v"));
        let schema = Schema::new()
            .field(
                BinString::new(
                    "kind",
                    StringOptions {
                        size: 2,
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
            .field(
                Binary::new(
                    "id",
                    BinaryOptions {
                        size: Some(2),
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
            .field(Selector::new(
                "by_text",
                SelectorOptions::new("kind", vec![Case::new("AB", body())]),
            ))
            .field(Selector::new(
                "by_bytes",
                SelectorOptions::new("id", vec![Case::new(vec![0xcau8, 0xfe], body())]),
            ));

        let parsed = schema.parse(b"AB\xca\xfe\x01\x02").unwrap();
        assert_eq!(parsed["by_text"], Value::Map(record! { "v" => 1u8 }));
        assert_eq!(parsed["by_bytes"], Value::Map(record! { "v" => 2u8 }));
    }

    #[test]
    fn test_match_equality() {
        assert!(Match::Int(1).matches(&Value::UInt(1)));
        assert!(Match::Int(-1).matches(&Value::Int(-1)));
        assert!(!Match::Int(1).matches(&Value::Text("1".into())));
        assert!(!Match::Text("1".into()).matches(&Value::UInt(1)));
        assert!(Match::Bytes(vec![1, 2]).matches(&Value::Bytes(vec![1, 2])));
        assert!(!Match::Bytes(vec![1, 2]).matches(&Value::Bytes(vec![1])));
    }

    #[test]
    fn test_selector_template() {
        let schema = tagged(false, false);
        assert_eq!(
            schema.make_template()["body"],
            Value::Map(record! { "number" => 0u8 })
        );
        let flat = tagged(true, false);
        assert_eq!(flat.make_template()["body"], Value::UInt(0));
    }
}
