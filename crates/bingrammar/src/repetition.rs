//! Repetition of a nested schema.
//!
//! Every element runs in its own scope. Its position is handed to the nested
//! schema as an [`Iteration`], which fields read through [`FieldRef::Index`],
//! [`FieldRef::Repetitions`] and [`FieldRef::Context`]. None of it ends up in
//! the decoded elements.

use std::{fmt, sync::Arc};

use crate::{
    bits::{read_uint, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, FieldRef, Iteration, ParseContext, Prefix, check_integer_size, invalid_value},
    schema::Schema,
    value::Value,
};

/// Where the repetition count comes from.
///
/// Every loop stops at the end of the buffer. Only an unbounded loop tolerates
/// a truncated last element; with a count it is an `OutOfBounds` error.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Repetitions {
    /// Inline count ahead of the elements.
    Prefixed(Prefix),
    /// Earlier sibling holding the count. Rewritten from the element count on encode.
    Field(FieldRef),
    Fixed(usize),
    /// Repeat until the buffer is exhausted.
    #[default]
    Unbounded,
}

type ContextFn = Arc<dyn Fn(&Value, usize) -> Value + Send + Sync>;

/// Derives the per-element context value from an outer field and the element index.
#[derive(Clone)]
pub struct ContextField {
    pub field: FieldRef,
    transform: ContextFn,
}

impl ContextField {
    pub fn new<F>(field: impl Into<FieldRef>, transform: F) -> Self
    where
        F: Fn(&Value, usize) -> Value + Send + Sync + 'static,
    {
        ContextField {
            field: field.into(),
            transform: Arc::new(transform),
        }
    }

    /// Hands element `index` the matching entry of a list field, or the field
    /// itself when it is not a list.
    pub fn element_of(field: impl Into<FieldRef>) -> Self {
        Self::new(field, |value, index| match value {
            Value::List(items) => items.get(index).cloned().unwrap_or_default(),
            other => other.clone(),
        })
    }

    fn derive(&self, value: &Value, index: usize) -> Value {
        (self.transform)(value, index)
    }
}

impl fmt::Debug for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextField").field("field", &self.field).finish_non_exhaustive()
    }
}

/// Options of [`Loop`].
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Schema of one element.
    pub schema: Schema,
    pub repetitions: Repetitions,
    pub context_field: Option<ContextField>,
}

/// Repeats [`LoopOptions::schema`]. Decodes to a list of maps.
///
/// Decoding stops early once the buffer is exhausted, and drops a trailing
/// element that does not fit completely.
#[derive(Debug, Clone)]
pub struct Loop {
    name: String,
    opts: LoopOptions,
}

impl Loop {
    pub fn new(name: impl Into<String>, opts: LoopOptions) -> Result<Self, SchemaError> {
        if let Repetitions::Prefixed(prefix) = &opts.repetitions {
            check_integer_size(prefix.size)?;
        }
        Ok(Loop {
            name: name.into(),
            opts,
        })
    }

    fn iteration(&self, index: usize, repetitions: Option<usize>, source: Option<&Value>) -> Iteration {
        let context = match (&self.opts.context_field, source) {
            (Some(cf), Some(value)) => Some(cf.derive(value, index)),
            _ => None,
        };
        Iteration {
            index,
            repetitions,
            context,
        }
    }
}

impl Codec for Loop {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let mut offset = 0;
        let count = match &self.opts.repetitions {
            Repetitions::Prefixed(prefix) => {
                offset = prefix.size;
                Some(read_uint(data, prefix.size, ctx.endian_or(prefix.endian), &self.name)? as usize)
            }
            Repetitions::Field(field) => Some(ctx.size_of(field, None, &self.name)?),
            Repetitions::Fixed(count) => Some(*count),
            Repetitions::Unbounded => None,
        };

        let source = match &self.opts.context_field {
            Some(cf) => Some(
                cf.field
                    .resolve(&ctx.fields, ctx.iteration.as_ref())
                    .ok_or_else(|| DecodeError::MissingField {
                        field: self.name.clone(),
                        reference: cf.field.to_string(),
                    })?,
            ),
            None => None,
        };

        let mut items = Vec::new();
        while count.is_none_or(|count| items.len() < count) {
            if offset >= data.len() {
                break;
            }

            let iteration = self.iteration(items.len(), count, source.as_ref());
            let element = match self.opts.schema.parse_scoped(&data[offset..], Some(iteration), ctx.endian) {
                Ok(element) => element,
                // only an unbounded loop may end on a truncated element
                Err(DecodeError::OutOfBounds { .. }) if count.is_none() => {
                    trace!(field = %self.name, index = items.len(), "dropped partial element");
                    break;
                }
                Err(err) => return Err(err),
            };

            let (record, used) = element;
            if used == 0 {
                // nothing advances the cursor, so later elements would be identical
                if count.is_some() {
                    items.push(Value::Map(record));
                }
                trace!(field = %self.name, index = items.len(), "empty element ends loop");
                break;
            }

            items.push(Value::Map(record));
            offset += used;
        }

        debug!(field = %self.name, elements = items.len(), bytes = offset, "loop decoded");
        Ok((Value::List(items), offset))
    }

    fn prepare_encode(&self, ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        let Repetitions::Field(field) = &self.opts.repetitions else {
            return Ok(());
        };
        let Some(items) = ctx.fields.get(&self.name).and_then(Value::as_list) else {
            return Ok(());
        };

        let count = Value::from(items.len());
        ctx.write_back(field, count);
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let items = value
            .as_list()
            .ok_or_else(|| invalid_value(&self.name, "list", value))?;

        let mut out = Vec::new();
        let repetitions = match &self.opts.repetitions {
            Repetitions::Prefixed(prefix) => {
                out = write_uint(items.len() as u64, prefix.size, ctx.endian_or(prefix.endian), &self.name)?;
                Some(items.len())
            }
            Repetitions::Field(_) | Repetitions::Fixed(_) => Some(items.len()),
            Repetitions::Unbounded => None,
        };

        let source = match &self.opts.context_field {
            Some(cf) => Some(
                ctx.lookup(&cf.field)
                    .ok_or_else(|| EncodeError::MissingField(cf.field.to_string()))?,
            ),
            None => None,
        };

        for (index, item) in items.iter().enumerate() {
            let element = format!("{}[{index}]", self.name);
            let record = item
                .as_map()
                .ok_or_else(|| invalid_value(&element, "map", item))?;

            let iteration = self.iteration(index, repetitions, source.as_ref());
            let bytes = self
                .opts
                .schema
                .encode_scoped(record.clone(), Some(iteration), ctx.endian)?;
            out.extend_from_slice(&bytes);
        }

        Ok(out)
    }

    fn make_struct(&self) -> Value {
        let element = Value::Map(self.opts.schema.make_template());
        let count = match self.opts.repetitions {
            Repetitions::Fixed(count) => count,
            _ => 1,
        };
        Value::List(vec![element; count])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::{Binary, BinaryOptions},
        field::Endian,
        numeric::{int8, uint8, uint16, uint32},
        record,
        value::Record,
    };

    fn bytes_loop(repetitions: Repetitions) -> Loop {
        Loop::new(
            "items",
            LoopOptions {
                schema: Schema::new().field(uint8("v")),
                repetitions,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn values(list: &Value) -> Vec<Value> {
        list.as_list()
            .unwrap()
            .iter()
            .map(|item| item.as_map().unwrap()["v"].clone())
            .collect()
    }

    #[test]
    fn test_loop_prefixed() {
        let schema = Schema::new().field(bytes_loop(Repetitions::Prefixed(Prefix::new(2))));
        let data = [0x00, 0x04, 0x01, 0x02, 0x03, 0x04];

        let parsed = schema.parse(&data).unwrap();
        assert_eq!(
            values(&parsed["items"]),
            vec![Value::UInt(1), Value::UInt(2), Value::UInt(3), Value::UInt(4)]
        );
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_loop_prefixed_little_endian() {
        let schema = Schema::new().field(bytes_loop(Repetitions::Prefixed(Prefix::with_endian(
            2,
            Endian::Little,
        ))));
        let data = [0x02, 0x00, 0x0a, 0x0b];

        let parsed = schema.parse(&data).unwrap();
        assert_eq!(values(&parsed["items"]), vec![Value::UInt(10), Value::UInt(11)]);
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_loop_field() {
        let schema = Schema::new()
            .field(uint8("count"))
            .field(bytes_loop(Repetitions::Field("count".into())))
            .field(uint8("tail"));

        let parsed = schema.parse(&[0x02, 0x0a, 0x0b, 0xff]).unwrap();
        assert_eq!(values(&parsed["items"]), vec![Value::UInt(10), Value::UInt(11)]);
        assert_eq!(parsed["tail"], Value::UInt(0xff));

        let mut edited = parsed.clone();
        edited.insert(
            "items".into(),
            Value::List(vec![Value::Map(record! { "v" => 1u8 })]),
        );
        assert_eq!(schema.encode(&edited).unwrap(), vec![0x01, 0x01, 0xff]);
    }

    #[test]
    fn test_loop_fixed() {
        let schema = Schema::new()
            .field(bytes_loop(Repetitions::Fixed(2)))
            .field(uint8("tail"));

        let parsed = schema.parse(&[1, 2, 3]).unwrap();
        assert_eq!(values(&parsed["items"]), vec![Value::UInt(1), Value::UInt(2)]);
        assert_eq!(parsed["tail"], Value::UInt(3));
        assert_eq!(schema.make_template()["items"].as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_loop_unbounded_whole_elements() {
        let schema = Schema::new().field(
            Loop::new(
                "items",
                LoopOptions {
                    schema: Schema::new().field(uint16("v")),
                    ..Default::default()
                },
            )
            .unwrap(),
        );

        let exact = schema.parse(&[0, 1, 0, 2, 0, 3]).unwrap();
        assert_eq!(exact["items"].as_list().unwrap().len(), 3);

        let partial = schema.parse(&[0, 1, 0, 2, 0]).unwrap();
        assert_eq!(
            values(&partial["items"]),
            vec![Value::UInt(1), Value::UInt(2)]
        );
    }

    #[test]
    fn test_counted_loop_truncated_element() {
        let schema = Schema::new()
            .field(uint8("count"))
            .field(
                Loop::new(
                    "items",
                    LoopOptions {
                        schema: Schema::new().field(uint16("v")),
                        repetitions: Repetitions::Field("count".into()),
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
            .field(uint8("tail"));

        // the second element is cut short; its byte must not become `tail`
        let err = schema.parse(&[0x02, 0x00, 0x01, 0x99]).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { .. }));

        let parsed = schema.parse(&[0x02, 0x00, 0x01, 0x00, 0x02, 0x99]).unwrap();
        assert_eq!(values(&parsed["items"]), vec![Value::UInt(1), Value::UInt(2)]);
        assert_eq!(parsed["tail"], Value::UInt(0x99));
    }

    #[test]
    fn test_counted_loop_of_empty_elements() {
        let schema = Schema::new()
            .field(uint32("count"))
            .field(
                Loop::new(
                    "items",
                    LoopOptions {
                        schema: Schema::new(),
                        repetitions: Repetitions::Field("count".into()),
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
            .field(uint8("tail"));

        let parsed = schema.parse(&[0xff, 0xff, 0xff, 0xff, 0x07]).unwrap();
        assert_eq!(parsed["items"], Value::List(vec![Value::Map(Record::new())]));
        assert_eq!(parsed["tail"], Value::UInt(7));
    }

    #[test]
    fn test_loop_stops_at_buffer_end() {
        let schema = Schema::new().field(bytes_loop(Repetitions::Fixed(5)));
        let parsed = schema.parse(&[1, 2]).unwrap();
        assert_eq!(values(&parsed["items"]), vec![Value::UInt(1), Value::UInt(2)]);
    }

    #[test]
    fn test_loop_index_and_repetitions() {
        let element = Schema::new()
            .field(
                Binary::new(
                    "data",
                    BinaryOptions {
                        size_field: Some(FieldRef::Index),
                        ..Default::default()
                    },
                )
                .unwrap(),
            )
            .field(
                Binary::new(
                    "pad",
                    BinaryOptions {
                        size_field: Some(FieldRef::Repetitions),
                        ..Default::default()
                    },
                )
                .unwrap(),
            );
        let schema = Schema::new().field(
            Loop::new(
                "items",
                LoopOptions {
                    schema: element,
                    repetitions: Repetitions::Fixed(2),
                    ..Default::default()
                },
            )
            .unwrap(),
        );

        let data = [0xa0, 0xa1, 0xb0, 0xc0, 0xc1];
        let parsed = schema.parse(&data).unwrap();
        let items = parsed["items"].as_list().unwrap();
        assert_eq!(
            items[0],
            Value::Map(record! { "data" => Vec::<u8>::new(), "pad" => vec![0xa0u8, 0xa1] })
        );
        assert_eq!(
            items[1],
            Value::Map(record! { "data" => vec![0xb0u8], "pad" => vec![0xc0u8, 0xc1] })
        );
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_loop_context_field() {
        let element = Schema::new().field(
            Binary::new(
                "data",
                BinaryOptions {
                    size_field: Some(FieldRef::Context),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let schema = Schema::new()
            .field(uint8("first"))
            .field(uint8("second"))
            .field(
                Loop::new(
                    "chunks",
                    LoopOptions {
                        schema: element,
                        repetitions: Repetitions::Fixed(2),
                        context_field: Some(ContextField::new("first", |value, index| {
                            Value::from(value.as_u64().unwrap_or(0) as usize + index)
                        })),
                    },
                )
                .unwrap(),
            );

        let data = [0x01, 0x00, 0xaa, 0xbb, 0xcc];
        let parsed = schema.parse(&data).unwrap();
        let chunks = parsed["chunks"].as_list().unwrap();
        assert_eq!(chunks[0], Value::Map(record! { "data" => vec![0xaau8] }));
        assert_eq!(chunks[1], Value::Map(record! { "data" => vec![0xbbu8, 0xcc] }));
        assert_eq!(schema.encode(&parsed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_context_element_of() {
        let cf = ContextField::element_of("sizes");
        let sizes = Value::List(vec![Value::UInt(3), Value::UInt(4)]);
        assert_eq!(cf.derive(&sizes, 1), Value::UInt(4));
        assert_eq!(cf.derive(&sizes, 2), Value::Null);
        assert_eq!(cf.derive(&Value::UInt(7), 5), Value::UInt(7));
    }

    #[test]
    fn test_loop_nested_errors_propagate() {
        let schema = Schema::new().field(
            Loop::new(
                "items",
                LoopOptions {
                    schema: Schema::new().field(
                        Binary::new(
                            "data",
                            BinaryOptions {
                                size_field: Some("missing".into()),
                                ..Default::default()
                            },
                        )
                        .unwrap(),
                    ),
                    ..Default::default()
                },
            )
            .unwrap(),
        );

        assert!(matches!(
            schema.parse(&[1, 2]),
            Err(DecodeError::MissingField { .. })
        ));
    }

    #[test]
    fn test_loop_encode_wrong_shape() {
        let schema = Schema::new().field(bytes_loop(Repetitions::Unbounded));
        let rec = record! { "items" => vec![Value::from(1u8)] };
        assert_eq!(
            schema.encode(&rec),
            Err(EncodeError::InvalidValue {
                field: "items[0]".into(),
                expected: "map",
                found: "unsigned integer".into()
            })
        );

        let mut empty = Record::new();
        empty.insert("items".into(), Value::List(Vec::new()));
        let schema = Schema::new().field(
            Loop::new(
                "items",
                LoopOptions {
                    schema: Schema::new().field(int8("v")),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        assert_eq!(schema.encode(&empty).unwrap(), Vec::<u8>::new());
    }
}
