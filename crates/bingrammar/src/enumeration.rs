//! Integer codes mapped to symbolic names.

use indexmap::IndexMap;

use crate::{
    bits::{read_uint, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, Endian, ParseContext, check_integer_size, invalid_value},
    value::Value,
};

/// Options of [`Enumeration`].
#[derive(Debug, Clone)]
pub struct EnumOptions {
    /// Width in bytes (1..=4).
    pub size: usize,
    /// Symbol to code table. The first symbol with a matching code wins.
    pub choices: IndexMap<String, u64>,
    pub endian: Option<Endian>,
}

impl Default for EnumOptions {
    fn default() -> Self {
        EnumOptions {
            size: 1,
            choices: IndexMap::new(),
            endian: None,
        }
    }
}

/// Builds a choice table from `(symbol, code)` pairs.
pub fn choices<I, S>(pairs: I) -> IndexMap<String, u64>
where
    I: IntoIterator<Item = (S, u64)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Symbol of the first choice equal to `code`.
pub(crate) fn lookup_symbol(choices: &IndexMap<String, u64>, code: u64) -> Value {
    choices
        .iter()
        .find(|&(_, v)| *v == code)
        .map_or(Value::Null, |(k, _)| Value::Text(k.clone()))
}

/// Code of `value`: a known symbol, or a raw integer code.
pub(crate) fn lookup_code(
    choices: &IndexMap<String, u64>,
    value: &Value,
    field: &str,
) -> Result<u64, EncodeError> {
    match value {
        Value::Text(symbol) => choices
            .get(symbol)
            .copied()
            .ok_or_else(|| EncodeError::UnknownChoice {
                field: field.to_string(),
                choice: symbol.clone(),
            }),
        // an unknown code decodes to null, which has no code to encode back to
        Value::Null => Err(EncodeError::UnknownChoice {
            field: field.to_string(),
            choice: value.to_string(),
        }),
        other => other
            .as_u64()
            .ok_or_else(|| invalid_value(field, "choice", other)),
    }
}

/// Enumeration field. Unknown codes decode to [`Value::Null`].
#[derive(Debug, Clone)]
pub struct Enumeration {
    name: String,
    opts: EnumOptions,
}

impl Enumeration {
    pub fn new(name: impl Into<String>, opts: EnumOptions) -> Result<Self, SchemaError> {
        check_integer_size(opts.size)?;
        Ok(Enumeration {
            name: name.into(),
            opts,
        })
    }
}

impl Codec for Enumeration {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let code = read_uint(data, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)?;
        let value = lookup_symbol(&self.opts.choices, code);
        if value.is_null() {
            debug!(field = %self.name, code, "no matching choice");
        }
        Ok((value, self.opts.size))
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let code = lookup_code(&self.opts.choices, value, &self.name)?;
        write_uint(code, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)
    }

    fn make_struct(&self) -> Value {
        self.opts
            .choices
            .keys()
            .next()
            .map_or(Value::Null, |k| Value::Text(k.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Schema, record};

    fn colors(size: usize) -> Schema {
        Schema::new().field(
            Enumeration::new(
                "color",
                EnumOptions {
                    size,
                    choices: choices([("red", 1), ("green", 2), ("also_red", 1), ("blue", 0x0300)]),
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_enum_parse() {
        let schema = colors(1);
        assert_eq!(schema.parse(&[0x01]).unwrap()["color"], Value::Text("red".into()));
        assert_eq!(schema.parse(&[0x02]).unwrap()["color"], Value::Text("green".into()));
        assert_eq!(schema.parse(&[0x07]).unwrap()["color"], Value::Null);
    }

    #[test]
    fn test_enum_endianness() {
        let schema = colors(2);
        assert_eq!(schema.parse(&[0x03, 0x00]).unwrap()["color"], Value::Text("blue".into()));
        assert_eq!(
            schema.parse_with(&[0x00, 0x03], Endian::Little).unwrap()["color"],
            Value::Text("blue".into())
        );
    }

    #[test]
    fn test_enum_encode() {
        let schema = colors(2);
        assert_eq!(schema.encode(&record! { "color" => "blue" }).unwrap(), vec![0x03, 0x00]);
        assert_eq!(schema.encode(&record! { "color" => "also_red" }).unwrap(), vec![0x00, 0x01]);
        assert_eq!(schema.encode(&record! { "color" => 7u8 }).unwrap(), vec![0x00, 0x07]);
    }

    #[test]
    fn test_enum_unknown_choice() {
        let schema = colors(1);
        assert_eq!(
            schema.encode(&record! { "color" => "purple" }),
            Err(EncodeError::UnknownChoice {
                field: "color".into(),
                choice: "purple".into()
            })
        );
    }

    #[test]
    fn test_enum_unknown_code_not_reencoded() {
        let schema = colors(1);
        let parsed = schema.parse(&[0x09]).unwrap();
        assert_eq!(parsed["color"], Value::Null);
        assert_eq!(
            schema.encode(&parsed),
            Err(EncodeError::UnknownChoice {
                field: "color".into(),
                choice: "null".into()
            })
        );
    }

    #[test]
    fn test_enum_template() {
        assert_eq!(colors(1).make_template()["color"], Value::Text("red".into()));
    }

    #[test]
    fn test_enum_size_limits() {
        let opts = EnumOptions {
            size: 0,
            ..Default::default()
        };
        assert_eq!(
            Enumeration::new("e", opts).unwrap_err(),
            SchemaError::InvalidIntegerSize(0)
        );
    }
}
