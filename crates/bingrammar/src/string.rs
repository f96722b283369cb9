//! Text fields: fixed size, length prefixed, sized by a sibling, or null
//! terminated, plus the ASCII numeral variants built on top of them.

use crate::{
    bits::{read_uint, take, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, FieldRef, ParseContext, Prefix, check_integer_size, invalid_value},
    text::{TextEncoding, until_nul},
    transform::{Transform, backward, forward},
    value::Value,
};

/// Options of [`BinString`]. At least one of `size`, `size_prefix`,
/// `size_field` or `null_terminated` must be set.
#[derive(Debug, Clone, Default)]
pub struct StringOptions {
    /// Fixed size in bytes, 0 when the size comes from elsewhere.
    pub size: usize,
    pub encoding: TextEncoding,
    /// Within a size window: the text ends at the first zero byte. Without one:
    /// scan for the terminator, which is consumed but not part of the text.
    pub null_terminated: bool,
    pub size_prefix: Option<Prefix>,
    pub size_field: Option<FieldRef>,
    pub size_field_transform: Option<Transform>,
    pub transform: Option<Transform>,
}

/// A string field.
#[derive(Debug, Clone)]
pub struct BinString {
    name: String,
    opts: StringOptions,
    template: Value,
}

impl BinString {
    pub fn new(name: impl Into<String>, opts: StringOptions) -> Result<Self, SchemaError> {
        let name = name.into();

        if opts.size == 0
            && !opts.null_terminated
            && opts.size_field.is_none()
            && opts.size_prefix.is_none()
        {
            return Err(SchemaError::UnsizedString(name));
        }
        if let Some(prefix) = &opts.size_prefix {
            check_integer_size(prefix.size)?;
        }

        let template = forward(opts.transform.as_ref(), Value::Text(String::new()));
        Ok(BinString {
            name,
            opts,
            template,
        })
    }

    fn decode_text(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let text = self
            .opts
            .encoding
            .decode(bytes)
            .ok_or_else(|| DecodeError::InvalidText {
                field: self.name.clone(),
                encoding: self.opts.encoding,
            })?;
        Ok(forward(self.opts.transform.as_ref(), Value::Text(text)))
    }

    /// Encoded text without prefix, terminator or padding.
    fn content(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        let text = value
            .as_str()
            .ok_or_else(|| invalid_value(&self.name, "text", &value))?;

        self.opts
            .encoding
            .encode(text)
            .ok_or_else(|| EncodeError::InvalidText {
                field: self.name.clone(),
                encoding: self.opts.encoding,
            })
    }
}

impl Codec for BinString {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let (size, offset) = match (&self.opts.size_prefix, &self.opts.size_field) {
            (Some(prefix), _) => {
                let size = read_uint(data, prefix.size, ctx.endian_or(prefix.endian), &self.name)?;
                (size as usize, prefix.size)
            }
            (None, Some(field)) => (
                ctx.size_of(field, self.opts.size_field_transform.as_ref(), &self.name)?,
                0,
            ),
            (None, None) => (self.opts.size, 0),
        };

        if size > 0 {
            let window = take(data.get(offset..).unwrap_or_default(), size, &self.name)?;
            let content = if self.opts.null_terminated {
                until_nul(window)
            } else {
                window
            };
            return Ok((self.decode_text(content)?, offset + size));
        }

        let unbounded = self.opts.size_prefix.is_none() && self.opts.size_field.is_none();
        if self.opts.null_terminated && unbounded {
            let content = until_nul(data);
            let consumed = (content.len() + 1).min(data.len());
            return Ok((self.decode_text(content)?, consumed));
        }

        Ok((self.decode_text(&[])?, offset))
    }

    fn prepare_encode(&self, ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        let Some(field) = &self.opts.size_field else {
            return Ok(());
        };
        if self.opts.size_prefix.is_some() {
            return Ok(());
        }
        let Some(value) = ctx.fields.get(&self.name) else {
            return Ok(());
        };

        let len = self.content(value)?.len() + usize::from(self.opts.null_terminated);
        let size = backward(self.opts.size_field_transform.as_ref(), Value::from(len));
        ctx.write_back(field, size);
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let mut content = self.content(value)?;
        let terminator = usize::from(self.opts.null_terminated);

        if let Some(prefix) = &self.opts.size_prefix {
            let len = (content.len() + terminator) as u64;
            let mut out = write_uint(len, prefix.size, ctx.endian_or(prefix.endian), &self.name)?;
            out.append(&mut content);
            out.resize(out.len() + terminator, 0);
            return Ok(out);
        }

        if self.opts.size_field.is_none() && self.opts.size > 0 {
            content.truncate(self.opts.size);
            if self.opts.null_terminated {
                content.resize(self.opts.size, 0);
            }
            return Ok(content);
        }

        content.resize(content.len() + terminator, 0);
        Ok(content)
    }

    fn make_struct(&self) -> Value {
        self.template.clone()
    }
}

/// Wraps `outer` around `inner`: `inner` runs first on decode and last on encode.
fn chain(inner: Transform, outer: Option<Transform>) -> Transform {
    match outer {
        None => inner,
        Some(outer) => {
            let (fwd_inner, fwd_outer) = (inner.clone(), outer.clone());
            Transform::new(
                move |v| fwd_outer.apply(fwd_inner.apply(v)),
                move |v| inner.reverse(outer.reverse(v)),
            )
        }
    }
}

/// Leading numeral of `text` after whitespace, as C's `strtol` reads it.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

fn numeral_to_text(value: Value) -> Value {
    match value {
        Value::UInt(v) => Value::Text(v.to_string()),
        Value::Int(v) => Value::Text(v.to_string()),
        Value::Float(v) => Value::Text(v.to_string()),
        other => other,
    }
}

/// Human readable integer. Unparsable text decodes to [`Value::Null`].
pub fn ascii_integer(name: impl Into<String>, mut opts: StringOptions) -> Result<BinString, SchemaError> {
    let numeral = Transform::new(
        |v| match v.as_str().and_then(leading_integer) {
            Some(n) => Value::Int(n),
            None => Value::Null,
        },
        numeral_to_text,
    );
    opts.transform = Some(chain(numeral, opts.transform.take()));

    let mut field = BinString::new(name, opts)?;
    field.template = Value::Int(0);
    Ok(field)
}

/// Human readable floating point number. Unparsable text decodes to [`Value::Null`].
pub fn ascii_float(name: impl Into<String>, mut opts: StringOptions) -> Result<BinString, SchemaError> {
    let numeral = Transform::new(
        |v| match v.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(n) => Value::Float(n),
            None => Value::Null,
        },
        numeral_to_text,
    );
    opts.transform = Some(chain(numeral, opts.transform.take()));

    let mut field = BinString::new(name, opts)?;
    field.template = Value::Float(0.0);
    Ok(field)
}
