//! Raw byte runs and packed BCD numbers.

use crate::{
    bits::{read_uint, take, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, FieldRef, ParseContext, Prefix, check_integer_size, invalid_value},
    transform::{Transform, backward, forward},
    value::Value,
};

/// Options of [`Binary`].
///
/// The payload size is taken from the first source that is configured:
/// `size_prefix`, then `size_field`, then `size`. With none of them the
/// field consumes the rest of the buffer.
#[derive(Debug, Clone, Default)]
pub struct BinaryOptions {
    /// Fixed payload size. Shorter payloads are zero padded on encode, longer
    /// ones truncated.
    pub size: Option<usize>,
    /// Inline length prefix ahead of the payload.
    pub size_prefix: Option<Prefix>,
    /// Earlier sibling or loop metadata holding the payload size.
    pub size_field: Option<FieldRef>,
    /// Maps the `size_field` value to a byte count; its reverse maps the
    /// payload length back on encode.
    pub size_field_transform: Option<Transform>,
    pub transform: Option<Transform>,
}

/// Raw bytes.
#[derive(Debug, Clone)]
pub struct Binary {
    name: String,
    opts: BinaryOptions,
}

impl Binary {
    pub fn new(name: impl Into<String>, opts: BinaryOptions) -> Result<Self, SchemaError> {
        if let Some(prefix) = &opts.size_prefix {
            check_integer_size(prefix.size)?;
        }
        Ok(Binary {
            name: name.into(),
            opts,
        })
    }

    /// Serializes the tree value without the length prefix or fixed-size padding.
    fn payload(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        value
            .as_bytes()
            .map(|b| b.into_owned())
            .ok_or_else(|| invalid_value(&self.name, "bytes", &value))
    }
}

impl Codec for Binary {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let (size, offset) = match (&self.opts.size_prefix, &self.opts.size_field, self.opts.size) {
            (Some(prefix), _, _) => {
                let size = read_uint(data, prefix.size, ctx.endian_or(prefix.endian), &self.name)?;
                (size as usize, prefix.size)
            }
            (None, Some(field), _) => (
                ctx.size_of(field, self.opts.size_field_transform.as_ref(), &self.name)?,
                0,
            ),
            (None, None, Some(size)) => (size, 0),
            (None, None, None) => (data.len(), 0),
        };

        let bytes = take(data.get(offset..).unwrap_or_default(), size, &self.name)?;
        let value = forward(self.opts.transform.as_ref(), Value::Bytes(bytes.to_vec()));

        Ok((value, offset + size))
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
        let len = self.payload(value)?.len();
        let size = backward(self.opts.size_field_transform.as_ref(), Value::from(len));

        trace!(field = %self.name, size_field = %field, len, "derived size");
        ctx.write_back(field, size);
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let mut payload = self.payload(value)?;

        match (&self.opts.size_prefix, &self.opts.size_field, self.opts.size) {
            (Some(prefix), _, _) => {
                let mut out = write_uint(
                    payload.len() as u64,
                    prefix.size,
                    ctx.endian_or(prefix.endian),
                    &self.name,
                )?;
                out.append(&mut payload);
                Ok(out)
            }
            (None, Some(_), _) => Ok(payload),
            (None, None, Some(size)) => {
                payload.resize(size, 0);
                Ok(payload)
            }
            (None, None, None) => Ok(payload),
        }
    }

    fn make_struct(&self) -> Value {
        let len = match (&self.opts.size_prefix, &self.opts.size_field) {
            (None, None) => self.opts.size.unwrap_or(0),
            _ => 0,
        };
        forward(self.opts.transform.as_ref(), Value::Bytes(vec![0; len]))
    }
}

/// Packed BCD transform: every byte holds two decimal digits, high nibble first.
///
/// With a fixed `size` the reverse pads the number with leading zeros to
/// `2 * size` digits; otherwise to an even digit count.
pub fn bcd_transform(size: Option<usize>) -> Transform {
    Transform::new(
        |value| {
            let number = value.as_bytes().map(|bytes| {
                bytes.iter().fold(0u64, |acc, b| {
                    acc.wrapping_mul(100)
                        .wrapping_add(u64::from(b >> 4) * 10 + u64::from(b & 0x0f))
                })
            });
            number.map(Value::UInt).unwrap_or(value)
        },
        move |value| {
            let Some(number) = value.as_u64() else {
                return value;
            };

            let digits = number.to_string();
            let width = match size {
                Some(size) => (2 * size).max(digits.len() + digits.len() % 2),
                None => digits.len() + digits.len() % 2,
            };
            let padded = format!("{digits:0>width$}");

            Value::Bytes(
                padded
                    .as_bytes()
                    .chunks(2)
                    .map(|pair| ((pair[0] - b'0') << 4) | (pair[1] - b'0'))
                    .collect(),
            )
        },
    )
}

/// Fixed-size packed BCD number.
pub fn bcd(name: impl Into<String>, size: usize) -> Binary {
    Binary {
        name: name.into(),
        opts: BinaryOptions {
            size: Some(size),
            transform: Some(bcd_transform(Some(size))),
            ..Default::default()
        },
    }
}
