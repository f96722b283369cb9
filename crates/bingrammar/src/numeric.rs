//! Fixed-width numbers: unsigned and two's complement integers of 1 to 4 bytes,
//! and IEEE 754 floats of 4 or 8 bytes.

use crate::{
    bits::{read_uint, sign_extend, take, to_twos_complement, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, Endian, ParseContext, check_integer_size, invalid_value},
    transform::{Transform, backward, forward},
    value::Value,
};

/// Options shared by [`UInt`] and [`Int`].
#[derive(Debug, Clone)]
pub struct IntegerOptions {
    /// Width in bytes (1..=4).
    pub size: usize,
    /// Overrides the inherited byte order.
    pub endian: Option<Endian>,
    pub transform: Option<Transform>,
}

impl Default for IntegerOptions {
    fn default() -> Self {
        IntegerOptions {
            size: 1,
            endian: None,
            transform: None,
        }
    }
}

/// Unsigned integer.
#[derive(Debug, Clone)]
pub struct UInt {
    name: String,
    opts: IntegerOptions,
}

impl UInt {
    pub fn new(name: impl Into<String>, opts: IntegerOptions) -> Result<Self, SchemaError> {
        check_integer_size(opts.size)?;
        Ok(UInt {
            name: name.into(),
            opts,
        })
    }

    fn sized(name: impl Into<String>, size: usize, endian: Option<Endian>) -> Self {
        UInt {
            name: name.into(),
            opts: IntegerOptions {
                size,
                endian,
                transform: None,
            },
        }
    }

    /// Attaches a value transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.opts.transform = Some(transform);
        self
    }
}

impl Codec for UInt {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let raw = read_uint(data, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)?;
        let value = forward(self.opts.transform.as_ref(), Value::UInt(raw));
        Ok((value, self.opts.size))
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        let raw = match (value.as_u64(), value.as_i64()) {
            (Some(v), _) => v,
            (None, Some(v)) => {
                return Err(EncodeError::OutOfRange {
                    field: self.name.clone(),
                    value: v.to_string(),
                    bits: self.opts.size * 8,
                });
            }
            _ => return Err(invalid_value(&self.name, "unsigned integer", &value)),
        };

        write_uint(raw, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)
    }

    fn make_struct(&self) -> Value {
        Value::UInt(0)
    }
}

/// Two's complement signed integer.
#[derive(Debug, Clone)]
pub struct Int {
    name: String,
    opts: IntegerOptions,
}

impl Int {
    pub fn new(name: impl Into<String>, opts: IntegerOptions) -> Result<Self, SchemaError> {
        check_integer_size(opts.size)?;
        Ok(Int {
            name: name.into(),
            opts,
        })
    }

    fn sized(name: impl Into<String>, size: usize, endian: Option<Endian>) -> Self {
        Int {
            name: name.into(),
            opts: IntegerOptions {
                size,
                endian,
                transform: None,
            },
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.opts.transform = Some(transform);
        self
    }
}

impl Codec for Int {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let raw = read_uint(data, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)?;
        let signed = sign_extend(raw, self.opts.size * 8);
        let value = forward(self.opts.transform.as_ref(), Value::Int(signed));
        Ok((value, self.opts.size))
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        let signed = match (value.as_i64(), value.as_u64()) {
            (Some(v), _) => v,
            (None, Some(v)) => {
                return Err(EncodeError::OutOfRange {
                    field: self.name.clone(),
                    value: v.to_string(),
                    bits: self.opts.size * 8,
                });
            }
            _ => return Err(invalid_value(&self.name, "signed integer", &value)),
        };

        let raw = to_twos_complement(signed, self.opts.size * 8, &self.name)?;
        write_uint(raw, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)
    }

    fn make_struct(&self) -> Value {
        Value::Int(0)
    }
}

/// Options of [`Float`].
#[derive(Debug, Clone)]
pub struct FloatOptions {
    /// 4 for single, 8 for double precision.
    pub size: usize,
    pub endian: Option<Endian>,
    pub transform: Option<Transform>,
}

impl Default for FloatOptions {
    fn default() -> Self {
        FloatOptions {
            size: 4,
            endian: None,
            transform: None,
        }
    }
}

/// IEEE 754 floating point number.
#[derive(Debug, Clone)]
pub struct Float {
    name: String,
    opts: FloatOptions,
}

impl Float {
    pub fn new(name: impl Into<String>, opts: FloatOptions) -> Result<Self, SchemaError> {
        if opts.size != 4 && opts.size != 8 {
            return Err(SchemaError::InvalidFloatSize(opts.size));
        }
        Ok(Float {
            name: name.into(),
            opts,
        })
    }
}

impl Codec for Float {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let bytes = take(data, self.opts.size, &self.name)?;
        let endian = ctx.endian_or(self.opts.endian);

        let value = match (self.opts.size, endian) {
            (4, Endian::Big) => f64::from(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            (4, Endian::Little) => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            (_, endian) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                match endian {
                    Endian::Big => f64::from_be_bytes(raw),
                    Endian::Little => f64::from_le_bytes(raw),
                }
            }
        };

        Ok((forward(self.opts.transform.as_ref(), Value::Float(value)), self.opts.size))
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        let v = value
            .as_f64()
            .ok_or_else(|| invalid_value(&self.name, "number", &value))?;

        let out = match (self.opts.size, ctx.endian_or(self.opts.endian)) {
            (4, Endian::Big) => (v as f32).to_be_bytes().to_vec(),
            (4, Endian::Little) => (v as f32).to_le_bytes().to_vec(),
            (_, Endian::Big) => v.to_be_bytes().to_vec(),
            (_, Endian::Little) => v.to_le_bytes().to_vec(),
        };

        Ok(out)
    }

    fn make_struct(&self) -> Value {
        Value::Float(0.0)
    }
}

/// 8-bit unsigned integer.
pub fn uint8(name: impl Into<String>) -> UInt {
    UInt::sized(name, 1, None)
}

/// 16-bit unsigned integer in the inherited byte order.
pub fn uint16(name: impl Into<String>) -> UInt {
    UInt::sized(name, 2, None)
}

/// 32-bit unsigned integer in the inherited byte order.
pub fn uint32(name: impl Into<String>) -> UInt {
    UInt::sized(name, 4, None)
}

pub fn int8(name: impl Into<String>) -> Int {
    Int::sized(name, 1, None)
}

pub fn int16(name: impl Into<String>) -> Int {
    Int::sized(name, 2, None)
}

pub fn int32(name: impl Into<String>) -> Int {
    Int::sized(name, 4, None)
}

/// Single precision float in the inherited byte order.
pub fn float(name: impl Into<String>) -> Float {
    Float {
        name: name.into(),
        opts: FloatOptions::default(),
    }
}

/// Double precision float in the inherited byte order.
pub fn double(name: impl Into<String>) -> Float {
    Float {
        name: name.into(),
        opts: FloatOptions {
            size: 8,
            ..Default::default()
        },
    }
}
