//! Byte-granular flag sets.

use indexmap::IndexMap;

use crate::{
    bits::{read_uint, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, Endian, ParseContext, check_integer_size, invalid_value},
    value::Value,
};

/// Options of [`BitMask`].
#[derive(Debug, Clone)]
pub struct BitMaskOptions {
    /// Width in bytes (1..=4).
    pub size: usize,
    /// Flag name to bit position. Position 0 is the most significant bit.
    pub bitfield: IndexMap<String, u32>,
    pub endian: Option<Endian>,
}

impl Default for BitMaskOptions {
    fn default() -> Self {
        BitMaskOptions {
            size: 1,
            bitfield: IndexMap::new(),
            endian: None,
        }
    }
}

/// Builds a bitfield from `(flag, position)` pairs.
pub fn bitfield<I, S>(pairs: I) -> IndexMap<String, u32>
where
    I: IntoIterator<Item = (S, u32)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Checks every position of `bitfield` against a `bits` wide mask.
pub(crate) fn check_bitfield(name: &str, bitfield: &IndexMap<String, u32>, bits: usize) -> Result<(), SchemaError> {
    for (flag, &position) in bitfield {
        if position as usize >= bits {
            return Err(SchemaError::InvalidBitPosition {
                name: name.to_string(),
                flag: flag.clone(),
                position,
                bits,
            });
        }
    }
    Ok(())
}

/// Names of the flags set in `raw`, in bitfield order.
pub(crate) fn flags_of(bitfield: &IndexMap<String, u32>, raw: u64, bits: usize) -> Value {
    Value::List(
        bitfield
            .iter()
            .filter(|&(_, &pos)| raw & (1u64 << (bits - pos as usize - 1)) != 0)
            .map(|(flag, _)| Value::Text(flag.clone()))
            .collect(),
    )
}

/// Raw mask with one bit set per flag named in `value`.
pub(crate) fn mask_of(
    bitfield: &IndexMap<String, u32>,
    value: &Value,
    bits: usize,
    field: &str,
) -> Result<u64, EncodeError> {
    let flags = value
        .as_list()
        .ok_or_else(|| invalid_value(field, "list of flags", value))?;

    flags.iter().try_fold(0u64, |acc, flag| {
        let symbol = flag
            .as_str()
            .ok_or_else(|| invalid_value(field, "flag name", flag))?;
        let position = bitfield
            .get(symbol)
            .ok_or_else(|| EncodeError::UnknownChoice {
                field: field.to_string(),
                choice: symbol.to_string(),
            })?;
        Ok(acc | 1u64 << (bits - *position as usize - 1))
    })
}

/// Flag set stored in 1 to 4 bytes. Decodes to the list of set flag names.
#[derive(Debug, Clone)]
pub struct BitMask {
    name: String,
    opts: BitMaskOptions,
}

impl BitMask {
    pub fn new(name: impl Into<String>, opts: BitMaskOptions) -> Result<Self, SchemaError> {
        let name = name.into();
        check_integer_size(opts.size)?;
        check_bitfield(&name, &opts.bitfield, opts.size * 8)?;
        Ok(BitMask { name, opts })
    }
}

impl Codec for BitMask {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let raw = read_uint(data, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)?;
        Ok((flags_of(&self.opts.bitfield, raw, self.opts.size * 8), self.opts.size))
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let raw = mask_of(&self.opts.bitfield, value, self.opts.size * 8, &self.name)?;
        write_uint(raw, self.opts.size, ctx.endian_or(self.opts.endian), &self.name)
    }

    fn make_struct(&self) -> Value {
        Value::List(Vec::new())
    }
}
