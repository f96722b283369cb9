//! Checksummed groups of fields.
//!
//! A [`Crc`] wraps a nested schema followed by a big-endian checksum over the
//! bytes of that schema. On decode the wrapped fields land in the enclosing
//! record as if they were never wrapped, and the CRC field itself holds whether
//! the checksum matched. On encode the wrapped fields may be given either at
//! the top level or as a map under the CRC field's name. Top-level values and
//! sizes derived by siblings win over the nested map.

use std::{fmt, sync::Arc};

use crate::{
    bits::{mask, read_uint, take, write_uint},
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, Endian, ParseContext},
    schema::Schema,
    value::Value,
};

const CRC_32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
const CRC_24: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_24_OPENPGP);
const CRC_16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_ARC);
const CRC_16_CCITT: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
const CRC_16_MODBUS: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);
const CRC_16_KERMIT: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_KERMIT);
const CRC_16_XMODEM: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
const CRC_8: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);
const CRC_8_1WIRE: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_MAXIM_DOW);

/// Supported checksum functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Algorithm {
    /// CRC-32 (ISO-HDLC, as used by zlib and PNG).
    Crc32,
    /// CRC-24 (OpenPGP).
    Crc24,
    /// CRC-16 (ARC).
    Crc16,
    /// CRC-16 CCITT-FALSE (IBM-3740).
    Crc16Ccitt,
    Crc16Modbus,
    Crc16Kermit,
    Crc16Xmodem,
    /// CRC-8 (SMBus).
    Crc8,
    /// CRC-8 Dallas/Maxim 1-Wire.
    Crc8OneWire,
    /// XOR of all bytes. Not a real CRC.
    Crc8Xor,
}

impl Algorithm {
    /// Checksum width in bytes.
    pub fn width(self) -> usize {
        match self {
            Algorithm::Crc32 => 4,
            Algorithm::Crc24 => 3,
            Algorithm::Crc16
            | Algorithm::Crc16Ccitt
            | Algorithm::Crc16Modbus
            | Algorithm::Crc16Kermit
            | Algorithm::Crc16Xmodem => 2,
            Algorithm::Crc8 | Algorithm::Crc8OneWire | Algorithm::Crc8Xor => 1,
        }
    }

    pub fn checksum(self, data: &[u8]) -> u64 {
        match self {
            Algorithm::Crc32 => u64::from(CRC_32.checksum(data)),
            Algorithm::Crc24 => u64::from(CRC_24.checksum(data)),
            Algorithm::Crc16 => u64::from(CRC_16.checksum(data)),
            Algorithm::Crc16Ccitt => u64::from(CRC_16_CCITT.checksum(data)),
            Algorithm::Crc16Modbus => u64::from(CRC_16_MODBUS.checksum(data)),
            Algorithm::Crc16Kermit => u64::from(CRC_16_KERMIT.checksum(data)),
            Algorithm::Crc16Xmodem => u64::from(CRC_16_XMODEM.checksum(data)),
            Algorithm::Crc8 => u64::from(CRC_8.checksum(data)),
            Algorithm::Crc8OneWire => u64::from(CRC_8_1WIRE.checksum(data)),
            Algorithm::Crc8Xor => u64::from(data.iter().fold(0u8, |acc, b| acc ^ b)),
        }
    }
}

type ChecksumFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// Checksum wrapper around a nested schema.
#[derive(Clone)]
pub struct Crc {
    name: String,
    elements: Schema,
    width: usize,
    function: ChecksumFn,
}

impl fmt::Debug for Crc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc")
            .field("name", &self.name)
            .field("elements", &self.elements)
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

impl Crc {
    /// Wraps `elements` with a `width` byte checksum computed by `function`.
    /// Only the low `width * 8` bits of the function's result are used.
    pub fn new<F>(name: impl Into<String>, elements: Schema, width: usize, function: F) -> Result<Self, SchemaError>
    where
        F: Fn(&[u8]) -> u64 + Send + Sync + 'static,
    {
        let name = name.into();
        if !(1..=8).contains(&width) {
            return Err(SchemaError::InvalidChecksumSize { name, width });
        }
        Ok(Crc {
            name,
            elements,
            width,
            function: Arc::new(function),
        })
    }

    /// Wraps `elements` with one of the built-in algorithms.
    pub fn with_algorithm(name: impl Into<String>, elements: Schema, algorithm: Algorithm) -> Self {
        Crc {
            name: name.into(),
            elements,
            width: algorithm.width(),
            function: Arc::new(move |data| algorithm.checksum(data)),
        }
    }

    fn compute(&self, data: &[u8]) -> u64 {
        (self.function)(data) & mask(self.width * 8)
    }
}

impl Codec for Crc {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let used = self.elements.parse_into(data, ctx)?;
        let covered = take(data, used, &self.name)?;

        let stored = read_uint(data.get(used..).unwrap_or_default(), self.width, Endian::Big, &self.name)?;
        let computed = self.compute(covered);
        if stored != computed {
            debug!(field = %self.name, stored, computed, "checksum mismatch");
        }

        Ok((Value::Bool(stored == computed), used + self.width))
    }

    fn prepare_encode(&self, ctx: &mut EncodeContext) -> Result<(), EncodeError> {
        // wrapped fields live in the enclosing scope during encode so that
        // sizes and counts reach siblings on either side of the wrapper
        if let Some(Value::Map(record)) = ctx.fields.shift_remove(&self.name) {
            for (key, value) in record {
                ctx.fields.entry(key).or_insert(value);
            }
        }
        for codec in self.elements.fields() {
            codec.prepare_encode(ctx)?;
        }
        Ok(())
    }

    fn encode(&self, value: &Value, ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let mut fields = ctx.fields.clone();
        fields.shift_remove(&self.name);
        if let Some(nested) = value.as_map() {
            for (key, value) in nested {
                fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut out = self.elements.encode_scoped(fields, ctx.iteration.clone(), ctx.endian)?;
        let checksum = self.compute(&out);
        out.extend(write_uint(checksum, self.width, Endian::Big, &self.name)?);
        Ok(out)
    }

    fn make_struct(&self) -> Value {
        Value::Map(self.elements.make_template())
    }
}

macro_rules! crc_constructors {
    ($($(#[$doc:meta])* $fn:ident => $algorithm:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn(name: impl Into<String>, elements: Schema) -> Crc {
                Crc::with_algorithm(name, elements, Algorithm::$algorithm)
            }
        )*
    };
}

crc_constructors! {
    /// CRC-32 over `elements`.
    crc32 => Crc32,
    crc24 => Crc24,
    crc16 => Crc16,
    crc16_ccitt => Crc16Ccitt,
    crc16_modbus => Crc16Modbus,
    crc16_kermit => Crc16Kermit,
    crc16_xmodem => Crc16Xmodem,
    crc8 => Crc8,
    crc8_1wire => Crc8OneWire,
    /// XOR of all bytes over `elements`.
    crc8_xor => Crc8Xor,
}
