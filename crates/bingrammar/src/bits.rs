//! Low-level integer and bit manipulation utilities for byte slices.
//!
//! Bit slices are addressed MSB-first: the first element of a bit struct takes
//! the most significant bits of the accumulator.

use crate::{
    errors::{DecodeError, EncodeError},
    field::Endian,
};

/// Returns the first `n` bytes of `data`, or an out-of-bounds error naming `field`.
pub fn take<'a>(data: &'a [u8], n: usize, field: &str) -> Result<&'a [u8], DecodeError> {
    data.get(..n).ok_or_else(|| DecodeError::OutOfBounds {
        field: field.to_string(),
        needed: n,
        available: data.len(),
    })
}

/// Reads a `size`-byte unsigned integer from the start of `data`.
pub fn read_uint(data: &[u8], size: usize, endian: Endian, field: &str) -> Result<u64, DecodeError> {
    let bytes = take(data, size, field)?;

    let value = match endian {
        Endian::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        Endian::Little => bytes
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
    };

    Ok(value)
}

/// Writes `value` as a `size`-byte unsigned integer. Fails if it does not fit.
pub fn write_uint(value: u64, size: usize, endian: Endian, field: &str) -> Result<Vec<u8>, EncodeError> {
    let bits = size * 8;
    if value > mask(bits) {
        return Err(EncodeError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            bits,
        });
    }

    let be = value.to_be_bytes();
    let mut out = be[be.len() - size..].to_vec();
    if endian == Endian::Little {
        out.reverse();
    }

    Ok(out)
}

/// Two's complement encoding of `value` in `bits` bits. Fails if it does not fit.
pub fn to_twos_complement(value: i64, bits: usize, field: &str) -> Result<u64, EncodeError> {
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    if !(min..=max).contains(&i128::from(value)) {
        return Err(EncodeError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            bits,
        });
    }

    Ok(value as u64 & mask(bits))
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// All-ones mask covering the low `bits` bits.
pub fn mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Extracts the `width` bits directly below the `remaining` lowest bits boundary,
/// i.e. the most significant `width` of the `remaining` unread bits.
pub fn slice_bits(acc: u64, remaining: usize, width: usize) -> u64 {
    (acc >> (remaining - width)) & mask(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_uint_endianness() {
        let data = [0x01, 0x00, 0xff];
        assert_eq!(read_uint(&data, 3, Endian::Big, "u").unwrap(), 65791);
        assert_eq!(read_uint(&[0xff, 0x00, 0x01], 3, Endian::Little, "u").unwrap(), 65791);
    }

    #[test]
    fn test_read_uint_out_of_bounds() {
        assert_eq!(
            read_uint(&[0xff], 2, Endian::Big, "u").unwrap_err(),
            DecodeError::OutOfBounds {
                field: "u".to_string(),
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_write_uint() {
        assert_eq!(write_uint(0x0102, 2, Endian::Big, "u").unwrap(), vec![0x01, 0x02]);
        assert_eq!(write_uint(0x0102, 2, Endian::Little, "u").unwrap(), vec![0x02, 0x01]);
        assert_eq!(write_uint(0x0102, 3, Endian::Big, "u").unwrap(), vec![0x00, 0x01, 0x02]);
        assert!(write_uint(256, 1, Endian::Big, "u").is_err());
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0xF, 4), -1);
        assert_eq!(sign_extend(0x5, 4), 5);
        assert_eq!(sign_extend(0b110000, 6), -16);
    }

    #[test]
    fn test_twos_complement() {
        assert_eq!(to_twos_complement(-1, 4, "i").unwrap(), 0xF);
        assert_eq!(to_twos_complement(7, 4, "i").unwrap(), 0x7);
        assert_eq!(to_twos_complement(-8, 4, "i").unwrap(), 0x8);
        assert!(to_twos_complement(8, 4, "i").is_err());
        assert!(to_twos_complement(-9, 4, "i").is_err());
    }

    #[test]
    fn test_slice_bits() {
        let acc = 0x5F;
        assert_eq!(slice_bits(acc, 8, 4), 0x5);
        assert_eq!(slice_bits(acc, 4, 4), 0xF);
        assert_eq!(slice_bits(acc, 8, 1), 0);
    }
}
