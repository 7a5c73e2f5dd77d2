//! Script numbers: little-endian sign-magnitude integers stored on the stack.

use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("non-minimal encoding of script number: {0:02x?}")]
    NonMinimalEncoding(Vec<u8>),

    #[error("script number overflow: max: {max_size}, actual: {actual}")]
    Overflow { max_size: usize, actual: usize },
}

/// Arithmetic operands are limited to this many bytes. Results may be wider.
pub const DEFAULT_MAX_SIZE: usize = 4;

/// Lock times are 5-byte numbers, so they can express values past 2^31.
pub const LOCK_TIME_MAX_SIZE: usize = 5;

/// Convert bytes to the integer they encode.
///
/// `max_size` above 8 is clamped to 8, since nothing wider fits in an `i64`.
pub fn parse(vch: &[u8], require_minimal: bool, max_size: usize) -> Result<i64, Error> {
    let max_size = max_size.min(8);
    let Some(vch_back) = vch.last() else {
        return Ok(0);
    };
    if vch.len() > max_size {
        return Err(Error::Overflow {
            max_size,
            actual: vch.len(),
        });
    }
    // If the most significant byte, excluding the sign bit, is zero then the encoding is only
    // minimal when the next byte down already has its top bit set. This also rejects negative
    // zero (0x80).
    if require_minimal
        && (vch_back & 0x7f) == 0
        && (vch.len() <= 1 || (vch[vch.len() - 2] & 0x80) == 0)
    {
        return Err(Error::NonMinimalEncoding(vch.to_vec()));
    }

    let mut result: i64 = 0;
    for (i, vch_i) in vch.iter().enumerate() {
        result |= i64::from(*vch_i) << (8 * i);
    }

    if vch_back & 0x80 != 0 {
        Ok(-(result & !(0x80 << (8 * (vch.len() - 1)))))
    } else {
        Ok(result)
    }
}

pub fn serialize(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let neg = value < 0;
    let mut absvalue = value.unsigned_abs();
    let mut result = Vec::new();
    while absvalue != 0 {
        result.push((absvalue & 0xff) as u8);
        absvalue >>= 8;
    }

    // A set top bit would read back as the sign, so it gets a byte of its own.
    if result.last().map_or(true, |last| last & 0x80 != 0) {
        result.push(if neg { 0x80 } else { 0 });
    } else if neg {
        if let Some(last) = result.last_mut() {
            *last |= 0x80;
        }
    }

    result
}
