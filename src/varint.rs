//! CompactSize integers, used to prefix serialized scripts with their length.
//!
//! | value                    | encoding          |
//! |--------------------------|-------------------|
//! | `0..=0xfc`               | the byte itself   |
//! | `0xfd..=0xffff`          | `0xfd` + `le16`   |
//! | `0x1_0000..=0xffff_ffff` | `0xfe` + `le32`   |
//! | larger                   | `0xff` + `le64`   |

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("expected {expected_bytes} bytes for a varint, but the input ended early")]
    Truncated { expected_bytes: usize },

    #[error("varint {value} was not encoded in its shortest form")]
    NonCanonical { value: u64 },
}

/// The number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append the encoding of `value` to `out`.
pub fn write(out: &mut Vec<u8>, value: u64) {
    // Writing into a `Vec` can't fail.
    let res = match value {
        0..=0xfc => out.write_u8(value as u8),
        0xfd..=0xffff => out
            .write_u8(0xfd)
            .and_then(|()| out.write_u16::<LittleEndian>(value as u16)),
        0x1_0000..=0xffff_ffff => out
            .write_u8(0xfe)
            .and_then(|()| out.write_u32::<LittleEndian>(value as u32)),
        _ => out
            .write_u8(0xff)
            .and_then(|()| out.write_u64::<LittleEndian>(value)),
    };
    debug_assert!(res.is_ok());
}

/// Encode `value` into a fresh buffer.
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    write(&mut out, value);
    out
}

fn truncated(expected_bytes: usize) -> impl Fn(io::Error) -> Error {
    move |_| Error::Truncated { expected_bytes }
}

/// Read one varint, rejecting encodings that could have been shorter.
pub fn read<R: Read>(reader: &mut R) -> Result<u64, Error> {
    let tag = reader.read_u8().map_err(truncated(1))?;
    let (value, min) = match tag {
        0xfd => (
            u64::from(reader.read_u16::<LittleEndian>().map_err(truncated(2))?),
            0xfd,
        ),
        0xfe => (
            u64::from(reader.read_u32::<LittleEndian>().map_err(truncated(4))?),
            0x1_0000,
        ),
        0xff => (
            reader.read_u64::<LittleEndian>().map_err(truncated(8))?,
            0x1_0000_0000,
        ),
        small => return Ok(u64::from(small)),
    };
    if value < min {
        Err(Error::NonCanonical { value })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_use_the_expected_width() {
        for (value, len) in [
            (0, 1),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            let bytes = encode(value);
            assert_eq!(bytes.len(), len, "{value:#x}");
            assert_eq!(encoded_len(value), len);
            assert_eq!(read(&mut &bytes[..]), Ok(value));
        }
    }

    #[test]
    fn rejects_non_canonical_encodings() {
        assert_eq!(
            read(&mut &[0xfd, 0x10, 0x00][..]),
            Err(Error::NonCanonical { value: 0x10 })
        );
        assert_eq!(
            read(&mut &[0xfe, 0xff, 0xff, 0x00, 0x00][..]),
            Err(Error::NonCanonical { value: 0xffff })
        );
    }

    #[test]
    fn reports_truncation() {
        assert_eq!(
            read(&mut &[][..]),
            Err(Error::Truncated { expected_bytes: 1 })
        );
        assert_eq!(
            read(&mut &[0xfd, 0x01][..]),
            Err(Error::Truncated { expected_bytes: 2 })
        );
    }
}
