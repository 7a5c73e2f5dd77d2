//! Converting between bytes and commands.
//!
//! ```text
//! script        := varint(len(body)) body
//! body          := command*
//! command       := push_short | push1 | push2 | opcode_byte
//! push_short    := byte(N) data(N)                    ; 1 <= N <= 75
//! push1         := OP_PUSHDATA1 byte(N) data(N)
//! push2         := OP_PUSHDATA2 le16(N) data(N)
//! opcode_byte   := any other single byte
//! ```
//!
//! `OP_PUSHDATA4` isn't a push here. It decodes as an ordinary opcode byte, which the
//! interpreter then rejects.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};

use super::{Command, DecodeError, Error, Script, MAX_SCRIPT_ELEMENT_SIZE};
use crate::{opcode::Opcode, varint};

/// The largest length a single-byte push can carry.
pub const MAX_DIRECT_PUSH: usize = 0x4b;

/// Iterates over the commands of a script body (no length prefix).
///
/// After the first error the iterator is exhausted.
#[derive(Clone, Debug)]
pub struct Commands<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Commands<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Commands { body, pos: 0 }
    }

    /// How many bytes have been decoded so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn overrun(&mut self, needed: usize) -> DecodeError {
        let err = DecodeError::Overrun {
            declared: self.body.len(),
            consumed: needed,
        };
        self.pos = self.body.len();
        err
    }

    /// Takes `n` bytes after the current position, or reports how far past the end they'd run.
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let body = self.body;
        let end = self.pos + n;
        match body.get(self.pos..end) {
            Some(bytes) => {
                self.pos = end;
                Ok(bytes)
            }
            None => Err(self.overrun(end)),
        }
    }

    fn next_command(&mut self, leading_byte: u8) -> Result<Command, DecodeError> {
        let len = match leading_byte {
            0x01..=0x4b => usize::from(leading_byte),
            0x4c => usize::from(self.take(1)?[0]),
            0x4d => usize::from(LittleEndian::read_u16(self.take(2)?)),
            _ => return Ok(Command::Opcode(leading_byte)),
        };
        Ok(Command::PushData(self.take(len)?.to_vec()))
    }
}

impl Iterator for Commands<'_> {
    type Item = Result<Command, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let leading_byte = *self.body.get(self.pos)?;
        self.pos += 1;
        Some(self.next_command(leading_byte))
    }
}

/// Read a varint length, exactly that many bytes, and decode them all.
pub fn read_script<R: Read>(reader: &mut R) -> Result<Script, DecodeError> {
    let declared = varint::read(reader).map_err(DecodeError::VarInt)?;
    let mut body = Vec::new();
    // `take` keeps a hostile length from allocating more than is actually there.
    reader
        .take(declared)
        .read_to_end(&mut body)
        .map_err(|_| DecodeError::Truncated {
            expected: declared,
            available: body.len(),
        })?;
    if (body.len() as u64) < declared {
        return Err(DecodeError::Truncated {
            expected: declared,
            available: body.len(),
        });
    }
    decode_body(&body).map(Script::from_commands)
}

/// Decode a whole body. Every byte must belong to some command.
pub fn decode_body(body: &[u8]) -> Result<Vec<Command>, DecodeError> {
    Commands::new(body).collect()
}

/// Append the encoding of one command.
pub fn write_command(out: &mut Vec<u8>, command: &Command) -> Result<(), Error> {
    match command {
        Command::Opcode(byte) => out.push(*byte),
        Command::PushData(data) => {
            let size = data.len();
            if size <= MAX_DIRECT_PUSH {
                out.push(size as u8);
            } else if size <= 0xff {
                out.push(Opcode::OP_PUSHDATA1.into());
                out.push(size as u8);
            } else if size <= MAX_SCRIPT_ELEMENT_SIZE {
                out.push(Opcode::OP_PUSHDATA2.into());
                let mut len = [0; 2];
                LittleEndian::write_u16(&mut len, size as u16);
                out.extend_from_slice(&len);
            } else {
                return Err(Error::Encode { size });
            }
            out.extend_from_slice(data);
        }
    }
    Ok(())
}

/// The encoding of `commands` without a length prefix.
pub fn encode_body(commands: &[Command]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for command in commands {
        write_command(&mut out, command)?;
    }
    Ok(out)
}

/// The encoding of `commands` with its varint length prefix.
pub fn serialize(commands: &[Command]) -> Result<Vec<u8>, Error> {
    let body = encode_body(commands)?;
    let mut out = Vec::with_capacity(varint::encoded_len(body.len() as u64) + body.len());
    varint::write(&mut out, body.len() as u64);
    out.extend_from_slice(&body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;

    fn push_of(len: usize) -> Script {
        Script::from_commands(vec![Command::PushData(vec![0xab; len])])
    }

    #[test]
    fn push_encoding_boundaries() {
        for (len, header) in [
            (1, vec![0x01u8]),
            (75, vec![0x4b]),
            (76, vec![0x4c, 76]),
            (255, vec![0x4c, 0xff]),
            (256, vec![0x4d, 0x00, 0x01]),
            (520, vec![0x4d, 0x08, 0x02]),
        ] {
            let body = push_of(len).to_bytes().unwrap();
            assert_eq!(body[..header.len()], header[..], "push of {len}");
            assert_eq!(body.len(), header.len() + len);
        }
        assert_eq!(push_of(521).to_bytes(), Err(Error::Encode { size: 521 }));
        assert_eq!(push_of(521).serialize(), Err(Error::Encode { size: 521 }));
    }

    #[test]
    fn opcodes_are_single_bytes() {
        let body = [0x00, 0x4e, 0x76, 0xff];
        assert_eq!(
            decode_body(&body),
            Ok(vec![
                Command::Opcode(0x00),
                Command::Opcode(0x4e),
                Command::Opcode(0x76),
                Command::Opcode(0xff),
            ])
        );
    }

    #[test]
    fn pushes_may_not_overrun_the_body() {
        assert_eq!(
            decode_body(&[0x05, 1, 2]),
            Err(DecodeError::Overrun {
                declared: 3,
                consumed: 6
            })
        );
        assert_eq!(
            decode_body(&[0x4c]),
            Err(DecodeError::Overrun {
                declared: 1,
                consumed: 2
            })
        );
        assert_eq!(
            decode_body(&[0x4d, 0x01]),
            Err(DecodeError::Overrun {
                declared: 2,
                consumed: 3
            })
        );
        // the declared length cuts a push short even if more bytes follow in the stream
        assert_eq!(
            read_script(&mut &[0x02, 0x02, 0xaa, 0xbb][..]),
            Err(DecodeError::Overrun {
                declared: 2,
                consumed: 3
            })
        );
    }

    #[test]
    fn truncated_input() {
        assert_eq!(
            read_script(&mut &[0x05, 0x76][..]),
            Err(DecodeError::Truncated {
                expected: 5,
                available: 1
            })
        );
        assert!(matches!(
            read_script(&mut &[][..]),
            Err(DecodeError::VarInt(varint::Error::Truncated { .. }))
        ));
    }

    #[test]
    fn reads_exactly_the_declared_length() {
        let mut stream = &[0x01, 0x76, 0x01, 0x87][..];
        assert_eq!(
            read_script(&mut stream).map(Script::into_commands),
            Ok(vec![Command::Opcode(0x76)])
        );
        assert_eq!(
            read_script(&mut stream).map(Script::into_commands),
            Ok(vec![Command::Opcode(0x87)])
        );
        assert!(stream.is_empty());
    }

    #[test]
    fn empty_script() {
        assert_eq!(serialize(&[]), Ok(vec![0x00]));
        assert_eq!(read_script(&mut &[0x00][..]), Ok(Script::default()));
    }

    #[test]
    fn zero_length_pushdata() {
        // Both long forms can carry nothing. That's an empty push, which is written back as
        // the single byte OP_0 and so reads back as the opcode.
        for body in [&[0x4c, 0x00][..], &[0x4d, 0x00, 0x00][..]] {
            let commands = decode_body(body).unwrap();
            assert_eq!(commands, vec![Command::PushData(vec![])]);
            let encoded = encode_body(&commands).unwrap();
            assert_eq!(encoded, vec![0x00]);
            assert_eq!(decode_body(&encoded), Ok(vec![Command::Opcode(0x00)]));
        }
        assert_eq!(
            read_script(&mut &[0x02, 0x4c, 0x00][..]).map(|s| s.serialize()),
            Ok(Ok(vec![0x01, 0x00]))
        );
    }

    #[test]
    fn iterator_reports_consumption() {
        let body = [0x76, 0x02, 0xaa, 0xbb, 0x87];
        let mut commands = Commands::new(&body);
        assert_eq!(commands.next(), Some(Ok(Command::Opcode(0x76))));
        assert_eq!(commands.consumed(), 1);
        assert_eq!(commands.next(), Some(Ok(Command::push(&[0xaa, 0xbb]))));
        assert_eq!(commands.consumed(), 4);
        assert_eq!(commands.next(), Some(Ok(Command::Opcode(0x87))));
        assert_eq!(commands.next(), None);
        assert_eq!(commands.consumed(), body.len());
    }

    fn arb_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            // bytes that can't be mistaken for the start of a push
            prop_oneof![Just(0x00u8), 0x4eu8..=0xff].prop_map(Command::Opcode),
            // an empty push comes back as OP_0, see `zero_length_pushdata`
            vec(any::<u8>(), 1..=MAX_SCRIPT_ELEMENT_SIZE).prop_map(Command::PushData),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn serialized_scripts_parse_back(commands in vec(arb_command(), 0..20)) {
            let script = Script::from_commands(commands);
            let bytes = script.serialize().unwrap();
            let mut reader = &bytes[..];
            prop_assert_eq!(Script::parse(&mut reader), Ok(script));
            prop_assert!(reader.is_empty());
        }

        #[test]
        fn decoding_never_panics(body in vec(any::<u8>(), 0..600)) {
            let mut commands = Commands::new(&body);
            let res: Result<Vec<_>, _> = commands.by_ref().collect();
            if res.is_ok() {
                prop_assert_eq!(commands.consumed(), body.len());
            }
        }
    }
}
