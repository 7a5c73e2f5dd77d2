//! Managing sequences of commands.

use std::fmt;
use std::io::Read;

use thiserror::Error;

use crate::{
    address::{Address, Network},
    buffer::BufferPool,
    opcode::{self, Opcode},
    varint,
};

pub mod codec;
pub mod template;

pub use template::ScriptKind;

/// The largest element a push may carry, in bytes.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum script length in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// One step of a script: an opcode to execute, or data to push.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Command {
    Opcode(u8),
    PushData(Vec<u8>),
}

impl Command {
    pub fn push(data: &[u8]) -> Self {
        Command::PushData(data.to_vec())
    }

    /// Pushes, including the opcodes that push a constant. `OP_RESERVED` is in the push range
    /// but pushes nothing, so it isn't one.
    pub fn is_push(&self) -> bool {
        match self {
            Command::PushData(_) => true,
            Command::Opcode(byte) => {
                *byte <= u8::from(Opcode::OP_16) && *byte != u8::from(Opcode::OP_RESERVED)
            }
        }
    }

    /// `OP_0` and an empty `PushData` put the same empty element on the stack.
    pub fn is_empty_push(&self) -> bool {
        match self {
            Command::PushData(data) => data.is_empty(),
            Command::Opcode(byte) => *byte == u8::from(Opcode::OP_0),
        }
    }

    /// The data for `PushData`, or `None` for opcodes.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Command::PushData(data) => Some(data),
            Command::Opcode(_) => None,
        }
    }
}

impl From<Opcode> for Command {
    fn from(value: Opcode) -> Self {
        Command::Opcode(value.into())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Opcode(byte) => f.write_str(&opcode::mnemonic(*byte)),
            // serializes as OP_0, so that's how it reads back
            Command::PushData(data) if data.is_empty() => f.write_str("OP_0"),
            Command::PushData(data) => f.write_str(&hex::encode(data)),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum DecodeError {
    #[error("couldn't read the script length: {0}")]
    VarInt(varint::Error),

    #[error("script declared {expected} bytes, but only {available} were available")]
    Truncated { expected: u64, available: usize },

    #[error("a push ran past the end of the script: declared {declared} bytes, needed {consumed}")]
    Overrun { declared: usize, consumed: usize },
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("failed to decode script: {0}")]
    Decode(#[from] DecodeError),

    #[error("push of {size} bytes exceeds the maximum of {}", MAX_SCRIPT_ELEMENT_SIZE)]
    Encode { size: usize },

    #[error("script doesn't match any template with an address")]
    UnrecognizedTemplate,
}

/// An ordered sequence of commands.
///
/// Scripts aren't modified once built. [`Script::add`] makes a new one.
#[derive(Clone, PartialEq, Eq, Debug, Default, Hash)]
pub struct Script {
    commands: Vec<Command>,
}

impl Script {
    /// No validation happens here. Oversized pushes are caught by [`Script::serialize`], and by
    /// the interpreter.
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Script { commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// A new script running `self` and then `other`. For evaluation the unlocking script comes
    /// first, so the usual call is `script_sig.add(&script_pub_key)`.
    pub fn add(&self, other: &Script) -> Script {
        Script {
            commands: self
                .commands
                .iter()
                .chain(other.commands.iter())
                .cloned()
                .collect(),
        }
    }

    /// Read one length-prefixed script.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Script, Error> {
        Ok(codec::read_script(reader)?)
    }

    /// Parse a script body without its length prefix, as found inside a redeem script push or
    /// at the end of a P2WSH witness.
    pub fn parse_raw(bytes: &[u8]) -> Result<Script, Error> {
        Self::parse_raw_with(bytes, BufferPool::shared())
    }

    /// [`Script::parse_raw`], using scratch space from `pool`.
    pub fn parse_raw_with(bytes: &[u8], pool: &BufferPool) -> Result<Script, Error> {
        let len = bytes.len() as u64;
        let mut buf = pool.borrow(varint::encoded_len(len) + bytes.len());
        varint::write(&mut buf, len);
        buf.extend_from_slice(bytes);
        let mut reader = &buf[..];
        Self::parse(&mut reader)
    }

    /// The length-prefixed encoding.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        codec::serialize(&self.commands)
    }

    /// The encoding without the length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        codec::encode_body(&self.commands)
    }

    /// Opcodes as mnemonics and pushes as lowercase hex, separated by spaces.
    pub fn asm(&self) -> String {
        self.commands
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Called by P2SH/BIP62 verification, which makes it consensus-critical.
    pub fn is_push_only(&self) -> bool {
        self.commands.iter().all(Command::is_push)
    }

    pub fn kind(&self) -> Option<ScriptKind> {
        template::standard(&self.commands)
    }

    pub fn is_p2pkh(&self) -> bool {
        matches!(self.kind(), Some(ScriptKind::PubKeyHash { .. }))
    }

    pub fn is_p2sh(&self) -> bool {
        matches!(self.kind(), Some(ScriptKind::ScriptHash { .. }))
    }

    pub fn is_p2wpkh(&self) -> bool {
        matches!(self.kind(), Some(ScriptKind::WitnessPubKeyHash { .. }))
    }

    pub fn is_p2wsh(&self) -> bool {
        matches!(self.kind(), Some(ScriptKind::WitnessScriptHash { .. }))
    }

    pub fn is_null_data(&self) -> bool {
        matches!(self.kind(), Some(ScriptKind::NullData { .. }))
    }

    /// The address this output pays to. Only P2PKH, P2SH and null-data outputs have one.
    pub fn address(&self, network: Network) -> Result<Address, Error> {
        match self.kind() {
            Some(ScriptKind::PubKeyHash { hash }) => Ok(Address::PubKeyHash { network, hash }),
            Some(ScriptKind::ScriptHash { hash }) => Ok(Address::ScriptHash { network, hash }),
            Some(ScriptKind::NullData { data }) => Ok(Address::NullData { data }),
            _ => Err(Error::UnrecognizedTemplate),
        }
    }

    pub fn p2pkh(hash: &[u8; 20]) -> Script {
        template::p2pkh(hash)
    }

    pub fn p2sh(hash: &[u8; 20]) -> Script {
        template::p2sh(hash)
    }

    pub fn p2wpkh(hash: &[u8; 20]) -> Script {
        template::p2wpkh(hash)
    }

    pub fn p2wsh(hash: &[u8; 32]) -> Script {
        template::p2wsh(hash)
    }

    pub fn null_data(data: &[u8]) -> Script {
        template::null_data(data)
    }

    pub fn p2pkh_from_pub_key(pub_key: &[u8]) -> Script {
        template::p2pkh(&crate::hash::hash160(pub_key))
    }

    /// Commits to the encoding of `redeem`, so that fails like [`Script::to_bytes`] does.
    pub fn p2sh_from_redeem(redeem: &Script) -> Result<Script, Error> {
        Ok(template::p2sh(&crate::hash::hash160(&redeem.to_bytes()?)))
    }
}

impl From<Vec<Command>> for Script {
    fn from(commands: Vec<Command>) -> Self {
        Script::from_commands(commands)
    }
}

impl FromIterator<Command> for Script {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Script::from_commands(iter.into_iter().collect())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.asm())
    }
}

#[cfg(test)]
mod tests {
    use hex::FromHex;

    use super::*;
    use crate::opcode::Opcode::*;

    #[test]
    fn null_data_round_trip_and_asm() {
        let bytes = Vec::from_hex("076a0568656c6c6f").unwrap();
        let script = Script::parse(&mut &bytes[..]).unwrap();
        assert_eq!(
            script.commands(),
            &[Command::from(OP_RETURN), Command::push(b"hello")]
        );
        assert_eq!(script.serialize().unwrap(), bytes);
        assert_eq!(script.asm(), "OP_RETURN 68656c6c6f");
        assert_eq!(script.to_string(), script.asm());
        assert!(script.is_null_data());
        assert_eq!(
            script.address(Network::Mainnet),
            Ok(Address::NullData {
                data: b"hello".to_vec()
            })
        );
    }

    #[test]
    fn add_preserves_order() {
        let a = Script::from_commands(vec![Command::push(&[1])]);
        let b = Script::from_commands(vec![OP_DUP.into()]);
        let c = Script::from_commands(vec![OP_EQUAL.into()]);
        assert_eq!(a.add(&b).add(&c), a.add(&b.add(&c)));
        assert_eq!(
            a.add(&b).commands(),
            &[Command::push(&[1]), Command::from(OP_DUP)]
        );
        assert_eq!(a.add(&Script::default()), a);
    }

    #[test]
    fn empty_pushes_render_as_op_0() {
        let script = Script::from_commands(vec![Command::push(&[]), OP_0.into()]);
        assert_eq!(script.asm(), "OP_0 OP_0");
        assert_eq!(script.to_bytes().unwrap(), vec![0x00, 0x00]);
    }

    #[test]
    fn push_only() {
        assert!(Script::from_commands(vec![OP_0.into(), OP_16.into(), Command::push(&[9; 80])])
            .is_push_only());
        assert!(!Script::from_commands(vec![OP_RESERVED.into()]).is_push_only());
        assert!(!Script::from_commands(vec![OP_NOP.into()]).is_push_only());
    }

    #[test]
    fn parse_raw_matches_prefixed_parse() {
        let body = Vec::from_hex("76a914000102030405060708090a0b0c0d0e0f1011121388ac").unwrap();
        let raw = Script::parse_raw(&body).unwrap();
        assert!(raw.is_p2pkh());
        let mut prefixed = varint::encode(body.len() as u64);
        prefixed.extend_from_slice(&body);
        assert_eq!(Script::parse(&mut &prefixed[..]).unwrap(), raw);
        assert_eq!(raw.to_bytes().unwrap(), body);
    }

    #[test]
    fn unrecognized_templates_have_no_address() {
        let script = Script::from_commands(vec![OP_1.into()]);
        assert_eq!(
            script.address(Network::Mainnet),
            Err(Error::UnrecognizedTemplate)
        );
        assert_eq!(
            Script::p2wpkh(&[0; 20]).address(Network::Mainnet),
            Err(Error::UnrecognizedTemplate)
        );
    }
}
