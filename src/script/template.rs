//! Detecting and building standard scripts.

use super::{Command, Script};
use crate::opcode::Opcode::*;

const DUP: u8 = OP_DUP as u8;
const HASH160: u8 = OP_HASH160 as u8;
const EQUAL: u8 = OP_EQUAL as u8;
const EQUALVERIFY: u8 = OP_EQUALVERIFY as u8;
const CHECKSIG: u8 = OP_CHECKSIG as u8;
const RETURN: u8 = OP_RETURN as u8;

/// Known kinds of standard scripts, with the data they commit to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ScriptKind {
    /// The Hash160 of a public key.
    PubKeyHash { hash: [u8; 20] },

    /// The Hash160 of a redeem script.
    ScriptHash { hash: [u8; 20] },

    /// Version 0 witness program paying to the Hash160 of a public key.
    WitnessPubKeyHash { hash: [u8; 20] },

    /// Version 0 witness program paying to the SHA-256 of a witness script.
    WitnessScriptHash { hash: [u8; 32] },

    /// Provably unspendable output carrying data.
    NullData { data: Vec<u8> },
}

fn hash_of<const N: usize>(data: &[u8]) -> Option<[u8; N]> {
    data.try_into().ok()
}

/// Classify `commands`, or `None` if they're non-standard.
pub fn standard(commands: &[Command]) -> Option<ScriptKind> {
    match commands {
        // Pay-to-Public-Key-Hash (P2PKH)
        [Command::Opcode(DUP), Command::Opcode(HASH160), Command::PushData(v), Command::Opcode(EQUALVERIFY), Command::Opcode(CHECKSIG)] => {
            hash_of(v).map(|hash| ScriptKind::PubKeyHash { hash })
        }

        // Pay-to-Script-Hash (P2SH)
        [Command::Opcode(HASH160), Command::PushData(v), Command::Opcode(EQUAL)] => {
            hash_of(v).map(|hash| ScriptKind::ScriptHash { hash })
        }

        // Version 0 witness programs.
        [version, Command::PushData(v)] if version.is_empty_push() => match v.len() {
            20 => hash_of(v).map(|hash| ScriptKind::WitnessPubKeyHash { hash }),
            32 => hash_of(v).map(|hash| ScriptKind::WitnessScriptHash { hash }),
            _ => None,
        },

        // Data-carrying output.
        [Command::Opcode(RETURN), data] if data.is_push() => match data {
            Command::PushData(v) => Some(ScriptKind::NullData { data: v.clone() }),
            _ if data.is_empty_push() => Some(ScriptKind::NullData { data: vec![] }),
            _ => None,
        },

        // Non-standard
        _ => None,
    }
}

fn script(commands: Vec<Command>) -> Script {
    Script::from_commands(commands)
}

pub fn p2pkh(hash: &[u8; 20]) -> Script {
    script(vec![
        OP_DUP.into(),
        OP_HASH160.into(),
        Command::push(hash),
        OP_EQUALVERIFY.into(),
        OP_CHECKSIG.into(),
    ])
}

pub fn p2sh(hash: &[u8; 20]) -> Script {
    script(vec![OP_HASH160.into(), Command::push(hash), OP_EQUAL.into()])
}

pub fn p2wpkh(hash: &[u8; 20]) -> Script {
    script(vec![OP_0.into(), Command::push(hash)])
}

pub fn p2wsh(hash: &[u8; 32]) -> Script {
    script(vec![OP_0.into(), Command::push(hash)])
}

pub fn null_data(data: &[u8]) -> Script {
    script(vec![OP_RETURN.into(), Command::push(data)])
}

/// Whether the next commands are `OP_HASH160 <20 bytes> OP_EQUAL`, returning the hash.
pub fn script_hash_check<'a>(
    mut next: impl Iterator<Item = &'a Command>,
) -> Option<[u8; 20]> {
    match (next.next(), next.next(), next.next()) {
        (
            Some(Command::Opcode(HASH160)),
            Some(Command::PushData(v)),
            Some(Command::Opcode(EQUAL)),
        ) => hash_of(v),
        _ => None,
    }
}
