//! A table of scripts and the results they should evaluate to.
//!
//! Vectors run without a witness and with a checker that rejects every signature, so they
//! cover the parts of evaluation that don't depend on a transaction.

use hex::{FromHex, FromHexError};

use crate::{
    interpreter::Flags,
    num,
    opcode::Opcode::{self, *},
    script::Script,
    script_error::ScriptError,
};

/// A shorthand syntax for writing possibly-incorrect scripts.
#[derive(Debug)]
pub enum Entry {
    /// An Opcode
    O(Opcode),
    /// A byte sequence encoded as a hex string, included verbatim
    H(&'static str),
    /// A push of an ASCII string
    A(&'static str),
    /// A push of a number
    N(i64),
}

use Entry::*;

impl Entry {
    /// The shortest encoding of a push of `v`.
    fn push(v: &[u8]) -> Vec<u8> {
        match v {
            [] => vec![OP_0.into()],
            [n @ 1..=16] => vec![u8::from(OP_1) + n - 1],
            [0x81] => vec![OP_1NEGATE.into()],
            _ => {
                let mut out = match v.len() {
                    l @ 0..=0x4b => vec![l as u8],
                    l @ 0x4c..=0xff => vec![OP_PUSHDATA1.into(), l as u8],
                    l => {
                        let [lo, hi] = (l as u16).to_le_bytes();
                        vec![OP_PUSHDATA2.into(), lo, hi]
                    }
                };
                out.extend_from_slice(v);
                out
            }
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, FromHexError> {
        match self {
            O(opcode) => Ok(vec![(*opcode).into()]),
            H(bytes) => <Vec<u8>>::from_hex(*bytes),
            A(string) => Ok(Self::push(string.as_bytes())),
            N(n) => Ok(Self::push(&num::serialize(*n))),
        }
    }
}

#[derive(Debug)]
pub struct TestVector {
    pub script_sig: &'static [Entry],
    pub script_pubkey: &'static [Entry],
    pub flags: Flags,
    pub result: Result<(), ScriptError>,
}

impl TestVector {
    fn script(entries: &[Entry]) -> Result<Script, ScriptError> {
        let bytes = entries
            .iter()
            .map(Entry::serialize)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_else(|e| panic!("{:?} has a bad hex value: {}", entries, e))
            .concat();
        // A push that runs off the end of the script is a bad opcode.
        Script::parse_raw(&bytes).map_err(|_| ScriptError::BadOpcode)
    }

    /// A successful run is uninteresting, but a failure returns the actual `Result` in `Err`.
    pub fn run(
        &self,
        f: &dyn Fn(&Script, &Script, Flags) -> Result<(), ScriptError>,
    ) -> Result<(), Result<(), ScriptError>> {
        let res = Self::script(self.script_sig).and_then(|sig| {
            Self::script(self.script_pubkey).and_then(|pub_key| f(&sig, &pub_key, self.flags))
        });
        if res == self.result {
            Ok(())
        } else {
            Err(res)
        }
    }
}

pub const DEFAULT_FLAGS: Flags = Flags::P2SH.union(Flags::WITNESS);
pub const EMPTY_FLAGS: Flags = Flags::empty();

const fn tv(
    script_sig: &'static [Entry],
    script_pubkey: &'static [Entry],
    flags: Flags,
    result: Result<(), ScriptError>,
) -> TestVector {
    TestVector {
        script_sig,
        script_pubkey,
        flags,
        result,
    }
}

pub fn test_vectors() -> Vec<TestVector> {
    use ScriptError::{
        BadOpcode, CheckMultisigVerify, CheckSigVerify, DisabledOpcode, DiscourageUpgradableNOPs,
        EqualVerify, EvalFalse, InvalidAltstackOperation, InvalidStackOperation, MinimalData,
        NegativeLockTime, NumEqualVerify, OpReturn, PubKeyCount, PubKeyType, ScriptNum, SigCount,
        SigDER, SigNullDummy, UnbalancedConditional, UnknownError, UnsatisfiedLockTime, Verify,
        WitnessProgramWitnessEmpty,
    };

    vec![
        // terminal rule
        tv(&[N(1)], &[], EMPTY_FLAGS, Ok(())),
        tv(&[], &[N(1)], EMPTY_FLAGS, Ok(())),
        tv(&[], &[], EMPTY_FLAGS, Err(EvalFalse)),
        tv(&[N(0)], &[], EMPTY_FLAGS, Err(EvalFalse)),
        tv(&[H("0100")], &[], EMPTY_FLAGS, Err(EvalFalse)),
        tv(&[H("0180")], &[], EMPTY_FLAGS, Err(EvalFalse)),
        tv(&[H("020080")], &[], EMPTY_FLAGS, Ok(())),
        tv(&[H("020000")], &[], EMPTY_FLAGS, Ok(())),
        tv(&[H("028000")], &[], EMPTY_FLAGS, Ok(())),
        // arithmetic and stack
        tv(&[N(1), N(2)], &[O(OP_ADD), N(3), O(OP_EQUAL)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(2), N(3)], &[O(OP_SWAP), O(OP_SUB), N(1), O(OP_EQUAL)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(-1)], &[O(OP_ABS), N(1), O(OP_NUMEQUAL)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(1000)], &[N(999), O(OP_GREATERTHAN)], DEFAULT_FLAGS, Ok(())),
        tv(&[A("abc")], &[O(OP_SIZE), N(3), O(OP_EQUALVERIFY)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(2)], &[N(3), O(OP_EQUALVERIFY), N(1)], DEFAULT_FLAGS, Err(EqualVerify)),
        tv(&[N(2)], &[N(3), O(OP_NUMEQUALVERIFY), N(1)], DEFAULT_FLAGS, Err(NumEqualVerify)),
        tv(&[N(0)], &[O(OP_VERIFY), N(1)], DEFAULT_FLAGS, Err(Verify)),
        tv(&[], &[O(OP_DROP)], DEFAULT_FLAGS, Err(InvalidStackOperation)),
        tv(&[N(1)], &[N(5), O(OP_PICK)], DEFAULT_FLAGS, Err(InvalidStackOperation)),
        tv(&[], &[O(OP_FROMALTSTACK)], DEFAULT_FLAGS, Err(InvalidAltstackOperation)),
        tv(&[N(1)], &[O(OP_TOALTSTACK), O(OP_FROMALTSTACK)], DEFAULT_FLAGS, Ok(())),
        tv(&[H("050100000000")], &[O(OP_1ADD)], DEFAULT_FLAGS, Err(ScriptNum)),
        // conditionals
        tv(&[N(1)], &[O(OP_IF), N(1), O(OP_ELSE), N(0), O(OP_ENDIF)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(0)], &[O(OP_IF), N(1), O(OP_ELSE), N(0), O(OP_ENDIF)], DEFAULT_FLAGS, Err(EvalFalse)),
        tv(&[N(0)], &[O(OP_NOTIF), N(1), O(OP_ENDIF)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(0)], &[O(OP_IF), O(OP_RETURN), O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(1)], &[O(OP_IF), N(1)], DEFAULT_FLAGS, Err(UnbalancedConditional)),
        tv(&[], &[O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Err(UnbalancedConditional)),
        tv(&[], &[O(OP_IF), O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Err(UnbalancedConditional)),
        tv(&[N(1)], &[O(OP_RETURN)], DEFAULT_FLAGS, Err(OpReturn)),
        // bad and disabled opcodes
        tv(&[N(0)], &[O(OP_IF), O(OP_CAT), O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Err(DisabledOpcode)),
        tv(&[N(0)], &[O(OP_IF), O(OP_VERIF), O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Err(BadOpcode)),
        tv(&[N(0)], &[O(OP_IF), O(OP_RESERVED), O(OP_ENDIF), N(1)], DEFAULT_FLAGS, Ok(())),
        tv(&[], &[O(OP_RESERVED)], DEFAULT_FLAGS, Err(BadOpcode)),
        tv(&[N(1)], &[H("4e00000000")], DEFAULT_FLAGS, Err(BadOpcode)),
        tv(&[H("4c")], &[N(1)], DEFAULT_FLAGS, Err(BadOpcode)),
        tv(&[H("0201")], &[N(1)], DEFAULT_FLAGS, Err(BadOpcode)),
        // push encoding
        tv(&[H("0105")], &[N(5), O(OP_EQUAL)], Flags::MINIMAL_DATA, Err(MinimalData)),
        tv(&[H("0105")], &[N(5), O(OP_EQUAL)], EMPTY_FLAGS, Ok(())),
        tv(&[H("020100")], &[O(OP_1ADD), N(2), O(OP_NUMEQUAL)], Flags::MINIMAL_DATA, Err(ScriptNum)),
        tv(&[H("020100")], &[O(OP_1ADD), N(2), O(OP_NUMEQUAL)], EMPTY_FLAGS, Ok(())),
        // upgradable NOPs and lock times
        tv(&[N(1)], &[O(OP_NOP1)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(1)], &[O(OP_NOP10)], Flags::DISCOURAGE_UPGRADABLE_NOPS, Err(DiscourageUpgradableNOPs)),
        tv(&[N(1)], &[O(OP_CHECKLOCKTIMEVERIFY)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(0)], &[O(OP_CHECKLOCKTIMEVERIFY)], Flags::CHECKLOCKTIMEVERIFY, Err(UnsatisfiedLockTime)),
        tv(&[N(-1)], &[O(OP_CHECKLOCKTIMEVERIFY)], Flags::CHECKLOCKTIMEVERIFY, Err(NegativeLockTime)),
        tv(&[N(1)], &[O(OP_CHECKSEQUENCEVERIFY)], DEFAULT_FLAGS, Ok(())),
        // signatures
        tv(&[N(0), N(0)], &[O(OP_CHECKSIG), O(OP_NOT)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(0), N(0)], &[O(OP_CHECKSIG), O(OP_NOT)], Flags::STRICT_ENC, Err(PubKeyType)),
        tv(&[N(0), N(0)], &[O(OP_CHECKSIGVERIFY), N(1)], DEFAULT_FLAGS, Err(CheckSigVerify)),
        tv(&[H("023001")], &[N(0), O(OP_CHECKSIG)], Flags::STRICT_ENC, Err(SigDER)),
        tv(&[N(0)], &[N(0), N(0), O(OP_CHECKMULTISIG)], DEFAULT_FLAGS, Ok(())),
        tv(&[N(1)], &[N(0), N(0), O(OP_CHECKMULTISIG)], Flags::NULL_DUMMY, Err(SigNullDummy)),
        tv(&[N(1)], &[N(0), N(0), O(OP_CHECKMULTISIG)], EMPTY_FLAGS, Ok(())),
        tv(
            &[N(0), N(0)],
            &[N(1), A("key"), N(1), O(OP_CHECKMULTISIGVERIFY), N(1)],
            DEFAULT_FLAGS,
            Err(CheckMultisigVerify),
        ),
        tv(&[], &[N(21), O(OP_CHECKMULTISIG)], DEFAULT_FLAGS, Err(PubKeyCount)),
        tv(&[N(0)], &[N(2), N(0), O(OP_CHECKMULTISIG)], DEFAULT_FLAGS, Err(SigCount)),
        // P2SH
        tv(
            &[H("0151")],
            &[O(OP_HASH160), H("14da1745e9b549bd0bfa1a569971c77eba30cd5a4b"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Ok(()),
        ),
        tv(
            &[N(2), N(3), H("03935587")],
            &[O(OP_HASH160), H("149c7d1d4a371634286f4437f7f8a38021ffbb7ca0"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Ok(()),
        ),
        tv(
            &[N(2), N(2), H("03935587")],
            &[O(OP_HASH160), H("149c7d1d4a371634286f4437f7f8a38021ffbb7ca0"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Err(EvalFalse),
        ),
        // without P2SH only the hash is compared
        tv(
            &[N(2), N(2), H("03935587")],
            &[O(OP_HASH160), H("149c7d1d4a371634286f4437f7f8a38021ffbb7ca0"), O(OP_EQUAL)],
            EMPTY_FLAGS,
            Ok(()),
        ),
        tv(
            &[H("0100")],
            &[O(OP_HASH160), H("149f7fd096d37ed2c0e3f7f0cfc924beef4ffceb68"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Err(EvalFalse),
        ),
        tv(
            &[H("0151")],
            &[O(OP_HASH160), H("149f7fd096d37ed2c0e3f7f0cfc924beef4ffceb68"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Err(EvalFalse),
        ),
        tv(
            &[H("016a")],
            &[O(OP_HASH160), H("1441c98a140039816273e50db317422c11c2bfcc88"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Err(OpReturn),
        ),
        tv(
            &[H("014c")],
            &[O(OP_HASH160), H("14c936b4fc84f2b040357e8d63b0955d996eb79c4f"), O(OP_EQUAL)],
            DEFAULT_FLAGS,
            Err(UnknownError),
        ),
        // witness programs with no witness
        tv(
            &[],
            &[N(0), H("144254e2a76ec94641c2d3e4b5528bbb30a350838c")],
            DEFAULT_FLAGS,
            Err(InvalidStackOperation),
        ),
        tv(
            &[],
            &[N(0), H("144254e2a76ec94641c2d3e4b5528bbb30a350838c")],
            Flags::P2SH,
            Ok(()),
        ),
        tv(
            &[],
            &[
                N(0),
                H("204ae81572f06e1b88fd5ced7a1a000945432e83e1551e6f721ee9c00b8cc33260"),
            ],
            DEFAULT_FLAGS,
            Err(WitnessProgramWitnessEmpty),
        ),
    ]
}
