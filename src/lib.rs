//! Bitcoin Script: a codec for the command sequence and an interpreter that evaluates a
//! combined unlocking and locking script to a boolean, including P2SH and segwit v0 expansion.

#![doc(html_root_url = "https://docs.rs/bitcoin_script/0.1.0")]
#![allow(clippy::unit_arg)]

#[macro_use]
extern crate enum_primitive;

pub mod address;
pub mod buffer;
pub mod hash;
pub mod interpreter;
pub mod num;
pub mod opcode;
pub mod script;
pub mod script_error;
pub mod signature;
pub mod stack;
pub mod varint;

#[cfg(any(test, feature = "test-dependencies"))]
pub mod test_vectors;

pub use interpreter::{Flags, Interpreter, Limits};
pub use opcode::Opcode;
pub use script::{Command, Script};
pub use script_error::{ErrorSink, ScriptError};

use signature::SignatureChecker;

/// Verifies that `script_sig` (with `witness`, for segwit spends) satisfies `script_pub_key`.
///
/// The two scripts are evaluated as one, unlocking script first. With `Flags::SIG_PUSH_ONLY`
/// the unlocking script may only push data.
pub fn verify_script(
    script_sig: &Script,
    script_pub_key: &Script,
    witness: Vec<Vec<u8>>,
    sighash: [u8; 32],
    flags: Flags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if flags.contains(Flags::SIG_PUSH_ONLY) && !script_sig.is_push_only() {
        return Err(ScriptError::SigPushOnly);
    }
    let mut sink = ErrorSink::new();
    let ok = Interpreter::new(script_sig.add(script_pub_key), sighash, witness, &mut sink)
        .with_flags(flags)
        .with_checker(checker)
        .evaluate_script();
    match (ok, sink.get()) {
        (true, _) => Ok(()),
        (false, Some(code)) => Err(code),
        (false, None) => Err(ScriptError::UnknownError),
    }
}

/// Test-specific code that is also useful to downstream crates.
#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use hex::FromHex;
    use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

    use crate::{
        opcode::Opcode::*,
        signature::{TransactionSignatureChecker, SIGHASH_ALL},
        Command, Script,
    };

    lazy_static::lazy_static! {
        /// The P2SH redeem script used for the static test case: 2 of 3 multisig.
        pub static ref REDEEM_SCRIPT: Script = Script::from_commands(vec![
            OP_2.into(),
            Command::push(&<[u8; 0x21]>::from_hex("03b2cc71d23eb30020a4893982a1e2d352da0d20ee657fa02901c432758909ed8f").expect("valid key")),
            Command::push(&<[u8; 0x21]>::from_hex("029d1e9a9354c0d2aee9ffd0f0cea6c39bbf98c4066cf143115ba2279d0ba7dabe").expect("valid key")),
            Command::push(&<[u8; 0x21]>::from_hex("03e32096b63fd57f3308149d238dcbb24d8d28aad95c0e4e74e3e5e6a11b61bcc4").expect("valid key")),
            OP_3.into(),
            OP_CHECKMULTISIG.into(),
        ]);
        /// The scriptPubkey used for the static test case.
        pub static ref SCRIPT_PUBKEY: Script =
            Script::p2sh_from_redeem(&REDEEM_SCRIPT).expect("redeem script encodes");
        /// The scriptSig used for the static test case.
        pub static ref SCRIPT_SIG: Script = Script::from_commands(vec![
            OP_0.into(),
            Command::push(&<[u8; 0x48]>::from_hex("3045022100d2ab3e6258fe244fa442cfb38f6cef9ac9a18c54e70b2f508e83fa87e20d040502200eead947521de943831d07a350e45af8e36c2166984a8636f0a8811ff03ed09401").expect("valid sig")),
            Command::push(&<[u8; 0x47]>::from_hex("3044022013e15d865010c257eef133064ef69a780b4bc7ebe6eda367504e806614f940c3022062fdbc8c2d049f91db2042d6c9771de6f1ef0b3b1fea76c1ab5542e44ed29ed801").expect("valid sig")),
            Command::push(&REDEEM_SCRIPT.to_bytes().expect("redeem script encodes")),
        ]);
    }

    /// The correct sighash for the static test case.
    pub fn sighash() -> [u8; 32] {
        <[u8; 32]>::from_hex("e8c7bdac77f6bb1f3aba2eaa1fada551a9c8b3b5ecd1ef86e6e58a5f1aab952c")
            .expect("valid hash")
    }

    /// An incorrect sighash for the static test case – for checking failure cases.
    pub fn invalid_sighash() -> [u8; 32] {
        <[u8; 32]>::from_hex("08c7bdac77f6bb1f3aba2eaa1fada551a9c8b3b5ecd1ef86e6e58a5f1aab952c")
            .expect("valid hash")
    }

    /// A checker for a transaction with no lock time.
    pub fn checker() -> TransactionSignatureChecker {
        TransactionSignatureChecker {
            lock_time: 0,
            is_final: false,
        }
    }

    /// A deterministic key pair, with the public key compressed.
    pub fn key_pair(seed: u8) -> (SecretKey, Vec<u8>) {
        let secret = SecretKey::from_slice(&[seed; 32]).expect("seed is a valid secret key");
        let pub_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
        (secret, pub_key.serialize().to_vec())
    }

    /// A DER signature over `sighash`, followed by `SIGHASH_ALL`.
    pub fn sign(secret: &SecretKey, sighash: &[u8; 32]) -> Vec<u8> {
        let mut sig = Secp256k1::signing_only()
            .sign_ecdsa(&Message::from_digest(*sighash), secret)
            .serialize_der()
            .to_vec();
        sig.push(SIGHASH_ALL);
        sig
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        testing::{checker, invalid_sighash, key_pair, sighash, sign, SCRIPT_PUBKEY, SCRIPT_SIG},
        *,
    };
    use crate::{hash, opcode::Opcode::*, signature::NullSignatureChecker};

    #[test]
    fn it_works() {
        let ret = verify_script(
            &SCRIPT_SIG,
            &SCRIPT_PUBKEY,
            vec![],
            sighash(),
            Flags::P2SH | Flags::STRICT_ENC,
            &checker(),
        );
        assert_eq!(ret, Ok(()));
    }

    #[test]
    fn it_fails_on_invalid_sighash() {
        let ret = verify_script(
            &SCRIPT_SIG,
            &SCRIPT_PUBKEY,
            vec![],
            invalid_sighash(),
            Flags::P2SH | Flags::STRICT_ENC,
            &checker(),
        );
        assert_eq!(ret, Err(ScriptError::EvalFalse));
    }

    #[test]
    fn it_fails_without_a_signature_checker() {
        let ret = verify_script(
            &SCRIPT_SIG,
            &SCRIPT_PUBKEY,
            vec![],
            sighash(),
            Flags::default(),
            &NullSignatureChecker,
        );
        assert_eq!(ret, Err(ScriptError::EvalFalse));
    }

    #[test]
    fn pay_to_pub_key_hash() {
        let (secret, pub_key) = key_pair(1);
        let sighash = [0x5a; 32];
        let script_sig =
            Script::from_commands(vec![Command::push(&sign(&secret, &sighash)), Command::push(&pub_key)]);

        assert_eq!(
            verify_script(
                &script_sig,
                &Script::p2pkh_from_pub_key(&pub_key),
                vec![],
                sighash,
                Flags::default() | Flags::STRICT_ENC | Flags::LOW_S,
                &checker(),
            ),
            Ok(())
        );
        // someone else's output
        let (_, other) = key_pair(2);
        assert_eq!(
            verify_script(
                &script_sig,
                &Script::p2pkh_from_pub_key(&other),
                vec![],
                sighash,
                Flags::default(),
                &checker(),
            ),
            Err(ScriptError::EqualVerify)
        );
        // signed for another transaction
        assert_eq!(
            verify_script(
                &script_sig,
                &Script::p2pkh_from_pub_key(&pub_key),
                vec![],
                [0x5b; 32],
                Flags::default(),
                &checker(),
            ),
            Err(ScriptError::EvalFalse)
        );
    }

    #[test]
    fn pay_to_witness_pub_key_hash() {
        let (secret, pub_key) = key_pair(3);
        let sighash = [0x11; 32];
        let script_pub_key = Script::p2wpkh(&hash::hash160(&pub_key));
        let witness = vec![sign(&secret, &sighash), pub_key.clone()];

        assert_eq!(
            verify_script(
                &Script::default(),
                &script_pub_key,
                witness.clone(),
                sighash,
                Flags::default(),
                &checker(),
            ),
            Ok(())
        );
        assert_eq!(
            verify_script(
                &Script::default(),
                &script_pub_key,
                witness,
                [0x12; 32],
                Flags::default(),
                &checker(),
            ),
            Err(ScriptError::EvalFalse)
        );
    }

    #[test]
    fn pay_to_script_hash_wrapped_witness_pub_key_hash() {
        let (secret, pub_key) = key_pair(4);
        let sighash = [0x22; 32];
        let redeem = Script::p2wpkh(&hash::hash160(&pub_key));
        let script_sig = Script::from_commands(vec![Command::push(&redeem.to_bytes().unwrap())]);
        let script_pub_key = Script::p2sh_from_redeem(&redeem).unwrap();

        assert_eq!(
            verify_script(
                &script_sig,
                &script_pub_key,
                vec![sign(&secret, &sighash), pub_key],
                sighash,
                Flags::default() | Flags::SIG_PUSH_ONLY,
                &checker(),
            ),
            Ok(())
        );
    }

    #[test]
    fn pay_to_witness_script_hash() {
        let (secret, pub_key) = key_pair(5);
        let sighash = [0x33; 32];
        let witness_script =
            Script::from_commands(vec![Command::push(&pub_key), OP_CHECKSIG.into()])
                .to_bytes()
                .unwrap();
        let script_pub_key = Script::p2wsh(&hash::sha256(&witness_script));

        assert_eq!(
            verify_script(
                &Script::default(),
                &script_pub_key,
                vec![sign(&secret, &sighash), witness_script.clone()],
                sighash,
                Flags::default(),
                &checker(),
            ),
            Ok(())
        );

        // the program commits to a different script
        let mut tampered = witness_script;
        tampered.push(OP_NOP.into());
        assert_eq!(
            verify_script(
                &Script::default(),
                &script_pub_key,
                vec![sign(&secret, &sighash), tampered],
                sighash,
                Flags::default(),
                &checker(),
            ),
            Err(ScriptError::WitnessProgramMismatch)
        );
    }

    #[test]
    fn sig_push_only() {
        let script_sig = Script::from_commands(vec![OP_1.into(), OP_NOP.into()]);
        let script_pub_key = Script::from_commands(vec![OP_1.into(), OP_EQUAL.into()]);
        assert_eq!(
            verify_script(
                &script_sig,
                &script_pub_key,
                vec![],
                [0; 32],
                Flags::SIG_PUSH_ONLY,
                &NullSignatureChecker,
            ),
            Err(ScriptError::SigPushOnly)
        );
        assert_eq!(
            verify_script(
                &script_sig,
                &script_pub_key,
                vec![],
                [0; 32],
                Flags::empty(),
                &NullSignatureChecker,
            ),
            Ok(())
        );
    }

    #[test]
    fn null_data_outputs_are_unspendable() {
        let bytes = hex::decode("076a0568656c6c6f").unwrap();
        let script_pub_key = Script::parse(&mut &bytes[..]).unwrap();
        assert_eq!(
            verify_script(
                &Script::from_commands(vec![OP_1.into()]),
                &script_pub_key,
                vec![],
                [0; 32],
                Flags::default(),
                &NullSignatureChecker,
            ),
            Err(ScriptError::OpReturn)
        );
    }

    #[test]
    fn run_test_vectors() {
        for tv in test_vectors::test_vectors() {
            if let Err(actual) = tv.run(&|sig, pub_key, flags| {
                verify_script(sig, pub_key, vec![], [0; 32], flags, &NullSignatureChecker)
            }) {
                panic!("{:?} didn’t match the result in {:?}", actual, tv);
            }
        }
    }

    fn push_num(n: i64) -> Command {
        Command::PushData(num::serialize(n))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256, ..ProptestConfig::default()
        })]

        /// A P2SH spend succeeds exactly when its redeem script does.
        #[test]
        fn pay_to_script_hash_matches_redeem_script(
            a in -1000i64..1000,
            b in -1000i64..1000,
            c in -2000i64..2000,
        ) {
            let redeem = Script::from_commands(vec![OP_ADD.into(), push_num(c), OP_NUMEQUAL.into()]);
            let args = Script::from_commands(vec![push_num(a), push_num(b)]);
            let direct = verify_script(
                &args,
                &redeem,
                vec![],
                [0; 32],
                Flags::default(),
                &NullSignatureChecker,
            );
            let script_sig = args.add(&Script::from_commands(vec![
                Command::push(&redeem.to_bytes().unwrap()),
            ]));
            let wrapped = verify_script(
                &script_sig,
                &Script::p2sh_from_redeem(&redeem).unwrap(),
                vec![],
                [0; 32],
                Flags::default(),
                &NullSignatureChecker,
            );
            prop_assert_eq!(direct.is_ok(), a + b == c);
            prop_assert_eq!(wrapped, direct);
        }

        /// Whatever parses can be evaluated, and evaluation always reports a code.
        #[test]
        fn evaluation_always_latches_a_code(
            body in prop::collection::vec(any::<u8>(), 0..200),
            witness in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..4),
            flags in any::<u32>(),
        ) {
            if let Ok(script) = Script::parse_raw(&body) {
                let mut sink = ErrorSink::new();
                let ok = Interpreter::new(script, [0; 32], witness, &mut sink)
                    .with_flags(Flags::from_bits_truncate(flags))
                    .evaluate_script();
                prop_assert!(sink.is_set());
                prop_assert_eq!(ok, sink.is_ok());
            }
        }
    }
}
