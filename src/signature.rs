//! Signature handling.
//!
//! The encoding checks here are consensus-relevant, so they are written out rather than
//! delegated to [`ecdsa::Signature::from_der`], which is more permissive in some places and
//! stricter in others.

use secp256k1::{ecdsa, Message, PublicKey, Secp256k1};
use thiserror::Error;

use crate::interpreter::Flags;

/// Below this, lock times are block heights; at or above it, UNIX timestamps.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000; // Tue Nov  5 00:53:20 1985 UTC

pub const PUBLIC_KEY_SIZE: usize = 65;
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Any error that can happen during signature decoding.
#[allow(missing_docs)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum InvalidDerInteger {
    #[error("missing the 0x02 integer encoding byte")]
    NotAnInteger,
    #[error("the integer was expected to be {expected} bytes, but it was {actual} bytes")]
    IncorrectLength { actual: usize, expected: u8 },
    #[error("integers can’t be zero-length")]
    ZeroLength,
    #[error("leading 0x00 bytes are disallowed, unless it would otherwise be interpreted as a negative number.")]
    LeadingNullByte,
    #[error("integers can’t be negative")]
    Negative,
}

/// Errors that occur during decoding of a DER signature.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum InvalidDerEncoding {
    #[error("didn’t start with 0x30, or was missing the length")]
    WrongType,
    #[error("the signature can’t be longer than 70 bytes")]
    TooLong,
    #[error("the signature was expected to be {expected} bytes, but it was {actual} bytes")]
    IncorrectLength { actual: usize, expected: u8 },
    #[error("the {name} component failed: {error}")]
    InvalidComponent {
        name: &'static str,
        error: InvalidDerInteger,
    },
    #[error("the signature isn’t a valid secp256k1 signature")]
    Unparseable,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("signature hash type error: {0:#04x}")]
    SigHashType(u8),

    #[error("signature DER encoding error: {0}")]
    SigDER(InvalidDerEncoding),

    #[error("signature s value is too high")]
    SigHighS,

    #[error("public key is neither compressed nor uncompressed")]
    PubKeyType,
}

/// Checks the properties of individual integers in a DER signature.
fn is_valid_integer(int_bytes: &[u8]) -> Result<(), InvalidDerInteger> {
    match int_bytes {
        [] => Err(InvalidDerInteger::ZeroLength),
        // Null bytes at the start are not allowed, unless it would otherwise be interpreted as
        // a negative number.
        [0x00, next, ..] => {
            if next & 0x80 != 0 {
                Ok(())
            } else {
                Err(InvalidDerInteger::LeadingNullByte)
            }
        }
        // Negative numbers are not allowed.
        [first, ..] => {
            if first & 0x80 == 0 {
                Ok(())
            } else {
                Err(InvalidDerInteger::Negative)
            }
        }
    }
}

/// A canonical signature consists of: <30> <total len> <02> <len R> <R> <02> <len S> <S>
///
/// Where R and S are not negative (their first byte has its highest bit not set), and not
/// excessively padded (do not start with a 0 byte, unless an otherwise negative number follows,
/// in which case a single 0 byte is necessary and even required).
///
/// `sig` excludes the trailing hash type byte.
pub fn is_valid_encoding(sig: &[u8]) -> Result<(), InvalidDerEncoding> {
    let component = |name: &'static str, error: InvalidDerInteger| {
        InvalidDerEncoding::InvalidComponent { name, error }
    };
    match sig {
        [0x30, total_len, content @ ..] => {
            if *total_len > 70 {
                return Err(InvalidDerEncoding::TooLong);
            }
            if usize::from(*total_len) != content.len() {
                return Err(InvalidDerEncoding::IncorrectLength {
                    actual: content.len(),
                    expected: *total_len,
                });
            }
            match content {
                [0x02, r_len, r_s @ ..] if usize::from(*r_len) <= r_s.len() => {
                    match r_s.split_at((*r_len).into()) {
                        (r, [0x02, s_len, s @ ..]) => {
                            is_valid_integer(r).map_err(|e| component("r", e))?;
                            if usize::from(*s_len) != s.len() {
                                return Err(component(
                                    "s",
                                    InvalidDerInteger::IncorrectLength {
                                        actual: s.len(),
                                        expected: *s_len,
                                    },
                                ));
                            }
                            is_valid_integer(s).map_err(|e| component("s", e))
                        }
                        _ => Err(component("s", InvalidDerInteger::NotAnInteger)),
                    }
                }
                [0x02, r_len, r_s @ ..] => Err(component(
                    "r",
                    InvalidDerInteger::IncorrectLength {
                        actual: r_s.len(),
                        expected: *r_len,
                    },
                )),
                _ => Err(component("r", InvalidDerInteger::NotAnInteger)),
            }
        }
        _ => Err(InvalidDerEncoding::WrongType),
    }
}

pub fn is_defined_hash_type(hash_type: u8) -> bool {
    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&(hash_type & !SIGHASH_ANYONECANPAY))
}

pub fn check_low_s(sig: &ecdsa::Signature) -> bool {
    let mut check = *sig;
    check.normalize_s();
    *sig == check
}

/// The encoding rules a signature (with its hash type byte) has to meet under `flags`.
///
/// An empty signature always passes. It's a compact way to provide an invalid signature to
/// CHECK(MULTI)SIG.
pub fn check_signature_encoding(vch_sig: &[u8], flags: Flags) -> Result<(), Error> {
    let Some((hash_type, sig)) = vch_sig.split_last() else {
        return Ok(());
    };
    if flags.intersects(Flags::STRICT_ENC | Flags::LOW_S) {
        is_valid_encoding(sig).map_err(Error::SigDER)?;
    }
    if flags.contains(Flags::LOW_S) {
        let decoded = ecdsa::Signature::from_der(sig)
            .map_err(|_| Error::SigDER(InvalidDerEncoding::Unparseable))?;
        if !check_low_s(&decoded) {
            return Err(Error::SigHighS);
        }
    }
    if flags.contains(Flags::STRICT_ENC) && !is_defined_hash_type(*hash_type) {
        return Err(Error::SigHashType(*hash_type));
    }
    Ok(())
}

pub fn check_pub_key_encoding(pub_key: &[u8], flags: Flags) -> Result<(), Error> {
    if !flags.contains(Flags::STRICT_ENC) {
        return Ok(());
    }
    match pub_key {
        [0x04, ..] if pub_key.len() == PUBLIC_KEY_SIZE => Ok(()),
        [0x02 | 0x03, ..] if pub_key.len() == COMPRESSED_PUBLIC_KEY_SIZE => Ok(()),
        _ => Err(Error::PubKeyType),
    }
}

/// How signature opcodes and lock-time opcodes consult the spending transaction.
///
/// The defaults reject everything.
pub trait SignatureChecker {
    /// `sig` still carries its hash type byte. `sighash` is the digest it must sign.
    fn check_sig(&self, _sig: &[u8], _pub_key: &[u8], _sighash: &[u8; 32]) -> bool {
        false
    }

    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }
}

/// Fails every check.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSignatureChecker;

impl SignatureChecker for NullSignatureChecker {}

/// Verifies ECDSA signatures with secp256k1 and compares lock times against the spending
/// transaction's.
#[derive(Copy, Clone, Debug)]
pub struct TransactionSignatureChecker {
    /// Stored as an `i64` instead of the `u32` used by transactions to avoid partial
    /// conversions when reading from the stack.
    pub lock_time: i64,
    pub is_final: bool,
}

impl TransactionSignatureChecker {
    pub fn verify_signature(sig: &[u8], pub_key: &[u8], sighash: &[u8; 32]) -> bool {
        let Ok(pub_key) = PublicKey::from_slice(pub_key) else {
            return false;
        };
        // libsecp256k1 only verifies low-S signatures, but high-S ones are valid unless
        // `Flags::LOW_S` rejected them already.
        let Ok(mut sig) = ecdsa::Signature::from_der_lax(sig) else {
            return false;
        };
        sig.normalize_s();
        Secp256k1::verification_only()
            .verify_ecdsa(&Message::from_digest(*sighash), &sig, &pub_key)
            .is_ok()
    }
}

impl SignatureChecker for TransactionSignatureChecker {
    fn check_sig(&self, vch_sig: &[u8], pub_key: &[u8], sighash: &[u8; 32]) -> bool {
        match vch_sig.split_last() {
            None => false,
            Some((_hash_type, sig)) => Self::verify_signature(sig, pub_key, sighash),
        }
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        // Block heights and timestamps can't be compared with each other, so the lock time
        // on the stack has to be the same kind as the transaction's.
        let same_kind = (self.lock_time < LOCKTIME_THRESHOLD) == (lock_time < LOCKTIME_THRESHOLD);
        // A final transaction ignores its lock time, which would bypass the check.
        same_kind && lock_time <= self.lock_time && !self.is_final
    }
}

#[cfg(test)]
mod tests {
    use hex::FromHex;
    use secp256k1::SecretKey;

    use super::*;

    lazy_static::lazy_static! {
        static ref SIG: Vec<u8> = Vec::from_hex("3045022100d2ab3e6258fe244fa442cfb38f6cef9ac9a18c54e70b2f508e83fa87e20d040502200eead947521de943831d07a350e45af8e36c2166984a8636f0a8811ff03ed09401").expect("valid hex");
    }

    #[test]
    fn accepts_canonical_der() {
        let (_, sig) = SIG.split_last().unwrap();
        assert_eq!(is_valid_encoding(sig), Ok(()));
        assert_eq!(
            check_signature_encoding(&SIG, Flags::STRICT_ENC | Flags::LOW_S),
            Ok(())
        );
        assert_eq!(check_signature_encoding(&[], Flags::all()), Ok(()));
    }

    #[test]
    fn rejects_malformed_der() {
        assert_eq!(
            is_valid_encoding(&[0x31, 0x00]),
            Err(InvalidDerEncoding::WrongType)
        );
        assert_eq!(
            is_valid_encoding(&[0x30, 0x03, 0x02, 0x01]),
            Err(InvalidDerEncoding::IncorrectLength {
                actual: 2,
                expected: 3
            })
        );
        // negative r
        assert_eq!(
            is_valid_encoding(&[0x30, 0x06, 0x02, 0x01, 0x80, 0x02, 0x01, 0x01]),
            Err(InvalidDerEncoding::InvalidComponent {
                name: "r",
                error: InvalidDerInteger::Negative
            })
        );
        // padded s
        assert_eq!(
            is_valid_encoding(&[0x30, 0x07, 0x02, 0x01, 0x01, 0x02, 0x02, 0x00, 0x01]),
            Err(InvalidDerEncoding::InvalidComponent {
                name: "s",
                error: InvalidDerInteger::LeadingNullByte
            })
        );
        // r length runs past the end
        assert!(is_valid_encoding(&[0x30, 0x03, 0x02, 0x05, 0x01]).is_err());
        // malformed signatures only fail when an encoding flag asks for it
        assert_eq!(check_signature_encoding(&[0x31, 0x01], Flags::empty()), Ok(()));
        assert!(matches!(
            check_signature_encoding(&[0x31, 0x01], Flags::STRICT_ENC),
            Err(Error::SigDER(_))
        ));
    }

    #[test]
    fn hash_types() {
        let mut sig = SIG.clone();
        if let Some(last) = sig.last_mut() {
            *last = 0x04;
        }
        assert_eq!(
            check_signature_encoding(&sig, Flags::STRICT_ENC),
            Err(Error::SigHashType(0x04))
        );
        assert!(is_defined_hash_type(SIGHASH_SINGLE | SIGHASH_ANYONECANPAY));
        assert!(!is_defined_hash_type(0x00));
    }

    #[test]
    fn pub_key_types() {
        assert_eq!(check_pub_key_encoding(&[0x05; 3], Flags::empty()), Ok(()));
        assert_eq!(
            check_pub_key_encoding(&[0x05; 33], Flags::STRICT_ENC),
            Err(Error::PubKeyType)
        );
        let mut compressed = [0x11; 33];
        compressed[0] = 0x02;
        assert_eq!(check_pub_key_encoding(&compressed, Flags::STRICT_ENC), Ok(()));
    }

    #[test]
    fn verifies_against_the_sighash() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pub_key = PublicKey::from_secret_key(&secp, &secret).serialize();
        let sighash = [0x07; 32];
        let mut sig = secp
            .sign_ecdsa(&Message::from_digest(sighash), &secret)
            .serialize_der()
            .to_vec();
        sig.push(SIGHASH_ALL);

        let checker = TransactionSignatureChecker {
            lock_time: 0,
            is_final: false,
        };
        assert!(checker.check_sig(&sig, &pub_key, &sighash));
        assert!(!checker.check_sig(&sig, &pub_key, &[0x08; 32]));
        assert!(!checker.check_sig(&[], &pub_key, &sighash));
        assert!(!NullSignatureChecker.check_sig(&sig, &pub_key, &sighash));
    }

    #[test]
    fn lock_times() {
        let checker = TransactionSignatureChecker {
            lock_time: 100,
            is_final: false,
        };
        assert!(checker.check_lock_time(100));
        assert!(checker.check_lock_time(0));
        assert!(!checker.check_lock_time(101));
        assert!(!checker.check_lock_time(LOCKTIME_THRESHOLD));
        let finalized = TransactionSignatureChecker {
            is_final: true,
            ..checker
        };
        assert!(!finalized.check_lock_time(50));
    }
}
