//! The digests Script commits to.

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD-160 of the SHA-256 of `data`. This is what P2PKH and P2SH outputs commit to.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use hex::FromHex;

    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            sha256(b""),
            <[u8; 32]>::from_hex("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap()
        );
        assert_eq!(
            ripemd160(b""),
            <[u8; 20]>::from_hex("9c1185a5c5e9fc54612808977ee8f548b2258d31").unwrap()
        );
        assert_eq!(
            hash160(b""),
            <[u8; 20]>::from_hex("b472a266d0bd89c13706a4132ccfb16f7c3b9fcb").unwrap()
        );
        assert_eq!(
            sha1(b""),
            <[u8; 20]>::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap()
        );
        assert_eq!(hash256(b"hello"), sha256(&sha256(b"hello")));
    }
}
