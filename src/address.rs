//! Base58Check addresses for the output templates that have one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn pub_key_hash_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Regtest => 0x6f,
        }
    }

    pub fn script_hash_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Regtest => 0xc4,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("invalid base58check encoding: {0}")]
    Base58(String),

    #[error("expected a 21-byte payload, got {0} bytes")]
    InvalidLength(usize),

    #[error("unknown version byte {0:#04x}")]
    UnknownVersion(u8),
}

/// Where an output sends its value.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Address {
    PubKeyHash { network: Network, hash: [u8; 20] },
    ScriptHash { network: Network, hash: [u8; 20] },
    /// Null-data outputs can't be spent, so they don't have a real address. This stands in
    /// for one.
    NullData { data: Vec<u8> },
}

impl Address {
    /// The version byte followed by the hash, which is what gets Base58Check-encoded.
    pub fn payload(&self) -> Option<Vec<u8>> {
        let (prefix, hash) = match self {
            Address::PubKeyHash { network, hash } => (network.pub_key_hash_prefix(), hash),
            Address::ScriptHash { network, hash } => (network.script_hash_prefix(), hash),
            Address::NullData { .. } => return None,
        };
        let mut payload = Vec::with_capacity(21);
        payload.push(prefix);
        payload.extend_from_slice(hash);
        Some(payload)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Some(payload) => f.write_str(&base58ck::encode_check(&payload)),
            None => f.write_str("nulldata"),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Regtest shares its version bytes with testnet, so those decode as testnet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = base58ck::decode_check(s).map_err(|e| Error::Base58(e.to_string()))?;
        let (version, hash) = match payload.split_first() {
            Some((version, hash)) if hash.len() == 20 => (*version, hash),
            _ => return Err(Error::InvalidLength(payload.len())),
        };
        let mut bytes = [0; 20];
        bytes.copy_from_slice(hash);
        match version {
            0x00 => Ok(Address::PubKeyHash {
                network: Network::Mainnet,
                hash: bytes,
            }),
            0x05 => Ok(Address::ScriptHash {
                network: Network::Mainnet,
                hash: bytes,
            }),
            0x6f => Ok(Address::PubKeyHash {
                network: Network::Testnet,
                hash: bytes,
            }),
            0xc4 => Ok(Address::ScriptHash {
                network: Network::Testnet,
                hash: bytes,
            }),
            other => Err(Error::UnknownVersion(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_on_mainnet() {
        let address = Address::PubKeyHash {
            network: Network::Mainnet,
            hash: [0; 20],
        };
        assert_eq!(address.to_string(), "1111111111111111111114oLvT2");
        assert_eq!("1111111111111111111114oLvT2".parse(), Ok(address));
    }

    #[test]
    fn prefixes_pick_the_leading_character() {
        let p2sh = Address::ScriptHash {
            network: Network::Mainnet,
            hash: [0x42; 20],
        };
        assert!(p2sh.to_string().starts_with('3'));
        let testnet = Address::PubKeyHash {
            network: Network::Testnet,
            hash: [0x42; 20],
        };
        let encoded = testnet.to_string();
        assert!(encoded.starts_with('m') || encoded.starts_with('n'));
        assert_eq!(encoded.parse::<Address>(), Ok(testnet));
        assert_eq!(
            Address::ScriptHash {
                network: Network::Regtest,
                hash: [0x42; 20]
            }
            .to_string()
            .parse::<Address>(),
            Ok(Address::ScriptHash {
                network: Network::Testnet,
                hash: [0x42; 20]
            })
        );
    }

    #[test]
    fn null_data_placeholder() {
        let address = Address::NullData { data: vec![1, 2] };
        assert_eq!(address.payload(), None);
        assert_eq!(address.to_string(), "nulldata");
    }

    #[test]
    fn rejects_bad_strings() {
        assert!(matches!(
            "1111111111111111111114oLvT3".parse::<Address>(),
            Err(Error::Base58(_))
        ));
        let short = base58ck::encode_check(&[0x00, 1, 2, 3]);
        assert_eq!(short.parse::<Address>(), Err(Error::InvalidLength(4)));
        let mut unknown = vec![0x30];
        unknown.extend_from_slice(&[0; 20]);
        assert_eq!(
            base58ck::encode_check(&unknown).parse::<Address>(),
            Err(Error::UnknownVersion(0x30))
        );
    }
}
