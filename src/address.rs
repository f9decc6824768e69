//! Address-like identifiers
//!
//! One 20-byte type serves as implementation identifier, caller identity and
//! kernel instance address. The all-zero address means "absent".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::KernelError;

/// Number of bytes in an address
pub const ADDRESS_LEN: usize = 20;

/// Opaque 20-byte address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The absent address
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Derive the address of the `sequence`-th deployment made by `deployer`.
    ///
    /// The first 20 bytes of `SHA-256(deployer ++ sequence_be)`.
    pub fn derive(deployer: &Address, sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(deployer.0);
        hasher.update(sequence.to_be_bytes());
        let hash = hasher.finalize();

        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hash[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Lowercase hex without the `0x` prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = KernelError;

    /// Parse a 40-digit hex string, with or without the `0x` prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.len() != ADDRESS_LEN * 2 {
            return Err(KernelError::InvalidAddress(format!(
                "'{}' must be {} hex digits",
                s,
                ADDRESS_LEN * 2
            )));
        }

        let decoded =
            hex::decode(digits).map_err(|e| KernelError::InvalidAddress(format!("'{}': {}", s, e)))?;
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(Address::default().is_zero());
        assert!(!Address::from_bytes([1; ADDRESS_LEN]).is_zero());
    }

    #[test]
    fn test_parse_and_display() {
        let text = "0x00000000000000000000000000000000000000ab";
        let address: Address = text.parse().unwrap();
        assert_eq!(address.as_bytes()[19], 0xab);
        assert_eq!(address.to_string(), text);

        let unprefixed: Address = "00000000000000000000000000000000000000AB".parse().unwrap();
        assert_eq!(unprefixed, address);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!("0x1234".parse::<Address>(), Err(KernelError::InvalidAddress(_))));
        assert!(matches!(
            "0xzz000000000000000000000000000000000000ab".parse::<Address>(),
            Err(KernelError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let deployer = Address::from_bytes([7; ADDRESS_LEN]);
        assert_eq!(Address::derive(&deployer, 0), Address::derive(&deployer, 0));
        assert_ne!(Address::derive(&deployer, 0), Address::derive(&deployer, 1));
        assert_ne!(
            Address::derive(&deployer, 0),
            Address::derive(&Address::ZERO, 0)
        );
    }

    #[test]
    fn test_serde_as_string() {
        let address = Address::from_bytes([0xff; ADDRESS_LEN]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
