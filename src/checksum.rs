//! Digest utilities: kernel identity hashes and record checksums

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// How `(name, version)` is encoded before hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HashScheme {
    /// `name ++ version` with no separator.
    ///
    /// ("AB", "C") and ("A", "BC") hash identically.
    #[default]
    Concatenated,
    /// Each field prefixed with its byte length as a big-endian u64
    LengthPrefixed,
}

/// SHA256 identity of a kernel version, independent of its bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityHash([u8; 32]);

impl IdentityHash {
    /// Hash a `(name, version)` pair under the given scheme
    pub fn compute(name: &str, version: &str, scheme: HashScheme) -> Self {
        let mut hasher = Sha256::new();
        match scheme {
            HashScheme::Concatenated => {
                hasher.update(name.as_bytes());
                hasher.update(version.as_bytes());
            }
            HashScheme::LengthPrefixed => {
                hasher.update((name.len() as u64).to_be_bytes());
                hasher.update(name.as_bytes());
                hasher.update((version.len() as u64).to_be_bytes());
                hasher.update(version.as_bytes());
            }
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex with a `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA256 checksum for persisted record content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }

    /// Compute checksum over the compact JSON encoding of a value
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self> {
        let canonical = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(&canonical))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a value still matches this checksum
    pub fn verify_json<T: Serialize>(&self, value: &T) -> Result<bool> {
        Ok(Self::from_json(value)? == *self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
