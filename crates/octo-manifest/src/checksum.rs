//! Object checksums
//!
//! Provides [`Checksum`], the strongly-typed 16-byte MD5 digest every
//! manifest record declares for its payload.

use md5::{Digest, Md5};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 16-byte MD5 digest
///
/// Manifests carry it as a lowercase hex string. Immutable and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Create a checksum from raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Create checksum from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 16 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChecksumError> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| ChecksumError::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Compute the MD5 digest of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    /// Check whether `data` hashes to this checksum
    #[inline]
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing checksums
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChecksumError {
    /// Invalid digest length
    #[error("invalid digest length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_known_vector() {
        // RFC 1321 test suite
        assert_eq!(
            Checksum::compute(b"abc").to_string(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn parse_accepts_uppercase_hex() {
        let lower: Checksum = "900150983cd24fb0d6963f7d28e17f72".parse().unwrap();
        let upper: Checksum = "900150983CD24FB0D6963F7D28E17F72".parse().unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let result = "9001".parse::<Checksum>();
        assert!(matches!(
            result,
            Err(ChecksumError::InvalidLength { expected: 16, actual: 2 })
        ));
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(matches!(
            "zz".parse::<Checksum>(),
            Err(ChecksumError::HexDecode(_))
        ));
    }

    #[test]
    fn hex_errors_compare_by_value() {
        assert_eq!(
            "zz".parse::<Checksum>().unwrap_err(),
            ChecksumError::HexDecode(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
    }

    #[test]
    fn matches_detects_tampering() {
        let sum = Checksum::compute(b"payload");
        assert!(sum.matches(b"payload"));
        assert!(!sum.matches(b"payload!"));
    }

    #[test]
    fn serde_as_hex_string() {
        let sum = Checksum::compute(b"abc");
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json, "\"900150983cd24fb0d6963f7d28e17f72\"");
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sum);
    }
}
