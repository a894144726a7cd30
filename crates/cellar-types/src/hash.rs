use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of a content hash.
pub const HASH_LENGTH: usize = 32;

/// Content hash of a cell's canonical encoding.
///
/// Two cells are equal exactly when their hashes are equal, so a `Hash` is
/// both an identifier and an equality witness. The hash is also the key
/// source for hash-array-mapped tries: [`Hash::digit`] exposes it as a
/// sequence of 64 hex digits, high nibble first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// Number of hex digits in a hash.
    pub const DIGITS: usize = HASH_LENGTH * 2;

    /// Create a `Hash` from a pre-computed digest.
    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The null hash (all zeros). Never the digest of a real encoding.
    pub const fn null() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Returns `true` if this is the null hash.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Create a `Hash` from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LENGTH] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Hex digit `i` of the hash (0..64), high nibble of each byte first.
    ///
    /// # Panics
    ///
    /// Panics if `i >= 64`.
    pub fn digit(&self, i: usize) -> u8 {
        let byte = self.0[i / 2];
        if i % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    /// Number of leading hex digits shared with `other`.
    pub fn common_digits(&self, other: &Hash) -> usize {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let diff = a ^ b;
            if diff != 0 {
                return i * 2 + usize::from(diff & 0xF0 == 0);
            }
        }
        Self::DIGITS
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; HASH_LENGTH]> for Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LENGTH] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Hash {
        let mut bytes = [0u8; HASH_LENGTH];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        Hash::new(bytes)
    }

    #[test]
    fn null_is_all_zeros() {
        let null = Hash::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; HASH_LENGTH]);
        assert!(!sample().is_null());
    }

    #[test]
    fn hex_roundtrip() {
        let h = sample();
        let parsed = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Hash::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: HASH_LENGTH,
                actual: 2
            }
        );
        assert!(matches!(Hash::from_hex("zz"), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn digits_read_high_nibble_first() {
        let mut bytes = [0u8; HASH_LENGTH];
        bytes[0] = 0xAB;
        bytes[31] = 0x0F;
        let h = Hash::new(bytes);
        assert_eq!(h.digit(0), 0xA);
        assert_eq!(h.digit(1), 0xB);
        assert_eq!(h.digit(2), 0x0);
        assert_eq!(h.digit(62), 0x0);
        assert_eq!(h.digit(63), 0xF);
    }

    #[test]
    fn common_digits_counts_nibbles() {
        let a = Hash::new([0x12; HASH_LENGTH]);
        let mut b_bytes = [0x12; HASH_LENGTH];
        b_bytes[3] = 0x13;
        let b = Hash::new(b_bytes);
        assert_eq!(a.common_digits(&b), 7);
        b_bytes[3] = 0x22;
        assert_eq!(a.common_digits(&Hash::new(b_bytes)), 6);
        assert_eq!(a.common_digits(&a), Hash::DIGITS);
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(sample().short_hex().len(), 8);
    }

    #[test]
    fn display_is_full_hex() {
        let h = sample();
        let display = format!("{h}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, h.to_hex());
    }

    #[test]
    fn serde_roundtrip() {
        let h = sample();
        let json = serde_json::to_string(&h).unwrap();
        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = Hash::new([0; HASH_LENGTH]);
        let b = Hash::new([1; HASH_LENGTH]);
        assert!(a < b);
    }

    proptest! {
        #[test]
        fn prop_digits_reassemble_bytes(bytes in any::<[u8; HASH_LENGTH]>()) {
            let h = Hash::new(bytes);
            for (i, byte) in bytes.iter().enumerate() {
                prop_assert_eq!((h.digit(2 * i) << 4) | h.digit(2 * i + 1), *byte);
            }
        }
    }
}
