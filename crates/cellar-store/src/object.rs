use bytes::Bytes;
use cellar_crypto::digest;
use cellar_types::{Hash, RefStatus};

use crate::error::{StoreError, StoreResult};

/// A stored encoding together with the status it has reached.
///
/// The store never interprets `encoding`; it is keyed by the hash of these
/// bytes and nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Canonical encoding of the cell.
    pub encoding: Bytes,
    /// Highest status recorded for this encoding.
    pub status: RefStatus,
}

impl StoredObject {
    /// Create a stored object.
    pub fn new(encoding: impl Into<Bytes>, status: RefStatus) -> Self {
        Self {
            encoding: encoding.into(),
            status,
        }
    }

    /// Content hash of the encoding.
    pub fn compute_hash(&self) -> Hash {
        digest(&self.encoding)
    }

    /// Length of the encoding in bytes.
    pub fn size(&self) -> usize {
        self.encoding.len()
    }

    /// Check that the encoding hashes to `expected`.
    pub fn verify(&self, expected: &Hash) -> StoreResult<()> {
        let computed = self.compute_hash();
        if &computed == expected {
            Ok(())
        } else {
            Err(StoreError::HashMismatch {
                expected: *expected,
                computed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_digest_of_encoding() {
        let obj = StoredObject::new(&b"\x31\x03abc"[..], RefStatus::Stored);
        assert_eq!(obj.compute_hash(), digest(b"\x31\x03abc"));
        assert_eq!(obj.size(), 5);
    }

    #[test]
    fn verify_detects_mismatch() {
        let obj = StoredObject::new(&b"payload"[..], RefStatus::Stored);
        assert!(obj.verify(&digest(b"payload")).is_ok());
        let err = obj.verify(&digest(b"other")).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }
}
