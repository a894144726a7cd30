//! Ed25519 signatures over cell hashes.
//!
//! Only the 32 hash bytes are ever signed, so a signature vouches for a
//! whole tree of cells at once.

use std::fmt;

use cellar_types::Hash;
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Secret half of an Ed25519 key pair.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Public half of an Ed25519 key pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Signature over a [`Hash`]; serialized as 128 hex digits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match hash and key")]
    Mismatch,
    #[error("bytes are not a valid Ed25519 public key")]
    MalformedKey,
    #[error("signature must be 64 bytes, got {0}")]
    MalformedSignature(usize),
}

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    pub fn seed(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, hash: &Hash) -> Signature {
        Signature(self.0.sign(hash.as_bytes()))
    }
}

impl VerifyingKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| SignatureError::MalformedKey)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Strict verification of `signature` over `hash`.
    pub fn check(&self, hash: &Hash, signature: &Signature) -> Result<(), SignatureError> {
        self.0
            .verify(hash.as_bytes(), &signature.0)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::MalformedSignature(bytes.len()))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&arr)))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

/// True if `signature` was made over `hash` by the holder of `key`.
pub fn verify(hash: &Hash, signature: &Signature, key: &VerifyingKey) -> bool {
    key.check(hash, signature).is_ok()
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.public()).finish()
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.to_bytes()[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::digest;

    fn fixed_key() -> SigningKey {
        SigningKey::from_seed([7; 32])
    }

    #[test]
    fn signature_covers_hash_and_key() {
        let key = SigningKey::generate();
        let hash = digest(b"\x31\x02hi");
        let sig = key.sign(&hash);
        assert!(verify(&hash, &sig, &key.public()));
        assert!(!verify(&digest(b"\x31\x02ho"), &sig, &key.public()));
        assert!(!verify(&hash, &sig, &fixed_key().public()));
    }

    #[test]
    fn signing_is_deterministic_per_seed() {
        let hash = digest(b"cell");
        assert_eq!(fixed_key().sign(&hash), fixed_key().sign(&hash));
        assert_eq!(SigningKey::from_seed(fixed_key().seed()).public(), fixed_key().public());
    }

    #[test]
    fn public_key_bytes() {
        let public = fixed_key().public();
        assert_eq!(VerifyingKey::from_bytes(&public.to_bytes()), Ok(public));
    }

    #[test]
    fn signature_length_is_checked() {
        assert_eq!(
            Signature::from_slice(&[0; 63]),
            Err(SignatureError::MalformedSignature(63))
        );
    }

    #[test]
    fn signature_serializes_as_hex() {
        let sig = fixed_key().sign(&digest(b"x"));
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json.len(), 128 + 2);
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
        assert!(serde_json::from_str::<Signature>("\"abcd\"").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let key = fixed_key();
        let shown = format!("{key:?}");
        assert!(!shown.contains(&hex::encode(key.seed())));
    }
}
