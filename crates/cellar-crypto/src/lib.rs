//! Cryptographic primitives for Cellar.
//!
//! Provides the content digest used to identify cells and Ed25519
//! signing/verification over those digests. The data layer treats both as
//! opaque functions.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::digest;
pub use signer::{verify, Signature, SignatureError, SigningKey, VerifyingKey};
