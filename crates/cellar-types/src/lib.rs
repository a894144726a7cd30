//! Foundation types for Cellar.
//!
//! This crate provides the identity and status types used throughout the
//! Cellar data layer. Every other Cellar crate depends on `cellar-types`.
//!
//! # Key Types
//!
//! - [`Hash`] -- 32-byte content hash identifying a cell by its encoding
//! - [`RefStatus`] -- monotonic persistence-status lattice of a reference

pub mod error;
pub mod hash;
pub mod status;

pub use error::TypeError;
pub use hash::{Hash, HASH_LENGTH};
pub use status::RefStatus;
