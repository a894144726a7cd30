//! Wire format primitives for Cellar.
//!
//! Every cell encoding starts with a one-byte type tag ([`tag`]) followed by
//! a type-specific payload. Integers and counts are written with
//! variable-length coding ([`vlc`]), and decoders read through a bounds-checked
//! [`Reader`] that reports every malformed input as a [`DecodeError`].
//!
//! The constants below are protocol constants: every derived hash depends on
//! them, so they must never change.

pub mod error;
pub mod reader;
pub mod tag;
pub mod vlc;

pub use error::{DecodeError, DecodeResult};
pub use reader::Reader;
pub use tag::TagFamily;

pub use cellar_types::HASH_LENGTH;

/// Length of a hash pointer: the REF tag plus the hash.
pub const REF_LENGTH: usize = 1 + HASH_LENGTH;

/// Largest encoding that is inlined into its parent instead of referenced.
pub const MAX_EMBEDDED_LENGTH: usize = 140;

/// Size of a blob chunk; longer blobs become chunk trees.
pub const CHUNK_LENGTH: usize = 4096;

/// Branching factor of every tree structure.
pub const FANOUT: usize = 16;

/// Maximum number of entries in a hash-trie leaf.
pub const MAP_LEAF_MAX: usize = 16;

/// Maximum UTF-8 length of a symbol or keyword name.
pub const MAX_SYMBOLIC_LENGTH: usize = 128;

/// Maximum length of a single cell encoding.
pub const MAX_ENCODING_LENGTH: usize = 16383;

/// Maximum encoded length of a VLC long.
pub const MAX_VLC_LONG_LENGTH: usize = 10;

/// Maximum encoded length of a VLC count.
pub const MAX_VLC_COUNT_LENGTH: usize = 9;

/// Canonical bit pattern of a NaN double.
pub const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;
