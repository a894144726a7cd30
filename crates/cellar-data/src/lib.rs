//! Content-addressed cells, smart references and persistent collections.
//!
//! Every value in Cellar is an immutable [`Cell`] with a unique canonical
//! encoding; its identity is the BLAKE3 hash of that encoding. Collections
//! are trees of cells linked by [`Ref`]s. Small children are embedded in
//! their parent's encoding, larger ones are written as hash pointers and may
//! be paged out to a [`CellStore`] and fetched back on demand.
//!
//! # Value Types
//!
//! - Primitives: nil, booleans, integers, doubles, chars, addresses,
//!   symbols and keywords
//! - [`Blob`] and [`Str`] -- byte sequences and UTF-8 text, chunked into
//!   trees above 4096 bytes
//! - [`Vector`] and [`List`] -- indexed sequences
//! - [`Map`] and [`Set`] -- hash tries keyed by value hash
//! - [`BlobMap`] -- ordered map over blob keys
//!
//! # Design Rules
//!
//! 1. Equal values have equal encodings, whatever order they were built in.
//! 2. Every update returns a new value; unchanged subtrees are shared.
//! 3. A reference's status only rises.
//! 4. Decoding rejects every non-canonical encoding it can detect locally;
//!    [`Cell::validate`] checks the whole tree.

pub mod blob;
pub mod blob_map;
pub mod cell;
mod decode;
mod display;
mod encode;
pub mod error;
pub mod list;
pub mod map;
pub mod multi;
pub mod refs;
pub mod set;
pub mod store;
pub mod string;
mod trie;
mod validate;
pub mod vector;

// Re-export primary types at crate root for ergonomic imports.
pub use blob::{Blob, BlobNode};
pub use blob_map::{BlobMap, BlobMapNode};
pub use cell::{Cell, CellType, Value};
pub use error::{CellError, CellResult};
pub use list::List;
pub use map::{DiffEntry, Map};
pub use multi::{decode_multi, encode_multi};
pub use refs::Ref;
pub use set::Set;
pub use store::{CellStore, MemoryStore, ObjectCellStore};
pub use string::Str;
pub use trie::{Entry, HashKind, HashNode};
pub use vector::{Vector, VectorNode};

pub use cellar_crypto::{Signature, SigningKey, VerifyingKey};
pub use cellar_types::{Hash, RefStatus};
