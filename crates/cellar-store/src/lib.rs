//! Hash-keyed encoding storage for Cellar.
//!
//! A store maps the content hash of a cell to its canonical encoding and the
//! persistence status that encoding has reached. The store never interprets
//! encodings; decoding and the recursive persistence walk live in
//! `cellar-data`.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Rules
//!
//! 1. An encoding is immutable once written; rewriting the same hash only
//!    raises its status.
//! 2. Statuses never decrease.
//! 3. Only the storable statuses (`Stored` through `Announced`) are recorded.
//! 4. Concurrent reads are always safe.

pub mod config;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::StoredObject;
pub use traits::ObjectStore;
