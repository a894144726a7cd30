use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use cellar_crypto::{digest, Signature, SigningKey, VerifyingKey};
use cellar_format::{tag, CANONICAL_NAN_BITS, MAX_EMBEDDED_LENGTH, MAX_SYMBOLIC_LENGTH};
use cellar_types::Hash;

use crate::blob::BlobNode;
use crate::blob_map::BlobMapNode;
use crate::error::{CellError, CellResult};
use crate::refs::Ref;
use crate::trie::{HashKind, HashNode};
use crate::vector::VectorNode;

/// Logical content of a cell.
///
/// Collections hold their children as [`Ref`]s so that unchanged subtrees
/// are shared between versions and may be paged out to a store.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    /// Always canonical: every NaN is stored as [`CANONICAL_NAN_BITS`].
    Double(f64),
    Char(char),
    Address(u64),
    Symbol(Arc<str>),
    Keyword(Arc<str>),
    /// UTF-8 text in blob layout; tree children are blob cells.
    Str(BlobNode),
    Blob(BlobNode),
    Vector(VectorNode),
    /// Reversed view of a vector body; children are vector cells.
    List(VectorNode),
    Map(HashNode),
    /// Map node whose values are all the `true` sentinel.
    Set(HashNode),
    BlobMap(BlobMapNode),
}

/// Every concrete cell shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    Nil,
    Boolean,
    Integer,
    Double,
    Char,
    Address,
    Symbol,
    Keyword,
    StringLeaf,
    StringTree,
    BlobLeaf,
    BlobTree,
    VectorLeaf,
    VectorTree,
    ListLeaf,
    ListTree,
    MapLeaf,
    MapTree,
    SetLeaf,
    SetTree,
    BlobMap,
}

impl CellType {
    /// Tag byte this shape is encoded with.
    pub fn tag(self) -> u8 {
        match self {
            Self::Nil => tag::NULL,
            Self::Boolean => tag::TRUE,
            Self::Integer => tag::INTEGER,
            Self::Double => tag::DOUBLE,
            Self::Char => tag::CHAR,
            Self::Address => tag::ADDRESS,
            Self::Symbol => tag::SYMBOL,
            Self::Keyword => tag::KEYWORD,
            Self::StringLeaf | Self::StringTree => tag::STRING,
            Self::BlobLeaf | Self::BlobTree => tag::BLOB,
            Self::VectorLeaf | Self::VectorTree => tag::VECTOR,
            Self::ListLeaf | Self::ListTree => tag::LIST,
            Self::MapLeaf | Self::MapTree => tag::MAP,
            Self::SetLeaf | Self::SetTree => tag::SET,
            Self::BlobMap => tag::BLOB_MAP,
        }
    }

    /// Lower-case name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Char => "char",
            Self::Address => "address",
            Self::Symbol => "symbol",
            Self::Keyword => "keyword",
            Self::StringLeaf => "string-leaf",
            Self::StringTree => "string-tree",
            Self::BlobLeaf => "blob-leaf",
            Self::BlobTree => "blob-tree",
            Self::VectorLeaf => "vector-leaf",
            Self::VectorTree => "vector-tree",
            Self::ListLeaf => "list-leaf",
            Self::ListTree => "list-tree",
            Self::MapLeaf => "map-leaf",
            Self::MapTree => "map-tree",
            Self::SetLeaf => "set-leaf",
            Self::SetTree => "set-tree",
            Self::BlobMap => "blob-map",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) struct CellData {
    value: Value,
    encoding: OnceLock<Bytes>,
    hash: OnceLock<Hash>,
}

/// An immutable, content-addressed value.
///
/// A `Cell` is a cheap handle: cloning shares the value and its memoized
/// encoding and hash. Two cells are equal exactly when their canonical
/// encodings (and therefore their hashes) are equal.
#[derive(Clone)]
pub struct Cell(Arc<CellData>);

impl Cell {
    /// Wrap a value.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(CellData {
            value,
            encoding: OnceLock::new(),
            hash: OnceLock::new(),
        }))
    }

    /// Wrap a value whose canonical encoding is already known.
    pub(crate) fn with_encoding(value: Value, encoding: Bytes) -> Self {
        let cell = Self::new(value);
        let _ = cell.0.encoding.set(encoding);
        cell
    }

    pub fn nil() -> Self {
        Self::new(Value::Nil)
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(Value::Bool(b))
    }

    pub fn integer(x: i64) -> Self {
        Self::new(Value::Integer(x))
    }

    /// A double; NaN payloads are collapsed to the canonical NaN.
    pub fn double(x: f64) -> Self {
        let x = if x.is_nan() {
            f64::from_bits(CANONICAL_NAN_BITS)
        } else {
            x
        };
        Self::new(Value::Double(x))
    }

    pub fn character(c: char) -> Self {
        Self::new(Value::Char(c))
    }

    /// An address.
    ///
    /// # Panics
    ///
    /// Panics if `a > i64::MAX`.
    pub fn address(a: u64) -> Self {
        assert!(a <= i64::MAX as u64, "address {a} out of range");
        Self::new(Value::Address(a))
    }

    /// A symbol.
    ///
    /// # Panics
    ///
    /// Panics if the name is empty or longer than the symbolic limit; use
    /// [`Cell::try_symbol`] for untrusted names.
    pub fn symbol(name: &str) -> Self {
        match Self::try_symbol(name) {
            Ok(cell) => cell,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_symbol(name: &str) -> CellResult<Self> {
        check_name(name)?;
        Ok(Self::new(Value::Symbol(Arc::from(name))))
    }

    /// A keyword.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Cell::symbol`].
    pub fn keyword(name: &str) -> Self {
        match Self::try_keyword(name) {
            Ok(cell) => cell,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_keyword(name: &str) -> CellResult<Self> {
        check_name(name)?;
        Ok(Self::new(Value::Keyword(Arc::from(name))))
    }

    /// The logical value.
    pub fn value(&self) -> &Value {
        &self.0.value
    }

    /// Concrete shape of this cell.
    pub fn cell_type(&self) -> CellType {
        match &self.0.value {
            Value::Nil => CellType::Nil,
            Value::Bool(_) => CellType::Boolean,
            Value::Integer(_) => CellType::Integer,
            Value::Double(_) => CellType::Double,
            Value::Char(_) => CellType::Char,
            Value::Address(_) => CellType::Address,
            Value::Symbol(_) => CellType::Symbol,
            Value::Keyword(_) => CellType::Keyword,
            Value::Str(n) if n.is_leaf() => CellType::StringLeaf,
            Value::Str(_) => CellType::StringTree,
            Value::Blob(n) if n.is_leaf() => CellType::BlobLeaf,
            Value::Blob(_) => CellType::BlobTree,
            Value::Vector(n) if n.is_leaf() => CellType::VectorLeaf,
            Value::Vector(_) => CellType::VectorTree,
            Value::List(n) if n.is_leaf() => CellType::ListLeaf,
            Value::List(_) => CellType::ListTree,
            Value::Map(n) if n.is_leaf() => CellType::MapLeaf,
            Value::Map(_) => CellType::MapTree,
            Value::Set(n) if n.is_leaf() => CellType::SetLeaf,
            Value::Set(_) => CellType::SetTree,
            Value::BlobMap(_) => CellType::BlobMap,
        }
    }

    /// First byte of the encoding.
    pub fn tag(&self) -> u8 {
        match &self.0.value {
            Value::Bool(false) => tag::FALSE,
            _ => self.cell_type().tag(),
        }
    }

    /// Canonical encoding, computed once.
    pub fn encoding(&self) -> Bytes {
        self.0
            .encoding
            .get_or_init(|| crate::encode::encode_value(&self.0.value))
            .clone()
    }

    /// Content hash: the digest of the canonical encoding, computed once.
    pub fn hash(&self) -> Hash {
        *self.0.hash.get_or_init(|| digest(&self.encoding()))
    }

    /// Sign the content hash; the signature covers every descendant.
    pub fn sign(&self, key: &SigningKey) -> Signature {
        key.sign(&self.hash())
    }

    pub fn verify_signature(&self, signature: &Signature, key: &VerifyingKey) -> bool {
        cellar_crypto::verify(&self.hash(), signature, key)
    }

    /// Returns `true` if this value is written inline into its parent.
    pub fn is_embedded(&self) -> bool {
        self.encoding().len() <= MAX_EMBEDDED_LENGTH
    }

    /// Number of child references.
    pub fn ref_count(&self) -> usize {
        let mut n = 0;
        self.0.value.for_each_ref(&mut |_| n += 1);
        n
    }

    /// Child reference `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.ref_count()`.
    pub fn get_ref(&self, i: usize) -> Ref {
        let mut seen = 0;
        let mut found = None;
        self.0.value.for_each_ref(&mut |r| {
            if seen == i {
                found = Some(r.clone());
            }
            seen += 1;
        });
        match found {
            Some(r) => r,
            None => panic!("ref index {i} out of range for {seen} refs"),
        }
    }

    /// All child references in encoding order.
    pub fn refs(&self) -> Vec<Ref> {
        let mut refs = Vec::new();
        self.0.value.for_each_ref(&mut |r| refs.push(r.clone()));
        refs
    }

    /// Rewrite every child reference through `f`.
    ///
    /// `f` must return a reference to the same value (same hash). Returns
    /// this cell itself if `f` returned every reference unchanged.
    pub fn update_refs(&self, mut f: impl FnMut(&Ref) -> Ref) -> Cell {
        match self.try_update_refs(|r| Ok::<_, Infallible>(f(r))) {
            Ok(cell) => cell,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`Cell::update_refs`].
    pub fn try_update_refs<E>(
        &self,
        mut f: impl FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Cell, E> {
        let updated = self.0.value.map_refs(&mut |r: &Ref| {
            let next = f(r)?;
            debug_assert_eq!(next.hash(), r.hash(), "ref update changed the referenced value");
            Ok(next)
        })?;
        Ok(match updated {
            None => self.clone(),
            Some(value) => Cell(Arc::new(CellData {
                value,
                encoding: self.0.encoding.clone(),
                hash: self.0.hash.clone(),
            })),
        })
    }

    /// A direct reference to this cell.
    pub fn to_ref(&self) -> Ref {
        Ref::direct(self.clone())
    }

    /// Returns `true` if both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Decode a single self-contained encoding.
    ///
    /// Children written as hash pointers become soft references with no
    /// store; resolving them fails with missing data unless they are
    /// supplied another way.
    pub fn decode(bytes: impl Into<Bytes>) -> CellResult<Cell> {
        crate::decode::decode_cell(bytes.into(), None)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.0.value {
            Value::Integer(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.0.value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.0.value, Value::Nil)
    }

    pub(crate) fn downgrade(&self) -> Weak<CellData> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<CellData>) -> Option<Cell> {
        weak.upgrade().map(Cell)
    }
}

fn check_name(name: &str) -> CellResult<()> {
    if name.is_empty() || name.len() > MAX_SYMBOLIC_LENGTH {
        return Err(CellError::InvalidName(format!(
            "name length {} outside 1..={MAX_SYMBOLIC_LENGTH}",
            name.len()
        )));
    }
    Ok(())
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Cell::hash(self).hash(state);
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({} {})", self.cell_type(), self.hash().short_hex())
    }
}

impl From<i64> for Cell {
    fn from(x: i64) -> Self {
        Cell::integer(x)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::boolean(b)
    }
}

impl From<char> for Cell {
    fn from(c: char) -> Self {
        Cell::character(c)
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Cell::double(x)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        crate::string::Str::new(s).into_cell()
    }
}

impl Value {
    /// Visit every child reference in encoding order.
    pub(crate) fn for_each_ref(&self, f: &mut dyn FnMut(&Ref)) {
        match self {
            Value::Str(n) | Value::Blob(n) => n.for_each_ref(f),
            Value::Vector(n) | Value::List(n) => n.for_each_ref(f),
            Value::Map(n) => n.for_each_ref(HashKind::Map, f),
            Value::Set(n) => n.for_each_ref(HashKind::Set, f),
            Value::BlobMap(n) => n.for_each_ref(f),
            _ => {}
        }
    }

    /// Rebuild with every child reference passed through `f`.
    ///
    /// Returns `None` if no reference changed identity.
    pub(crate) fn map_refs<E>(
        &self,
        f: &mut dyn FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Option<Value>, E> {
        let mut changed = false;
        let mut track = |r: &Ref| -> Result<Ref, E> {
            let next = f(r)?;
            if !next.ptr_eq(r) {
                changed = true;
            }
            Ok(next)
        };
        let value = match self {
            Value::Str(n) => Value::Str(n.map_refs(&mut track)?),
            Value::Blob(n) => Value::Blob(n.map_refs(&mut track)?),
            Value::Vector(n) => Value::Vector(n.map_refs(&mut track)?),
            Value::List(n) => Value::List(n.map_refs(&mut track)?),
            Value::Map(n) => Value::Map(n.map_refs(HashKind::Map, &mut track)?),
            Value::Set(n) => Value::Set(n.map_refs(HashKind::Set, &mut track)?),
            Value::BlobMap(n) => Value::BlobMap(n.map_refs(&mut track)?),
            _ => return Ok(None),
        };
        Ok(changed.then_some(value))
    }
}
