//! Byte sequences.
//!
//! Blobs up to [`CHUNK_LENGTH`] bytes are single leaves sharing their
//! storage with the buffer they were built from. Longer blobs are trees of
//! 2..=16 children; every child covers `CHUNK_LENGTH * 16^k` bytes (the
//! largest such size strictly below the blob length) except the last, which
//! may be short. Strings use the same machinery.

mod tree;

use std::fmt;

use bytes::Bytes;
use cellar_format::CHUNK_LENGTH;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

pub(crate) use tree::child_length;

const CHUNK_DIGITS: usize = CHUNK_LENGTH * 2;

/// Shape of a blob or string value.
#[derive(Clone, Debug)]
pub enum BlobNode {
    Leaf(Bytes),
    Tree { count: u64, children: Vec<Ref> },
}

impl BlobNode {
    /// Build the canonical node for `bytes`.
    pub fn from_bytes(bytes: Bytes) -> Self {
        tree::build(bytes)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Leaf(bytes) => bytes.len() as u64,
            Self::Tree { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `CHUNK_LENGTH` chunks.
    pub fn chunk_count(&self) -> u64 {
        self.len().div_ceil(CHUNK_LENGTH as u64)
    }

    pub(crate) fn for_each_ref(&self, f: &mut dyn FnMut(&Ref)) {
        if let Self::Tree { children, .. } = self {
            children.iter().for_each(f);
        }
    }

    pub(crate) fn map_refs<E>(
        &self,
        f: &mut dyn FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::Leaf(bytes) => Self::Leaf(bytes.clone()),
            Self::Tree { count, children } => Self::Tree {
                count: *count,
                children: children.iter().map(|c| f(c)).collect::<Result<_, _>>()?,
            },
        })
    }

    pub(crate) fn byte_at(&self, i: u64) -> CellResult<u8> {
        tree::byte_at(self, i)
    }

    pub(crate) fn to_bytes(&self) -> CellResult<Bytes> {
        tree::to_bytes(self)
    }

    pub(crate) fn slice(&self, start: u64, len: u64) -> CellResult<BlobNode> {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len()),
            "slice {start}+{len} out of range for length {}",
            self.len()
        );
        tree::slice(self, start, len)
    }

    pub(crate) fn append(&self, other: &BlobNode) -> CellResult<BlobNode> {
        tree::append(self, other)
    }
}

/// Hex digit `i` of `bytes`, high nibble first.
pub(crate) fn digit_at(bytes: &[u8], i: usize) -> u8 {
    let b = bytes[i / 2];
    if i % 2 == 0 {
        b >> 4
    } else {
        b & 0x0F
    }
}

/// Number of equal hex digits of `a` and `b` from digit `start`, looking at
/// no more than `len` digits and stopping at the end of either input.
pub(crate) fn match_digits(a: &[u8], b: &[u8], start: usize, len: usize) -> usize {
    let end = (start + len).min(a.len() * 2).min(b.len() * 2);
    let mut i = start;
    while i < end {
        if i % 2 == 0 && i + 2 <= end && a[i / 2] == b[i / 2] {
            i += 2;
            continue;
        }
        if digit_at(a, i) != digit_at(b, i) {
            break;
        }
        i += 1;
    }
    i.saturating_sub(start)
}

/// An immutable byte sequence.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Blob(Cell);

impl Blob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(Cell::new(Value::Blob(BlobNode::from_bytes(bytes.into()))))
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Parse an even-length hex string.
    pub fn from_hex(s: &str) -> CellResult<Self> {
        let bytes =
            hex::decode(s).map_err(|e| CellError::invalid(format!("bad hex blob: {e}")))?;
        Ok(Self::new(bytes))
    }

    pub(crate) fn from_node(node: BlobNode) -> Self {
        Self(Cell::new(Value::Blob(node)))
    }

    pub fn node(&self) -> &BlobNode {
        match self.0.value() {
            Value::Blob(node) => node,
            _ => unreachable!("blob wraps a blob value"),
        }
    }

    pub fn as_cell(&self) -> &Cell {
        &self.0
    }

    pub fn to_cell(&self) -> Cell {
        self.0.clone()
    }

    pub fn into_cell(self) -> Cell {
        self.0
    }

    pub fn len(&self) -> u64 {
        self.node().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> u64 {
        self.node().chunk_count()
    }

    /// Chunk `i` as a leaf blob, without materializing the rest.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.chunk_count()`.
    pub fn get_chunk(&self, i: u64) -> CellResult<Blob> {
        assert!(
            i < self.chunk_count(),
            "chunk {i} out of range for {} chunks",
            self.chunk_count()
        );
        match self.node() {
            BlobNode::Leaf(_) => Ok(self.clone()),
            node => tree::get_chunk(node, i),
        }
    }

    /// Byte `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn byte_at(&self, i: u64) -> CellResult<u8> {
        self.node().byte_at(i)
    }

    /// Sub-blob of `len` bytes starting at `start`. Slicing a leaf shares
    /// its storage.
    pub fn slice(&self, start: u64, len: u64) -> CellResult<Blob> {
        if start == 0 && len == self.len() {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().slice(start, len)?))
    }

    /// Concatenation. Complete subtrees of `self` are kept as they are and
    /// only its right edge is rebuilt; the chunks of `other` are reused when
    /// `self` ends on a chunk boundary.
    pub fn append(&self, other: &Blob) -> CellResult<Blob> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        Ok(Self::from_node(self.node().append(other.node())?))
    }

    /// Hex digit `i` (two per byte, high nibble first).
    pub fn hex_digit(&self, i: u64) -> CellResult<u8> {
        let b = self.byte_at(i / 2)?;
        Ok(if i % 2 == 0 { b >> 4 } else { b & 0x0F })
    }

    /// Number of hex digits equal in both blobs starting at digit `start`,
    /// examining at most `len` digits.
    ///
    /// Reads one chunk of each side at a time and stops at the first
    /// difference.
    pub fn hex_match_length(&self, other: &Blob, start: usize, len: usize) -> CellResult<usize> {
        let end = self.digit_end(start, len, other.len() as usize * 2);
        let mut i = start;
        while i < end {
            let c = (i / CHUNK_DIGITS) as u64;
            let theirs = other.get_chunk(c)?;
            let (matched, stop) = self.chunk_match(c, &theirs.to_bytes()?, i, end)?;
            i += matched;
            if i < stop {
                break;
            }
        }
        Ok(i.saturating_sub(start))
    }

    /// [`Blob::hex_match_length`] against raw key bytes.
    pub(crate) fn match_bytes(&self, k: &[u8], start: usize, len: usize) -> CellResult<usize> {
        let end = self.digit_end(start, len, k.len() * 2);
        let mut i = start;
        while i < end {
            let c = i / CHUNK_DIGITS;
            let from = c * CHUNK_LENGTH;
            let window = &k[from..(from + CHUNK_LENGTH).min(k.len())];
            let (matched, stop) = self.chunk_match(c as u64, window, i, end)?;
            i += matched;
            if i < stop {
                break;
            }
        }
        Ok(i.saturating_sub(start))
    }

    fn digit_end(&self, start: usize, len: usize, other_digits: usize) -> usize {
        start
            .saturating_add(len)
            .min(self.len() as usize * 2)
            .min(other_digits)
    }

    /// Digits of chunk `c` matching `theirs` (the other side's bytes at the
    /// same chunk position) from digit `i`, and where the chunk's window
    /// ends.
    fn chunk_match(
        &self,
        c: u64,
        theirs: &[u8],
        i: usize,
        end: usize,
    ) -> CellResult<(usize, usize)> {
        let base = c as usize * CHUNK_DIGITS;
        let stop = end.min(base + CHUNK_DIGITS);
        let ours = self.get_chunk(c)?.to_bytes()?;
        Ok((match_digits(&ours, theirs, i - base, stop - i), stop))
    }

    /// All bytes in one buffer.
    pub fn to_bytes(&self) -> CellResult<Bytes> {
        self.node().to_bytes()
    }

    pub fn to_hex(&self) -> CellResult<String> {
        Ok(hex::encode(self.to_bytes()?))
    }
}

impl From<Bytes> for Blob {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }
}

impl From<Blob> for Cell {
    fn from(blob: Blob) -> Self {
        blob.0
    }
}

impl TryFrom<Cell> for Blob {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        match cell.value() {
            Value::Blob(_) => Ok(Self(cell)),
            _ => Err(CellError::WrongType {
                expected: "blob",
                actual: cell.cell_type(),
            }),
        }
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_hex() {
            Ok(hex) => write!(f, "0x{hex}"),
            Err(_) => write!(f, "#blob[{}]", self.len()),
        }
    }
}

pub(crate) fn expect_blob(cell: &Cell) -> CellResult<&BlobNode> {
    match cell.value() {
        Value::Blob(node) => Ok(node),
        _ => Err(CellError::WrongType {
            expected: "blob",
            actual: cell.cell_type(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;
    use rand::{Rng, SeedableRng};

    fn random_bytes(n: usize, seed: u64) -> Vec<u8> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen()).collect()
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    #[test]
    fn small_blob_is_a_leaf() {
        let b = Blob::from(&b"hello"[..]);
        assert_eq!(b.as_cell().cell_type(), CellType::BlobLeaf);
        assert_eq!(&b.as_cell().encoding()[..], b"\x31\x05hello");
        assert_eq!(b.chunk_count(), 1);
    }

    #[test]
    fn chunk_sized_blob_stays_a_leaf() {
        let b = Blob::from(vec![1u8; CHUNK_LENGTH]);
        assert!(b.node().is_leaf());
        let b = Blob::from(vec![1u8; CHUNK_LENGTH + 1]);
        assert!(!b.node().is_leaf());
        assert_eq!(b.as_cell().ref_count(), 2);
    }

    #[test]
    fn ten_thousand_random_bytes_chunk_by_chunk() {
        let data = random_bytes(10_000, 42);
        let blob = Blob::from(data.clone());
        assert_eq!(blob.as_cell().cell_type(), CellType::BlobTree);
        assert_eq!(blob.chunk_count(), 3);

        let mut rebuilt = Vec::new();
        for i in 0..blob.chunk_count() {
            let chunk = blob.get_chunk(i).unwrap();
            assert!(chunk.node().is_leaf());
            rebuilt.extend_from_slice(&chunk.to_bytes().unwrap());
        }
        assert_eq!(rebuilt, data);
        assert_eq!(blob.get_chunk(2).unwrap().len(), 10_000 - 2 * 4096);
        assert_eq!(blob.byte_at(9_999).unwrap(), data[9_999]);
        assert_eq!(&blob.to_bytes().unwrap()[..], &data[..]);
    }

    #[test]
    fn deep_tree_children_have_power_sizes() {
        let len = CHUNK_LENGTH * 16 * 3 + 10;
        let blob = Blob::from(vec![9u8; len]);
        let BlobNode::Tree { children, .. } = blob.node() else {
            panic!("expected tree");
        };
        assert_eq!(children.len(), 4);
        let first = Blob::try_from(children[0].value().unwrap()).unwrap();
        assert_eq!(first.len(), (CHUNK_LENGTH * 16) as u64);
        let last = Blob::try_from(children[3].value().unwrap()).unwrap();
        assert_eq!(last.len(), 10);
    }

    // -----------------------------------------------------------------------
    // Slicing and appending
    // -----------------------------------------------------------------------

    #[test]
    fn leaf_slice_shares_storage() {
        let bytes = Bytes::from(vec![5u8; 100]);
        let blob = Blob::from(bytes.clone());
        let s = blob.slice(10, 20).unwrap();
        let BlobNode::Leaf(inner) = s.node() else {
            panic!("expected leaf");
        };
        assert_eq!(inner.as_ptr(), bytes[10..].as_ptr());
    }

    #[test]
    fn tree_slice_matches_flat_slice() {
        let data = random_bytes(20_000, 7);
        let blob = Blob::from(data.clone());
        for (start, len) in [(0, 5000), (4000, 300), (4096, 4096), (123, 19_000)] {
            let s = blob.slice(start, len).unwrap();
            assert_eq!(
                &s.to_bytes().unwrap()[..],
                &data[start as usize..(start + len) as usize]
            );
            assert_eq!(s, Blob::from(data[start as usize..(start + len) as usize].to_vec()));
        }
    }

    #[test]
    fn append_is_canonical_and_reuses_chunks() {
        let a = random_bytes(CHUNK_LENGTH * 2, 1);
        let b = random_bytes(5000, 2);
        let ba = Blob::from(a.clone());
        let joined = ba.append(&Blob::from(b.clone())).unwrap();

        let mut flat = a.clone();
        flat.extend_from_slice(&b);
        assert_eq!(joined, Blob::from(flat));

        let first_before = ba.get_chunk(0).unwrap();
        let first_after = joined.get_chunk(0).unwrap();
        assert!(first_before.as_cell().ptr_eq(first_after.as_cell()));
    }

    #[test]
    fn unaligned_append_is_canonical() {
        let a = random_bytes(5000, 3);
        let b = random_bytes(9000, 4);
        let joined = Blob::from(a.clone()).append(&Blob::from(b.clone())).unwrap();
        let mut flat = a;
        flat.extend_from_slice(&b);
        assert_eq!(joined, Blob::from(flat));
    }

    // -----------------------------------------------------------------------
    // Hex digits
    // -----------------------------------------------------------------------

    #[test]
    fn hex_digits_high_nibble_first() {
        let b = Blob::from_hex("cafe").unwrap();
        let digits: Vec<u8> = (0..4).map(|i| b.hex_digit(i).unwrap()).collect();
        assert_eq!(digits, vec![0xC, 0xA, 0xF, 0xE]);
    }

    #[test]
    fn hex_match_length_counts_digits() {
        let a = Blob::from_hex("cafebabe").unwrap();
        let b = Blob::from_hex("cafe00").unwrap();
        assert_eq!(a.hex_match_length(&b, 0, 8).unwrap(), 4);
        assert_eq!(a.hex_match_length(&b, 1, 8).unwrap(), 3);
        assert_eq!(a.hex_match_length(&b, 0, 2).unwrap(), 2);
        let c = Blob::from_hex("cb").unwrap();
        assert_eq!(a.hex_match_length(&c, 0, 8).unwrap(), 1);
    }

    #[test]
    fn hex_match_length_across_chunks() {
        let a = random_bytes(CHUNK_LENGTH * 3 + 500, 9);
        let mut b = a.clone();
        b[CHUNK_LENGTH * 2 + 10] ^= 0x01;
        let (ba, bb) = (Blob::from(a.clone()), Blob::from(b.clone()));
        let diff = (CHUNK_LENGTH * 2 + 10) * 2 + 1;
        assert_eq!(ba.hex_match_length(&bb, 0, usize::MAX).unwrap(), diff);
        assert_eq!(ba.hex_match_length(&bb, 7, diff).unwrap(), diff - 7);
        assert_eq!(ba.hex_match_length(&bb, diff + 1, 100).unwrap(), 100);
        assert_eq!(ba.hex_match_length(&ba, 3, usize::MAX).unwrap(), a.len() * 2 - 3);
        assert_eq!(ba.match_bytes(&b, 0, usize::MAX).unwrap(), diff);

        let short = ba.slice(0, 5000).unwrap();
        assert_eq!(short.hex_match_length(&bb, 0, usize::MAX).unwrap(), 10_000);
        assert_eq!(ba.match_bytes(&a[..5000], 0, usize::MAX).unwrap(), 10_000);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Blob::from_hex("00ff").unwrap().to_string(), "0x00ff");
    }
}
