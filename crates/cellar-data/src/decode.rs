//! Decoding of canonical encodings.
//!
//! The decoder rejects every encoding that [`Cell::encoding`] could not have
//! produced for the value it describes, as far as that can be decided from
//! the bytes at hand. Children written as hash pointers are not fetched;
//! full checks across those boundaries are [`Cell::validate`]'s job.

use std::sync::Arc;

use bytes::Bytes;
use cellar_format::{
    tag, DecodeError, Reader, CANONICAL_NAN_BITS, CHUNK_LENGTH, FANOUT, MAP_LEAF_MAX,
    MAX_EMBEDDED_LENGTH, MAX_ENCODING_LENGTH, MAX_SYMBOLIC_LENGTH,
};
use cellar_types::Hash;

use crate::blob::{child_length, digit_at, match_digits, BlobNode};
use crate::blob_map::{expect_node, BlobMapNode};
use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;
use crate::store::CellStore;
use crate::trie::{node_of, sentinel, Entry, HashKind, HashNode};
use crate::vector::{child_size, VectorNode};

/// Decode exactly one cell from `bytes`.
///
/// Hash-pointer children become soft references resolving through `store`.
pub(crate) fn decode_cell(bytes: Bytes, store: Option<&Arc<dyn CellStore>>) -> CellResult<Cell> {
    if bytes.len() > MAX_ENCODING_LENGTH {
        return Err(DecodeError::TooLong {
            size: bytes.len(),
            max: MAX_ENCODING_LENGTH,
        }
        .into());
    }
    let mut decoder = Decoder::new(&bytes, store);
    let cell = decoder.cell()?;
    decoder.reader.expect_end()?;
    Ok(cell)
}

/// Decode the cell at the start of `bytes`, returning it with the number
/// of bytes its encoding occupies.
pub(crate) fn decode_first(
    bytes: &Bytes,
    store: Option<&Arc<dyn CellStore>>,
) -> CellResult<(Cell, usize)> {
    let mut decoder = Decoder::new(bytes, store);
    let cell = decoder.cell()?;
    let used = decoder.reader.position();
    if used > MAX_ENCODING_LENGTH {
        return Err(DecodeError::TooLong {
            size: used,
            max: MAX_ENCODING_LENGTH,
        }
        .into());
    }
    Ok((cell, used))
}

struct Decoder<'a> {
    input: &'a Bytes,
    reader: Reader<'a>,
    store: Option<&'a Arc<dyn CellStore>>,
}

impl<'a> Decoder<'a> {
    fn new(input: &'a Bytes, store: Option<&'a Arc<dyn CellStore>>) -> Self {
        Self {
            input,
            reader: Reader::new(input),
            store,
        }
    }

    fn cell(&mut self) -> CellResult<Cell> {
        let start = self.reader.position();
        let byte = self.reader.read_u8()?;
        let value = match byte {
            tag::NULL => Value::Nil,
            tag::FALSE => Value::Bool(false),
            tag::TRUE => Value::Bool(true),
            tag::INTEGER => Value::Integer(self.reader.read_vlc_long()?),
            tag::DOUBLE => Value::Double(self.double()?),
            tag::CHAR => Value::Char(self.character()?),
            tag::ADDRESS => {
                let a = self.reader.read_vlc_count()?;
                if a > i64::MAX as u64 {
                    return Err(self.reader.invalid(format!("address {a} out of range")).into());
                }
                Value::Address(a)
            }
            tag::SYMBOL => Value::Symbol(self.name()?),
            tag::KEYWORD => Value::Keyword(self.name()?),
            tag::STRING => {
                let node = self.blob()?;
                if let BlobNode::Leaf(bytes) = &node {
                    if std::str::from_utf8(bytes).is_err() {
                        return Err(self.reader.invalid("string is not valid UTF-8").into());
                    }
                }
                Value::Str(node)
            }
            tag::BLOB => Value::Blob(self.blob()?),
            tag::VECTOR => Value::Vector(self.vector()?),
            tag::LIST => Value::List(self.vector()?),
            tag::MAP => Value::Map(self.hash_node(HashKind::Map)?),
            tag::SET => Value::Set(self.hash_node(HashKind::Set)?),
            tag::BLOB_MAP => Value::BlobMap(self.blob_map()?),
            tag::REF => {
                return Err(DecodeError::InvalidStructure {
                    offset: start,
                    reason: "hash pointer outside a collection".into(),
                }
                .into())
            }
            other => {
                return Err(DecodeError::UnknownTag {
                    tag: other,
                    offset: start,
                }
                .into())
            }
        };
        let encoding = self.input.slice(start..self.reader.position());
        Ok(Cell::with_encoding(value, encoding))
    }

    fn double(&mut self) -> CellResult<f64> {
        let bits = self.reader.read_u64()?;
        let x = f64::from_bits(bits);
        if x.is_nan() && bits != CANONICAL_NAN_BITS {
            return Err(self.reader.non_canonical("NaN with a non-canonical payload").into());
        }
        Ok(x)
    }

    fn character(&mut self) -> CellResult<char> {
        let code = self.reader.read_vlc_count()?;
        u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.reader.invalid(format!("invalid code point {code:#x}")).into())
    }

    fn name(&mut self) -> CellResult<Arc<str>> {
        let len = usize::from(self.reader.read_u8()?);
        if len == 0 || len > MAX_SYMBOLIC_LENGTH {
            return Err(self
                .reader
                .invalid(format!("name length {len} outside 1..={MAX_SYMBOLIC_LENGTH}"))
                .into());
        }
        let bytes = self.reader.read_bytes(len)?;
        let name = std::str::from_utf8(bytes)
            .map_err(|_| CellError::InvalidName("name is not valid UTF-8".into()))?;
        Ok(Arc::from(name))
    }

    /// A child: an inline encoding or a hash pointer.
    fn child(&mut self) -> CellResult<Ref> {
        if self.reader.peek_u8()? == tag::REF {
            self.reader.read_u8()?;
            let hash: Hash = self.reader.read_hash()?;
            return Ok(Ref::soft(hash, self.store.cloned()));
        }
        let start = self.reader.position();
        let cell = self.cell()?;
        let len = self.reader.position() - start;
        if len > MAX_EMBEDDED_LENGTH {
            return Err(DecodeError::NonCanonical {
                offset: start,
                reason: format!("inline child of {len} bytes exceeds the embedding limit"),
            }
            .into());
        }
        Ok(cell.to_ref())
    }

    fn children(&mut self, n: usize) -> CellResult<Vec<Ref>> {
        (0..n).map(|_| self.child()).collect()
    }

    fn blob(&mut self) -> CellResult<BlobNode> {
        let len = self.reader.read_vlc_count()?;
        if len <= CHUNK_LENGTH as u64 {
            let start = self.reader.position();
            self.reader.read_bytes(len as usize)?;
            return Ok(BlobNode::Leaf(self.input.slice(start..self.reader.position())));
        }
        let size = child_length(len);
        let n = len.div_ceil(size);
        let children = self.children(n as usize)?;
        for (i, r) in children.iter().enumerate() {
            let expected = if i as u64 == n - 1 { len - size * (n - 1) } else { size };
            let Some(child) = r.try_value() else { continue };
            if !matches!(child.value(), Value::Blob(node) if node.len() == expected) {
                return Err(self
                    .reader
                    .invalid(format!("blob child {i} is not a chunk of {expected} bytes"))
                    .into());
            }
        }
        Ok(BlobNode::Tree {
            count: len,
            children,
        })
    }

    fn vector(&mut self) -> CellResult<VectorNode> {
        let count = self.reader.read_vlc_count()?;
        let fanout = FANOUT as u64;
        if count <= fanout {
            return Ok(VectorNode::Leaf {
                count,
                items: self.children(count as usize)?,
                prefix: None,
            });
        }
        let tail = count % fanout;
        if tail != 0 {
            let items = self.children(tail as usize)?;
            let prefix = self.child()?;
            self.check_packed(&prefix, count - tail)?;
            return Ok(VectorNode::Leaf {
                count,
                items,
                prefix: Some(prefix),
            });
        }
        let size = child_size(count);
        let n = count.div_ceil(size);
        let children = self.children(n as usize)?;
        for (i, r) in children.iter().enumerate() {
            let expected = if i as u64 == n - 1 { count - size * (n - 1) } else { size };
            self.check_packed(r, expected)?;
        }
        Ok(VectorNode::Tree { count, children })
    }

    /// An inline vector child holds exactly `count` elements.
    fn check_packed(&self, r: &Ref, count: u64) -> CellResult<()> {
        let Some(child) = r.try_value() else {
            return Ok(());
        };
        match child.value() {
            Value::Vector(node) if node.count() == count => Ok(()),
            _ => Err(self
                .reader
                .invalid(format!("vector child is not a packed run of {count} elements"))
                .into()),
        }
    }

    fn hash_node(&mut self, kind: HashKind) -> CellResult<HashNode> {
        let count = self.reader.read_vlc_count()?;
        if count <= MAP_LEAF_MAX as u64 {
            let mut entries: Vec<Entry> = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let at = self.reader.position();
                let key = self.child()?;
                let value = match kind {
                    HashKind::Map => self.child()?,
                    HashKind::Set => sentinel(),
                };
                if entries.last().is_some_and(|prev| prev.key.hash() >= key.hash()) {
                    return Err(DecodeError::NonCanonical {
                        offset: at,
                        reason: "leaf keys out of hash order".into(),
                    }
                    .into());
                }
                entries.push(Entry::new(key, value));
            }
            return Ok(HashNode::Leaf(entries));
        }
        let shift = self.reader.read_u8()?;
        if usize::from(shift) >= Hash::DIGITS {
            return Err(self.reader.invalid(format!("trie shift {shift} out of range")).into());
        }
        let mask = self.reader.read_u16()?;
        if mask == 0 {
            return Err(self.reader.invalid("trie node with no children").into());
        }
        let children = self.children(mask.count_ones() as usize)?;
        let digits = (0..16u8).filter(|d| mask & (1 << d) != 0);
        let mut held = 0u64;
        for (digit, r) in digits.zip(&children) {
            held = held.saturating_add(self.trie_child(kind, r, shift, digit)?);
        }
        let all_inline = children.iter().all(Ref::is_direct);
        if held > count || (all_inline && held != count) {
            return Err(self
                .reader
                .invalid(format!("trie count {count} but children hold {held}"))
                .into());
        }
        Ok(HashNode::Tree {
            count,
            shift,
            mask,
            children,
        })
    }

    /// Entries held by one trie child, counting a hash pointer as one.
    ///
    /// An inline child must be a non-empty node of the same kind sitting
    /// one level below its parent, under the digit it is filed at.
    fn trie_child(&self, kind: HashKind, r: &Ref, shift: u8, digit: u8) -> CellResult<u64> {
        let Some(child) = r.try_value() else {
            return Ok(1);
        };
        let node =
            node_of(kind, &child).map_err(|_| self.reader.invalid("trie child of the wrong type"))?;
        let placed = match node {
            HashNode::Leaf(entries) => {
                !entries.is_empty()
                    && entries
                        .iter()
                        .all(|e| e.key.hash().digit(usize::from(shift)) == digit)
            }
            HashNode::Tree { shift: inner, .. } => *inner == shift + 1,
        };
        if !placed {
            return Err(self
                .reader
                .invalid(format!("trie child misplaced under digit {digit:x}"))
                .into());
        }
        Ok(node.count())
    }

    fn blob_map(&mut self) -> CellResult<BlobMapNode> {
        let count = self.reader.read_vlc_count()?;
        if count == 0 {
            return Ok(BlobMapNode::empty());
        }
        let depth = self.reader.read_vlc_usize()?;
        let prefix_len = self.reader.read_vlc_usize()?;
        let Some(total) = depth.checked_add(prefix_len) else {
            return Err(self.reader.invalid("blob map prefix overflows").into());
        };
        let flag = self.reader.read_u8()?;
        if flag > 1 {
            return Err(self.reader.invalid(format!("entry flag {flag}")).into());
        }
        let key = self.child()?;
        let key_bytes = match key.try_value() {
            Some(cell) => Some(self.check_key(&cell, total, flag == 1)?),
            None => None,
        };
        let value = if flag == 1 { Some(self.child()?) } else { None };
        let mask = self.reader.read_u16()?;
        let children = self.children(mask.count_ones() as usize)?;
        if value.is_none() && children.len() < 2 {
            return Err(self
                .reader
                .non_canonical("blob map node without an entry needs two children")
                .into());
        }
        if children.is_empty() && count != 1 {
            return Err(self.reader.invalid(format!("leaf node with count {count}")).into());
        }
        let mut held = u64::from(value.is_some());
        let digits = (0..16u8).filter(|d| mask & (1 << d) != 0);
        for (digit, r) in digits.zip(&children) {
            let Some(child) = r.try_value() else {
                held = held.saturating_add(1);
                continue;
            };
            let node = expect_node(&child)
                .map_err(|_| self.reader.invalid("blob map child of the wrong type"))?;
            if node.count == 0 || node.depth != total + 1 {
                return Err(self
                    .reader
                    .invalid(format!("blob map child at depth {}, expected {}", node.depth, total + 1))
                    .into());
            }
            let child_key = node.key.as_ref().and_then(Ref::try_value);
            if let (Some(parent), Some(Value::Blob(BlobNode::Leaf(bytes)))) =
                (&key_bytes, child_key.as_ref().map(Cell::value))
            {
                if match_digits(bytes, parent, 0, total) != total || digit_at(bytes, total) != digit {
                    return Err(self
                        .reader
                        .invalid(format!("blob map child outside branch {digit:x}"))
                        .into());
                }
            }
            held = held.saturating_add(node.count);
        }
        let all_inline = children.iter().all(Ref::is_direct);
        if held > count || (all_inline && held != count) {
            return Err(self
                .reader
                .invalid(format!("blob map count {count} but entries hold {held}"))
                .into());
        }
        Ok(BlobMapNode {
            count,
            depth,
            prefix_len,
            key: Some(key),
            value,
            mask,
            children,
        })
    }

    /// The key blob of a blob-map node spells exactly its prefix.
    fn check_key(&self, cell: &Cell, total: usize, has_entry: bool) -> CellResult<Bytes> {
        let Value::Blob(BlobNode::Leaf(bytes)) = cell.value() else {
            return Err(self.reader.invalid("blob map key is not a blob").into());
        };
        let fits = if has_entry {
            bytes.len() * 2 == total
        } else {
            bytes.len() == total.div_ceil(2)
                && (total % 2 == 0 || bytes.last().is_some_and(|b| b & 0x0F == 0))
        };
        if !fits {
            return Err(self
                .reader
                .non_canonical(format!("key of {} bytes for a {total}-digit prefix", bytes.len()))
                .into());
        }
        Ok(bytes.clone())
    }
}
