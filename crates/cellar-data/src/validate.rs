//! Full structural validation of a cell tree.

use std::collections::HashSet;

use cellar_format::{
    CANONICAL_NAN_BITS, CHUNK_LENGTH, FANOUT, MAP_LEAF_MAX, MAX_ENCODING_LENGTH,
    MAX_SYMBOLIC_LENGTH,
};
use cellar_types::Hash;

use crate::blob::{child_length, digit_at, match_digits, BlobNode};
use crate::blob_map::BlobMapNode;
use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;
use crate::trie::{node_of, sentinel, HashKind, HashNode};
use crate::vector::{child_size, VectorNode};

impl Cell {
    /// Check every structural invariant of this cell and of everything it
    /// references, fetching children from their stores as needed.
    ///
    /// Fails with [`CellError::MissingData`] if a descendant cannot be
    /// resolved and with [`CellError::Invalid`] on the first broken rule.
    pub fn validate(&self) -> CellResult<()> {
        Validator::default().cell(self, Expect::Any)
    }
}

/// What the parent requires of a child.
#[derive(Clone, Copy)]
enum Expect<'a> {
    Any,
    /// A blob chunk of exactly `len` bytes.
    Chunk { len: u64 },
    /// A vector holding exactly `count` elements.
    Packed { count: u64 },
    /// A trie node whose keys all start with the digits in `path`.
    Trie { kind: HashKind, path: &'a [u8] },
    /// A blob-map child: sits at `depth` and its keys start with the
    /// parent's key digits up to `depth - 1`, followed by `digit`.
    Branch {
        parent: &'a [u8],
        depth: usize,
        digit: u8,
    },
}

#[derive(Default)]
struct Validator {
    seen: HashSet<Hash>,
}

fn invalid(cell: &Cell, reason: impl std::fmt::Display) -> CellError {
    CellError::invalid(format!("{} {}: {reason}", cell.cell_type(), cell.hash().short_hex()))
}

impl Validator {
    fn cell(&mut self, cell: &Cell, expect: Expect<'_>) -> CellResult<()> {
        if !cell.is_embedded() && !self.seen.insert(cell.hash()) {
            return Ok(());
        }
        if cell.encoding().len() > MAX_ENCODING_LENGTH {
            return Err(invalid(cell, "encoding too long"));
        }
        self.check_type(cell, expect)?;
        match cell.value() {
            Value::Double(x) => {
                if x.is_nan() && x.to_bits() != CANONICAL_NAN_BITS {
                    return Err(invalid(cell, "non-canonical NaN"));
                }
            }
            Value::Address(a) => {
                if *a > i64::MAX as u64 {
                    return Err(invalid(cell, "address out of range"));
                }
            }
            Value::Symbol(name) | Value::Keyword(name) => {
                if name.is_empty() || name.len() > MAX_SYMBOLIC_LENGTH {
                    return Err(invalid(cell, "name length"));
                }
            }
            Value::Str(node) => {
                self.blob(cell, node, expect)?;
                let text = crate::string::Str::try_from(cell.clone())?;
                text.to_text()?;
            }
            Value::Blob(node) => self.blob(cell, node, expect)?,
            Value::Vector(node) | Value::List(node) => self.vector(cell, node, expect)?,
            Value::Map(node) => self.trie(cell, HashKind::Map, node, expect)?,
            Value::Set(node) => self.trie(cell, HashKind::Set, node, expect)?,
            Value::BlobMap(node) => self.blob_map(cell, node, expect)?,
            Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Char(_) => {}
        }
        Ok(())
    }

    fn check_type(&self, cell: &Cell, expect: Expect<'_>) -> CellResult<()> {
        let ok = match (expect, cell.value()) {
            (Expect::Any, _) => true,
            (Expect::Chunk { .. }, Value::Blob(_)) => true,
            (Expect::Packed { .. }, Value::Vector(_)) => true,
            (Expect::Trie { kind: HashKind::Map, .. }, Value::Map(_)) => true,
            (Expect::Trie { kind: HashKind::Set, .. }, Value::Set(_)) => true,
            (Expect::Branch { .. }, Value::BlobMap(_)) => true,
            _ => false,
        };
        if !ok {
            return Err(invalid(cell, "child of the wrong type"));
        }
        Ok(())
    }

    /// Resolve a child and check it matches its reference.
    fn resolve(&self, parent: &Cell, r: &Ref) -> CellResult<Cell> {
        let child = r.value()?;
        if child.hash() != r.hash() {
            let reason = format!("child {} has the wrong hash", r.hash().short_hex());
            return Err(invalid(parent, reason));
        }
        if !r.is_direct() && child.is_embedded() {
            return Err(invalid(parent, "embedded child written as a hash pointer"));
        }
        Ok(child)
    }

    fn blob(&mut self, cell: &Cell, node: &BlobNode, expect: Expect<'_>) -> CellResult<()> {
        if let Expect::Chunk { len } = expect {
            if node.len() != len {
                return Err(invalid(cell, format!("chunk of {} bytes, expected {len}", node.len())));
            }
        }
        let BlobNode::Tree { count, children } = node else {
            if node.len() > CHUNK_LENGTH as u64 {
                return Err(invalid(cell, "leaf longer than a chunk"));
            }
            return Ok(());
        };
        if *count <= CHUNK_LENGTH as u64 {
            return Err(invalid(cell, "tree that fits in a leaf"));
        }
        let size = child_length(*count);
        let n = count.div_ceil(size);
        if children.len() as u64 != n {
            return Err(invalid(cell, format!("{} children, expected {n}", children.len())));
        }
        for (i, r) in children.iter().enumerate() {
            let len = if i as u64 == n - 1 { count - size * (n - 1) } else { size };
            let child = self.resolve(cell, r)?;
            self.cell(&child, Expect::Chunk { len })?;
        }
        Ok(())
    }

    fn vector(&mut self, cell: &Cell, node: &VectorNode, expect: Expect<'_>) -> CellResult<()> {
        let fanout = FANOUT as u64;
        if let Expect::Packed { count } = expect {
            if node.count() != count {
                return Err(invalid(cell, format!("{} elements, expected {count}", node.count())));
            }
        }
        match node {
            VectorNode::Leaf {
                count,
                items,
                prefix,
            } => {
                let shape_ok = if *count <= fanout {
                    items.len() as u64 == *count && prefix.is_none()
                } else {
                    count % fanout != 0 && items.len() as u64 == count % fanout && prefix.is_some()
                };
                if !shape_ok {
                    return Err(invalid(cell, "malformed leaf"));
                }
                for r in items {
                    let child = self.resolve(cell, r)?;
                    self.cell(&child, Expect::Any)?;
                }
                if let Some(r) = prefix {
                    let child = self.resolve(cell, r)?;
                    let count = count - items.len() as u64;
                    self.cell(&child, Expect::Packed { count })?;
                }
            }
            VectorNode::Tree { count, children } => {
                if *count <= fanout || count % fanout != 0 {
                    return Err(invalid(cell, "tree with an unpacked count"));
                }
                let size = child_size(*count);
                let n = count.div_ceil(size);
                if children.len() as u64 != n {
                    return Err(invalid(cell, format!("{} children, expected {n}", children.len())));
                }
                for (i, r) in children.iter().enumerate() {
                    let count = if i as u64 == n - 1 { count - size * (n - 1) } else { size };
                    let child = self.resolve(cell, r)?;
                    self.cell(&child, Expect::Packed { count })?;
                }
            }
        }
        Ok(())
    }

    fn trie(
        &mut self,
        cell: &Cell,
        kind: HashKind,
        node: &HashNode,
        expect: Expect<'_>,
    ) -> CellResult<()> {
        let path: &[u8] = match expect {
            Expect::Trie { path, .. } => path,
            _ => &[],
        };
        let on_path = |h: &Hash| path.iter().enumerate().all(|(i, &d)| h.digit(i) == d);
        match node {
            HashNode::Leaf(entries) => {
                if entries.len() > MAP_LEAF_MAX {
                    return Err(invalid(cell, "leaf too large"));
                }
                if entries.windows(2).any(|w| w[0].key.hash() >= w[1].key.hash()) {
                    return Err(invalid(cell, "leaf keys out of hash order"));
                }
                for entry in entries {
                    if !on_path(&entry.key.hash()) {
                        return Err(invalid(cell, "key outside its trie branch"));
                    }
                    let key = self.resolve(cell, &entry.key)?;
                    self.cell(&key, Expect::Any)?;
                    match kind {
                        HashKind::Map => {
                            let value = self.resolve(cell, &entry.value)?;
                            self.cell(&value, Expect::Any)?;
                        }
                        HashKind::Set => {
                            if entry.value.hash() != sentinel().hash() {
                                return Err(invalid(cell, "set member with a value"));
                            }
                        }
                    }
                }
            }
            HashNode::Tree {
                count,
                shift,
                mask,
                children,
            } => {
                if *count <= MAP_LEAF_MAX as u64 {
                    return Err(invalid(cell, "tree that fits in a leaf"));
                }
                if usize::from(*shift) != path.len() {
                    return Err(invalid(cell, format!("shift {shift}, expected {}", path.len())));
                }
                if mask.count_ones() as usize != children.len() || children.is_empty() {
                    return Err(invalid(cell, "mask does not match children"));
                }
                let digits = (0..16u8).filter(|d| mask & (1 << d) != 0);
                let mut total = 0u64;
                for (digit, r) in digits.zip(children) {
                    let child = self.resolve(cell, r)?;
                    let child_count = node_of(kind, &child)?.count();
                    if child_count == 0 {
                        return Err(invalid(cell, "empty child"));
                    }
                    total += child_count;
                    let mut child_path = path.to_vec();
                    child_path.push(digit);
                    self.cell(
                        &child,
                        Expect::Trie {
                            kind,
                            path: &child_path,
                        },
                    )?;
                }
                if total != *count {
                    return Err(invalid(cell, format!("count {count}, children hold {total}")));
                }
            }
        }
        Ok(())
    }

    fn blob_map(&mut self, cell: &Cell, node: &BlobMapNode, expect: Expect<'_>) -> CellResult<()> {
        if node.count == 0 {
            let bare = node.key.is_none() && node.children.is_empty() && node.depth == 0;
            if !bare || !matches!(expect, Expect::Any) {
                return Err(invalid(cell, "malformed empty map"));
            }
            return Ok(());
        }
        let Some(key) = &node.key else {
            return Err(invalid(cell, "node without a key"));
        };
        let total = node.total();
        let key_cell = self.resolve(cell, key)?;
        let bytes = crate::blob::expect_blob(&key_cell)?.to_bytes()?;
        self.cell(&key_cell, Expect::Any)?;

        let key_ok = if node.has_entry() {
            bytes.len() * 2 == total
        } else {
            bytes.len() == total.div_ceil(2)
                && (total % 2 == 0 || bytes[bytes.len() - 1] & 0x0F == 0)
        };
        if !key_ok {
            return Err(invalid(cell, "key blob does not spell the prefix"));
        }
        match expect {
            Expect::Branch {
                parent,
                depth,
                digit,
            } => {
                if node.depth != depth
                    || match_digits(&bytes, parent, 0, depth - 1) != depth - 1
                    || digit_at(&bytes, depth - 1) != digit
                {
                    return Err(invalid(cell, "child outside its branch"));
                }
            }
            _ => {
                if node.depth != 0 {
                    return Err(invalid(cell, "root below depth zero"));
                }
            }
        }

        if node.mask.count_ones() as usize != node.children.len() {
            return Err(invalid(cell, "mask does not match children"));
        }
        if !node.has_entry() && node.children.len() < 2 {
            return Err(invalid(cell, "branch node with fewer than two children"));
        }
        if let Some(value) = &node.value {
            let value = self.resolve(cell, value)?;
            self.cell(&value, Expect::Any)?;
        }
        let mut sum = u64::from(node.has_entry());
        let digits = (0..16u8).filter(|d| node.mask & (1 << d) != 0);
        for (digit, r) in digits.zip(&node.children) {
            let child = self.resolve(cell, r)?;
            self.cell(
                &child,
                Expect::Branch {
                    parent: &bytes,
                    depth: total + 1,
                    digit,
                },
            )?;
            sum += crate::blob_map::expect_node(&child)?.count;
        }
        if sum != node.count {
            return Err(invalid(cell, format!("count {}, entries hold {sum}", node.count)));
        }
        Ok(())
    }
}
