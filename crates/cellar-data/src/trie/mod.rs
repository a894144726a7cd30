//! Hash-array-mapped trie shared by maps and sets.
//!
//! A node holding at most [`MAP_LEAF_MAX`] entries is a leaf with its
//! entries sorted by key hash. Larger nodes are trees at a fixed `shift`:
//! entries are distributed over up to 16 children by hex digit `shift` of
//! their key hash, and children sit at `shift + 1`. The shape is therefore a
//! pure function of the entry set, and in-order traversal visits entries in
//! key-hash order.

mod merge;

pub(crate) use merge::{Merge, Policy};

use std::sync::LazyLock;

use cellar_format::{FANOUT, MAP_LEAF_MAX};
use cellar_types::Hash;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

/// Value stored against every set element.
static SENTINEL: LazyLock<Ref> = LazyLock::new(|| Cell::boolean(true).to_ref());

pub(crate) fn sentinel() -> Ref {
    SENTINEL.clone()
}

/// Which collection a trie node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashKind {
    Map,
    /// Values are the `true` sentinel and are not encoded.
    Set,
}

impl HashKind {
    pub(crate) fn wrap(self, node: HashNode) -> Cell {
        Cell::new(match self {
            Self::Map => Value::Map(node),
            Self::Set => Value::Set(node),
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Set => "set",
        }
    }
}

/// The trie node inside a map or set cell.
pub(crate) fn node_of(kind: HashKind, cell: &Cell) -> CellResult<&HashNode> {
    match (kind, cell.value()) {
        (HashKind::Map, Value::Map(node)) | (HashKind::Set, Value::Set(node)) => Ok(node),
        _ => Err(CellError::WrongType {
            expected: kind.name(),
            actual: cell.cell_type(),
        }),
    }
}

/// A key and its value.
#[derive(Clone, Debug)]
pub struct Entry {
    pub key: Ref,
    pub value: Ref,
}

impl Entry {
    pub(crate) fn new(key: Ref, value: Ref) -> Self {
        Self { key, value }
    }
}

/// Shape of a map or set value.
#[derive(Clone, Debug)]
pub enum HashNode {
    /// Entries sorted by key hash.
    Leaf(Vec<Entry>),
    Tree {
        count: u64,
        shift: u8,
        mask: u16,
        children: Vec<Ref>,
    },
}

fn slot(mask: u16, digit: u8) -> Option<usize> {
    let bit = 1u16 << digit;
    (mask & bit != 0).then(|| (mask & (bit - 1)).count_ones() as usize)
}

fn search(entries: &[Entry], hash: &Hash) -> Result<usize, usize> {
    entries.binary_search_by(|e| e.key.hash().cmp(hash))
}

impl HashNode {
    pub fn empty() -> Self {
        Self::Leaf(Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of entries below this node.
    pub fn count(&self) -> u64 {
        match self {
            Self::Leaf(entries) => entries.len() as u64,
            Self::Tree { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub(crate) fn for_each_ref(&self, kind: HashKind, f: &mut dyn FnMut(&Ref)) {
        match self {
            Self::Leaf(entries) => {
                for e in entries {
                    f(&e.key);
                    if kind == HashKind::Map {
                        f(&e.value);
                    }
                }
            }
            Self::Tree { children, .. } => children.iter().for_each(f),
        }
    }

    pub(crate) fn map_refs<E>(
        &self,
        kind: HashKind,
        f: &mut dyn FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::Leaf(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for e in entries {
                    let key = f(&e.key)?;
                    let value = match kind {
                        HashKind::Map => f(&e.value)?,
                        HashKind::Set => e.value.clone(),
                    };
                    out.push(Entry::new(key, value));
                }
                Self::Leaf(out)
            }
            Self::Tree {
                count,
                shift,
                mask,
                children,
            } => Self::Tree {
                count: *count,
                shift: *shift,
                mask: *mask,
                children: children.iter().map(|c| f(c)).collect::<Result<_, _>>()?,
            },
        })
    }

    /// Canonical node at `shift` for entries already sorted by key hash.
    pub(crate) fn from_entries(kind: HashKind, shift: u8, entries: Vec<Entry>) -> Self {
        if entries.len() <= MAP_LEAF_MAX {
            return Self::Leaf(entries);
        }
        let count = entries.len() as u64;
        let mut mask = 0u16;
        let mut children = Vec::new();
        let mut rest = entries.as_slice();
        for digit in 0..FANOUT as u8 {
            let n = rest
                .iter()
                .take_while(|e| e.key.hash().digit(shift as usize) == digit)
                .count();
            if n == 0 {
                continue;
            }
            let (group, tail) = rest.split_at(n);
            rest = tail;
            mask |= 1 << digit;
            let child = Self::from_entries(kind, shift + 1, group.to_vec());
            children.push(kind.wrap(child).to_ref());
        }
        Self::Tree {
            count,
            shift,
            mask,
            children,
        }
    }

    /// The entry whose key has `hash`.
    pub(crate) fn get(&self, kind: HashKind, hash: &Hash) -> CellResult<Option<Entry>> {
        match self {
            Self::Leaf(entries) => Ok(search(entries, hash).ok().map(|i| entries[i].clone())),
            Self::Tree {
                shift,
                mask,
                children,
                ..
            } => {
                let Some(i) = slot(*mask, hash.digit(*shift as usize)) else {
                    return Ok(None);
                };
                let cell = children[i].value()?;
                node_of(kind, &cell)?.get(kind, hash)
            }
        }
    }

    /// Insert or replace `entry` in a node sitting at `shift`.
    ///
    /// Returns `None` if the node already holds an equal entry.
    pub(crate) fn assoc(
        &self,
        kind: HashKind,
        shift: u8,
        entry: Entry,
    ) -> CellResult<Option<HashNode>> {
        let hash = entry.key.hash();
        match self {
            Self::Leaf(entries) => match search(entries, &hash) {
                Ok(i) => {
                    if entries[i].value.hash() == entry.value.hash() {
                        return Ok(None);
                    }
                    let mut next = entries.clone();
                    next[i] = entry;
                    Ok(Some(Self::Leaf(next)))
                }
                Err(i) => {
                    let mut next = entries.clone();
                    next.insert(i, entry);
                    Ok(Some(Self::from_entries(kind, shift, next)))
                }
            },
            Self::Tree {
                count,
                shift,
                mask,
                children,
            } => {
                let digit = hash.digit(*shift as usize);
                let bit = 1u16 << digit;
                let idx = (mask & (bit - 1)).count_ones() as usize;
                let mut children = children.clone();
                if mask & bit == 0 {
                    children.insert(idx, kind.wrap(Self::Leaf(vec![entry])).to_ref());
                    return Ok(Some(Self::Tree {
                        count: count + 1,
                        shift: *shift,
                        mask: mask | bit,
                        children,
                    }));
                }
                let cell = children[idx].value()?;
                let child = node_of(kind, &cell)?;
                let Some(updated) = child.assoc(kind, shift + 1, entry)? else {
                    return Ok(None);
                };
                let count = count + updated.count() - child.count();
                children[idx] = kind.wrap(updated).to_ref();
                Ok(Some(Self::Tree {
                    count,
                    shift: *shift,
                    mask: *mask,
                    children,
                }))
            }
        }
    }

    /// Remove the entry whose key has `hash`.
    ///
    /// Returns `None` if there is no such entry.
    pub(crate) fn dissoc(&self, kind: HashKind, hash: &Hash) -> CellResult<Option<HashNode>> {
        match self {
            Self::Leaf(entries) => Ok(search(entries, hash).ok().map(|i| {
                let mut next = entries.clone();
                next.remove(i);
                Self::Leaf(next)
            })),
            Self::Tree {
                count,
                shift,
                mask,
                children,
            } => {
                let digit = hash.digit(*shift as usize);
                let Some(idx) = slot(*mask, digit) else {
                    return Ok(None);
                };
                let cell = children[idx].value()?;
                let Some(updated) = node_of(kind, &cell)?.dissoc(kind, hash)? else {
                    return Ok(None);
                };
                let mut children = children.clone();
                let mut mask = *mask;
                if updated.is_empty() {
                    children.remove(idx);
                    mask &= !(1u16 << digit);
                } else {
                    children[idx] = kind.wrap(updated).to_ref();
                }
                let tree = Self::Tree {
                    count: count - 1,
                    shift: *shift,
                    mask,
                    children,
                };
                if tree.count() as usize <= MAP_LEAF_MAX {
                    return Ok(Some(Self::Leaf(tree.entries(kind)?)));
                }
                Ok(Some(tree))
            }
        }
    }

    /// Every entry in key-hash order.
    pub(crate) fn entries(&self, kind: HashKind) -> CellResult<Vec<Entry>> {
        let mut out = Vec::with_capacity(self.count() as usize);
        self.collect(kind, &mut out)?;
        Ok(out)
    }

    fn collect(&self, kind: HashKind, out: &mut Vec<Entry>) -> CellResult<()> {
        match self {
            Self::Leaf(entries) => out.extend(entries.iter().cloned()),
            Self::Tree { children, .. } => {
                for child in children {
                    let cell = child.value()?;
                    node_of(kind, &cell)?.collect(kind, out)?;
                }
            }
        }
        Ok(())
    }

    /// Entry `i` in key-hash order.
    pub(crate) fn entry_at(&self, kind: HashKind, mut i: u64) -> CellResult<Entry> {
        match self {
            Self::Leaf(entries) => Ok(entries[i as usize].clone()),
            Self::Tree { children, .. } => {
                for child in children {
                    let cell = child.value()?;
                    let node = node_of(kind, &cell)?;
                    if i < node.count() {
                        return node.entry_at(kind, i);
                    }
                    i -= node.count();
                }
                Err(CellError::invalid("entry index beyond child counts"))
            }
        }
    }
}
