//! Persistent hash sets.

use std::collections::BTreeMap;
use std::fmt;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;
use crate::trie::{node_of, sentinel, Entry, HashKind, HashNode, Merge, Policy};

/// An immutable set of cells, keyed by content hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Set(Cell);

fn never(_: &Ref, _: Option<&Ref>, _: Option<&Ref>) -> CellResult<Option<Ref>> {
    // Set elements carry identical values; nothing is ever resolved.
    Ok(Some(sentinel()))
}

impl Set {
    pub fn empty() -> Self {
        Self(HashKind::Set.wrap(HashNode::empty()))
    }

    pub fn of(items: impl IntoIterator<Item = Cell>) -> Self {
        let by_hash: BTreeMap<_, _> = items
            .into_iter()
            .map(|c| (c.hash(), Entry::new(c.to_ref(), sentinel())))
            .collect();
        let node = HashNode::from_entries(HashKind::Set, 0, by_hash.into_values().collect());
        Self(HashKind::Set.wrap(node))
    }

    pub fn node(&self) -> &HashNode {
        match self.0.value() {
            Value::Set(node) => node,
            _ => unreachable!("set wraps a set value"),
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

    pub fn count(&self) -> u64 {
        self.node().count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, item: &Cell) -> CellResult<bool> {
        Ok(self.node().get(HashKind::Set, &item.hash())?.is_some())
    }

    pub fn include(&self, item: Cell) -> CellResult<Set> {
        let entry = Entry::new(item.to_ref(), sentinel());
        Ok(match self.node().assoc(HashKind::Set, 0, entry)? {
            Some(node) => Self(HashKind::Set.wrap(node)),
            None => self.clone(),
        })
    }

    pub fn exclude(&self, item: &Cell) -> CellResult<Set> {
        Ok(match self.node().dissoc(HashKind::Set, &item.hash())? {
            Some(node) => Self(HashKind::Set.wrap(node)),
            None => self.clone(),
        })
    }

    /// Every element in hash order.
    pub fn elements(&self) -> CellResult<Vec<Cell>> {
        self.node()
            .entries(HashKind::Set)?
            .iter()
            .map(|e| e.key.value())
            .collect()
    }

    fn combine(&self, other: &Set, left_only: Policy, right_only: Policy, same: Policy) -> CellResult<Set> {
        let mut resolve = never;
        let cell = Merge::new(HashKind::Set, left_only, right_only, same, &mut resolve)
            .run(&self.0, &other.0)?;
        Ok(Self(cell))
    }

    pub fn union(&self, other: &Set) -> CellResult<Set> {
        self.combine(other, Policy::Keep, Policy::Keep, Policy::Keep)
    }

    pub fn intersection(&self, other: &Set) -> CellResult<Set> {
        self.combine(other, Policy::Drop, Policy::Drop, Policy::Keep)
    }

    /// Elements of `self` not in `other`.
    pub fn difference(&self, other: &Set) -> CellResult<Set> {
        self.combine(other, Policy::Keep, Policy::Drop, Policy::Drop)
    }

    pub fn is_subset(&self, other: &Set) -> CellResult<bool> {
        if self.count() > other.count() {
            return Ok(false);
        }
        Ok(self.difference(other)?.is_empty())
    }
}

impl From<Set> for Cell {
    fn from(set: Set) -> Self {
        set.0
    }
}

impl TryFrom<Cell> for Set {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        node_of(HashKind::Set, &cell)?;
        Ok(Self(cell))
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
