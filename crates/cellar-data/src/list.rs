//! Persistent lists: a vector body read back to front.

use std::fmt;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::vector::{Vector, VectorNode};

/// An immutable list. `cons` and `rest` are appends and pops on the
/// underlying vector body, so both stay cheap.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct List(Cell);

impl List {
    pub fn empty() -> Self {
        Self::from_node(VectorNode::empty())
    }

    /// A list whose first element is the first item.
    pub fn of(items: impl IntoIterator<Item = Cell>) -> Self {
        let mut refs: Vec<_> = items.into_iter().map(|c| c.to_ref()).collect();
        refs.reverse();
        Self::from_node(VectorNode::from_refs(refs))
    }

    fn from_node(node: VectorNode) -> Self {
        Self(Cell::new(Value::List(node)))
    }

    pub fn node(&self) -> &VectorNode {
        match self.0.value() {
            Value::List(node) => node,
            _ => unreachable!("list wraps a list value"),
        }
    }

    pub fn as_cell(&self) -> &Cell {
        &self.0
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

    /// A list with `value` in front.
    pub fn cons(&self, value: Cell) -> CellResult<List> {
        Ok(Self::from_node(self.node().append(value.to_ref())?))
    }

    /// The first element, or `None` for the empty list.
    pub fn first(&self) -> CellResult<Option<Cell>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.get(0).map(Some)
    }

    /// Everything after the first element.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    pub fn rest(&self) -> CellResult<List> {
        assert!(!self.is_empty(), "rest of empty list");
        Ok(Self::from_node(self.node().take(self.count() - 1)?))
    }

    /// Element `i`, counting from the front.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.count()`.
    pub fn get(&self, i: u64) -> CellResult<Cell> {
        assert!(i < self.count(), "index {i} out of range for {} elements", self.count());
        self.node().get(self.count() - 1 - i)?.value()
    }

    /// The elements in list order, as a vector.
    pub fn to_vector(&self) -> CellResult<Vector> {
        let mut refs = Vec::with_capacity(self.count() as usize);
        self.node().collect_range(0, self.count(), &mut refs)?;
        refs.reverse();
        Ok(Vector::from_refs(refs))
    }
}

impl From<List> for Cell {
    fn from(list: List) -> Self {
        list.0
    }
}

impl TryFrom<Cell> for List {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        match cell.value() {
            Value::List(_) => Ok(Self(cell)),
            _ => Err(CellError::WrongType {
                expected: "list",
                actual: cell.cell_type(),
            }),
        }
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
