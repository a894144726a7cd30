//! Persistent vectors.
//!
//! Elements live in a 16-ary tree whose shape depends only on the element
//! count. Appending fills a leaf of up to 16 elements in front of a packed
//! prefix; each full leaf is folded into the prefix, touching one node per
//! tree level.

mod node;

pub use node::VectorNode;
pub(crate) use node::{child_size, expect_vector};

use std::fmt;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

/// An immutable indexed sequence of cells.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Vector(Cell);

impl Vector {
    pub fn empty() -> Self {
        Self::from_node(VectorNode::empty())
    }

    pub fn of(items: impl IntoIterator<Item = Cell>) -> Self {
        Self::from_refs(items.into_iter().map(|c| c.to_ref()).collect())
    }

    pub(crate) fn from_refs(refs: Vec<Ref>) -> Self {
        Self::from_node(VectorNode::from_refs(refs))
    }

    pub(crate) fn from_node(node: VectorNode) -> Self {
        Self(Cell::new(Value::Vector(node)))
    }

    pub fn node(&self) -> &VectorNode {
        match self.0.value() {
            Value::Vector(node) => node,
            _ => unreachable!("vector wraps a vector value"),
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

    fn check_index(&self, i: u64) {
        assert!(i < self.count(), "index {i} out of range for {} elements", self.count());
    }

    /// Element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.count()`.
    pub fn get(&self, i: u64) -> CellResult<Cell> {
        self.check_index(i);
        self.node().get(i)?.value()
    }

    /// Replace element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.count()`.
    pub fn assoc(&self, i: u64, value: Cell) -> CellResult<Vector> {
        self.check_index(i);
        if self.node().get(i)?.hash() == value.hash() {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().assoc(i, value.to_ref())?))
    }

    pub fn append(&self, value: Cell) -> CellResult<Vector> {
        Ok(Self::from_node(self.node().append(value.to_ref())?))
    }

    /// Elements of `self` followed by those of `other`.
    ///
    /// The packed prefix of `self` is shared with the result. The elements
    /// of `other` are appended one at a time, even when its full chunks
    /// would line up, so the cost is linear in `other.count()`.
    pub fn concat(&self, other: &Vector) -> CellResult<Vector> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        let mut refs = Vec::with_capacity(other.count() as usize);
        other.node().collect_range(0, other.count(), &mut refs)?;
        let mut node = self.node().clone();
        for r in refs {
            node = node.append(r)?;
        }
        Ok(Self::from_node(node))
    }

    /// The first `n` elements.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.count()`.
    pub fn take(&self, n: u64) -> CellResult<Vector> {
        assert!(n <= self.count(), "take {n} from {} elements", self.count());
        if n == self.count() {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().take(n)?))
    }

    /// All but the last element.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn pop(&self) -> CellResult<Vector> {
        assert!(!self.is_empty(), "pop from empty vector");
        self.take(self.count() - 1)
    }

    /// `len` elements starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the vector.
    pub fn slice(&self, start: u64, len: u64) -> CellResult<Vector> {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.count()),
            "slice {start}+{len} out of range for {} elements",
            self.count()
        );
        if start == 0 {
            return self.take(len);
        }
        let mut refs = Vec::with_capacity(len as usize);
        self.node().collect_range(start, start + len, &mut refs)?;
        Ok(Self::from_refs(refs))
    }

    pub fn elements(&self) -> CellResult<Vec<Cell>> {
        let mut refs = Vec::with_capacity(self.count() as usize);
        self.node().collect_range(0, self.count(), &mut refs)?;
        refs.iter().map(Ref::value).collect()
    }

    /// Number of leading elements equal in both vectors.
    pub fn common_prefix_length(&self, other: &Vector) -> CellResult<u64> {
        node::common_prefix(&self.0, &other.0)
    }
}

impl From<Vector> for Cell {
    fn from(v: Vector) -> Self {
        v.0
    }
}

impl TryFrom<Cell> for Vector {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        expect_vector(&cell)?;
        Ok(Self(cell))
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;
    use proptest::prelude::*;

    fn ints(range: std::ops::Range<i64>) -> Vector {
        Vector::of(range.map(Cell::integer))
    }

    // -----------------------------------------------------------------------
    // Shape and access
    // -----------------------------------------------------------------------

    #[test]
    fn three_hundred_elements() {
        let v = ints(0..300);
        assert_eq!(v.count(), 300);
        assert_eq!(v.get(150).unwrap(), Cell::integer(150));
        assert_eq!(v.as_cell().cell_type(), CellType::VectorLeaf);

        let VectorNode::Leaf { items, prefix, .. } = v.node() else {
            panic!("expected leaf with prefix");
        };
        assert_eq!(items.len(), 12);
        let prefix = Vector::try_from(prefix.as_ref().unwrap().value().unwrap()).unwrap();
        assert_eq!(prefix.count(), 288);

        let VectorNode::Tree { children, .. } = prefix.node() else {
            panic!("expected packed tree");
        };
        let first = Vector::try_from(children[0].value().unwrap()).unwrap();
        assert_eq!(first.count(), 256);
        assert_eq!(first, ints(0..256));
        assert_eq!(v.common_prefix_length(&first).unwrap(), 256);
        assert_eq!(first.common_prefix_length(&v).unwrap(), 256);
    }

    #[test]
    fn common_prefix_of_diverging_vectors() {
        let a = ints(0..1000);
        let b = a.assoc(700, Cell::nil()).unwrap();
        assert_eq!(a.common_prefix_length(&b).unwrap(), 700);
        assert_eq!(a.common_prefix_length(&a.take(333).unwrap()).unwrap(), 333);
        assert_eq!(a.common_prefix_length(&Vector::empty()).unwrap(), 0);
        let c = ints(1..5);
        assert_eq!(a.common_prefix_length(&c).unwrap(), 0);
    }

    #[test]
    fn appends_read_back() {
        let mut v = Vector::empty();
        for i in 0..1000 {
            v = v.append(Cell::integer(i)).unwrap();
        }
        assert_eq!(v, ints(0..1000));
        for i in (0..1000).step_by(7) {
            assert_eq!(v.get(i as u64).unwrap(), Cell::integer(i));
        }
    }

    #[test]
    fn append_shares_existing_subtrees() {
        let v = ints(0..(272 + 15));
        let VectorNode::Leaf {
            prefix: Some(prefix),
            ..
        } = v.node()
        else {
            panic!("expected leaf with prefix");
        };
        let prefix = Vector::try_from(prefix.value().unwrap()).unwrap();
        let VectorNode::Tree { children: before, .. } = prefix.node() else {
            panic!("expected tree");
        };

        let grown = v.append(Cell::integer(-1)).unwrap();
        let VectorNode::Tree { children: after, .. } = grown.node() else {
            panic!("expected tree");
        };
        assert_eq!(after.len(), 2);
        assert!(after[0].ptr_eq(&before[0]));
    }

    #[test]
    fn take_pop_slice() {
        let v = ints(0..500);
        assert_eq!(v.take(17).unwrap(), ints(0..17));
        assert_eq!(v.pop().unwrap(), ints(0..499));
        assert_eq!(v.slice(100, 250).unwrap(), ints(100..350));
        assert_eq!(v.slice(0, 0).unwrap(), Vector::empty());
    }

    #[test]
    fn concat_is_canonical() {
        let joined = ints(0..123).concat(&ints(123..400)).unwrap();
        assert_eq!(joined, ints(0..400));
        assert_eq!(Vector::empty().concat(&ints(0..3)).unwrap(), ints(0..3));
    }

    #[test]
    #[should_panic]
    fn get_out_of_range_panics() {
        let _ = ints(0..3).get(3);
    }

    #[test]
    fn elements_in_order() {
        let cells: Vec<Cell> = (0..70).map(Cell::integer).collect();
        assert_eq!(Vector::of(cells.clone()).elements().unwrap(), cells);
    }

    // -----------------------------------------------------------------------
    // Laws
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn assoc_changes_one_index(n in 1u64..600, seed in any::<u64>()) {
            let i = seed % n;
            let v = ints(0..n as i64);
            let w = v.assoc(i, Cell::keyword("x")).unwrap();
            prop_assert_eq!(w.get(i).unwrap(), Cell::keyword("x"));
            prop_assert_eq!(w.count(), n);
            for j in [0, n / 2, n - 1] {
                if j != i {
                    prop_assert_eq!(w.get(j).unwrap(), v.get(j).unwrap());
                }
            }
        }

        #[test]
        fn appends_match_bulk_build(items in prop::collection::vec(any::<i64>(), 0..400)) {
            let mut v = Vector::empty();
            for &x in &items {
                v = v.append(Cell::integer(x)).unwrap();
            }
            prop_assert_eq!(v, Vector::of(items.iter().map(|&x| Cell::integer(x))));
        }

        #[test]
        fn take_then_common_prefix(n in 0u64..700, k in 0u64..700) {
            let k = k.min(n);
            let v = ints(0..n as i64);
            let t = v.take(k).unwrap();
            prop_assert_eq!(&t, &ints(0..k as i64));
            prop_assert_eq!(v.common_prefix_length(&t).unwrap(), k);
        }
    }
}
