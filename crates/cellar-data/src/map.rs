//! Persistent hash maps.

use std::collections::BTreeMap;
use std::fmt;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;
use crate::trie::{node_of, Entry, HashKind, HashNode, Merge, Policy};

/// A key present in either of two maps with different values on each side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub key: Cell,
    pub left: Option<Cell>,
    pub right: Option<Cell>,
}

/// An immutable map from cells to cells, keyed by content hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Map(Cell);

impl Map {
    pub fn empty() -> Self {
        Self(HashKind::Map.wrap(HashNode::empty()))
    }

    /// A map of `pairs`; later pairs win over earlier ones with the same key.
    pub fn of(pairs: impl IntoIterator<Item = (Cell, Cell)>) -> Self {
        let by_hash: BTreeMap<_, _> = pairs
            .into_iter()
            .map(|(k, v)| (k.hash(), Entry::new(k.to_ref(), v.to_ref())))
            .collect();
        let node = HashNode::from_entries(HashKind::Map, 0, by_hash.into_values().collect());
        Self(HashKind::Map.wrap(node))
    }

    fn from_node(node: HashNode) -> Self {
        Self(HashKind::Map.wrap(node))
    }

    pub fn node(&self) -> &HashNode {
        match self.0.value() {
            Value::Map(node) => node,
            _ => unreachable!("map wraps a map value"),
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

    pub fn get(&self, key: &Cell) -> CellResult<Option<Cell>> {
        match self.node().get(HashKind::Map, &key.hash())? {
            Some(entry) => Ok(Some(entry.value.value()?)),
            None => Ok(None),
        }
    }

    /// The stored key and value for `key`.
    pub fn get_entry(&self, key: &Cell) -> CellResult<Option<(Cell, Cell)>> {
        match self.node().get(HashKind::Map, &key.hash())? {
            Some(entry) => Ok(Some(resolve(&entry)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &Cell) -> CellResult<bool> {
        Ok(self.node().get(HashKind::Map, &key.hash())?.is_some())
    }

    pub fn assoc(&self, key: Cell, value: Cell) -> CellResult<Map> {
        let entry = Entry::new(key.to_ref(), value.to_ref());
        Ok(match self.node().assoc(HashKind::Map, 0, entry)? {
            Some(node) => Self::from_node(node),
            None => self.clone(),
        })
    }

    pub fn dissoc(&self, key: &Cell) -> CellResult<Map> {
        Ok(match self.node().dissoc(HashKind::Map, &key.hash())? {
            Some(node) => Self::from_node(node),
            None => self.clone(),
        })
    }

    /// Entry `i` in key-hash order.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.count()`.
    pub fn entry_at(&self, i: u64) -> CellResult<(Cell, Cell)> {
        assert!(i < self.count(), "entry {i} out of range for {} entries", self.count());
        resolve(&self.node().entry_at(HashKind::Map, i)?)
    }

    /// Every entry in key-hash order.
    pub fn entries(&self) -> CellResult<Vec<(Cell, Cell)>> {
        self.node()
            .entries(HashKind::Map)?
            .iter()
            .map(resolve)
            .collect()
    }

    pub fn keys(&self) -> CellResult<Vec<Cell>> {
        self.node()
            .entries(HashKind::Map)?
            .iter()
            .map(|e| e.key.value())
            .collect()
    }

    pub fn values(&self) -> CellResult<Vec<Cell>> {
        self.node()
            .entries(HashKind::Map)?
            .iter()
            .map(|e| e.value.value())
            .collect()
    }

    /// Union of both maps; on conflicting keys `other` wins.
    pub fn merge(&self, other: &Map) -> CellResult<Map> {
        let mut right_wins =
            |_: &Ref, _: Option<&Ref>, r: Option<&Ref>| -> CellResult<Option<Ref>> { Ok(r.cloned()) };
        let cell = Merge::new(
            HashKind::Map,
            Policy::Keep,
            Policy::Keep,
            Policy::Keep,
            &mut right_wins,
        )
        .run(&self.0, &other.0)?;
        Ok(Self(cell))
    }

    /// Combine two maps key by key.
    ///
    /// `f` is called for every key that is missing on one side or maps to
    /// different values, with the value from each side; returning `None`
    /// drops the key. Keys mapped to the same value on both sides are kept
    /// without calling `f`.
    pub fn merge_with(
        &self,
        other: &Map,
        mut f: impl FnMut(&Cell, Option<&Cell>, Option<&Cell>) -> Option<Cell>,
    ) -> CellResult<Map> {
        let mut resolve = |k: &Ref, l: Option<&Ref>, r: Option<&Ref>| -> CellResult<Option<Ref>> {
            let key = k.value()?;
            let l = l.map(Ref::value).transpose()?;
            let r = r.map(Ref::value).transpose()?;
            Ok(f(&key, l.as_ref(), r.as_ref()).map(|c| c.to_ref()))
        };
        let cell = Merge::new(
            HashKind::Map,
            Policy::Resolve,
            Policy::Resolve,
            Policy::Keep,
            &mut resolve,
        )
        .run(&self.0, &other.0)?;
        Ok(Self(cell))
    }

    /// Every key whose value differs between the maps, in key-hash order.
    pub fn diff(&self, other: &Map) -> CellResult<Vec<DiffEntry>> {
        let mut out = Vec::new();
        let mut record = |k: &Ref, l: Option<&Ref>, r: Option<&Ref>| -> CellResult<Option<Ref>> {
            out.push(DiffEntry {
                key: k.value()?,
                left: l.map(Ref::value).transpose()?,
                right: r.map(Ref::value).transpose()?,
            });
            Ok(None)
        };
        Merge::new(
            HashKind::Map,
            Policy::Resolve,
            Policy::Resolve,
            Policy::Keep,
            &mut record,
        )
        .run(&self.0, &other.0)?;
        Ok(out)
    }
}

fn resolve(entry: &Entry) -> CellResult<(Cell, Cell)> {
    Ok((entry.key.value()?, entry.value.value()?))
}

impl From<Map> for Cell {
    fn from(map: Map) -> Self {
        map.0
    }
}

impl TryFrom<Cell> for Map {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        node_of(HashKind::Map, &cell)?;
        Ok(Self(cell))
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;
    use proptest::prelude::*;

    fn int(i: i64) -> Cell {
        Cell::integer(i)
    }

    fn squares(range: std::ops::Range<i64>) -> Map {
        Map::of(range.map(|i| (int(i), int(i * i))))
    }

    // -----------------------------------------------------------------------
    // Lookup and update
    // -----------------------------------------------------------------------

    #[test]
    fn thousand_integer_keys() {
        let mut m = Map::empty();
        for i in 0..1000 {
            m = m.assoc(int(i), int(i * i)).unwrap();
        }
        assert_eq!(m.count(), 1000);
        assert_eq!(m.as_cell().cell_type(), CellType::MapTree);
        for i in 0..1000 {
            assert_eq!(m.get(&int(i)).unwrap(), Some(int(i * i)));
        }
        assert_eq!(m.get(&int(1000)).unwrap(), None);
        assert_eq!(m, squares(0..1000));

        let round = Cell::decode(m.as_cell().encoding()).unwrap();
        assert_eq!(round.hash(), m.as_cell().hash());
    }

    #[test]
    fn replacing_a_value_keeps_count() {
        let m = squares(0..50);
        let m2 = m.assoc(int(7), int(-1)).unwrap();
        assert_eq!(m2.count(), 50);
        assert_eq!(m2.get(&int(7)).unwrap(), Some(int(-1)));
        assert!(m.assoc(int(7), int(49)).unwrap().as_cell().ptr_eq(m.as_cell()));
    }

    #[test]
    fn dissoc_absent_key_is_identity() {
        let m = squares(0..30);
        assert!(m.dissoc(&int(99)).unwrap().as_cell().ptr_eq(m.as_cell()));
    }

    #[test]
    fn removing_every_key_yields_empty() {
        let mut m = squares(0..200);
        for i in (0..200).rev() {
            m = m.dissoc(&int(i)).unwrap();
        }
        assert_eq!(m, Map::empty());
    }

    #[test]
    fn entries_follow_key_hash_order() {
        let m = squares(0..40);
        let keys = m.keys().unwrap();
        assert_eq!(keys.len(), 40);
        assert!(keys.windows(2).all(|w| w[0].hash() < w[1].hash()));
        assert_eq!(m.entry_at(5).unwrap().0, keys[5]);
        assert_eq!(m.get_entry(&int(3)).unwrap(), Some((int(3), int(9))));
        assert_eq!(m.values().unwrap().len(), 40);
    }

    #[test]
    fn of_keeps_last_duplicate() {
        let m = Map::of([(int(1), int(1)), (int(1), int(2))]);
        assert_eq!(m.count(), 1);
        assert_eq!(m.get(&int(1)).unwrap(), Some(int(2)));
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    #[test]
    fn merge_right_wins() {
        let a = squares(0..100);
        let b = Map::of((50..150).map(|i| (int(i), int(-i))));
        let m = a.merge(&b).unwrap();
        assert_eq!(m.count(), 150);
        assert_eq!(m.get(&int(10)).unwrap(), Some(int(100)));
        assert_eq!(m.get(&int(60)).unwrap(), Some(int(-60)));
        assert_eq!(m.get(&int(149)).unwrap(), Some(int(-149)));
    }

    #[test]
    fn merge_with_self_is_identity() {
        let m = squares(0..300);
        let merged = m
            .merge_with(&m, |_, _, _| panic!("no key differs"))
            .unwrap();
        assert!(merged.as_cell().ptr_eq(m.as_cell()));
    }

    #[test]
    fn merge_with_sees_only_differences() {
        let a = squares(0..64);
        let b = a.assoc(int(5), int(0)).unwrap().dissoc(&int(6)).unwrap();
        let mut seen = Vec::new();
        let merged = a
            .merge_with(&b, |k, l, r| {
                seen.push(k.clone());
                l.or(r).cloned()
            })
            .unwrap();
        seen.sort_by_key(|c| c.as_integer());
        assert_eq!(seen, vec![int(5), int(6)]);
        assert_eq!(merged, a);
    }

    #[test]
    fn diff_lists_changed_keys() {
        let a = squares(0..100);
        let b = a
            .assoc(int(1), int(0))
            .unwrap()
            .dissoc(&int(2))
            .unwrap()
            .assoc(int(500), int(5))
            .unwrap();
        let mut diff = a.diff(&b).unwrap();
        diff.sort_by_key(|d| d.key.as_integer());
        assert_eq!(
            diff,
            vec![
                DiffEntry {
                    key: int(1),
                    left: Some(int(1)),
                    right: Some(int(0)),
                },
                DiffEntry {
                    key: int(2),
                    left: Some(int(4)),
                    right: None,
                },
                DiffEntry {
                    key: int(500),
                    left: None,
                    right: Some(int(5)),
                },
            ]
        );
        assert!(a.diff(&a).unwrap().is_empty());
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(matches!(
            Map::try_from(int(1)),
            Err(CellError::WrongType { expected: "map", .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Laws
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn assoc_then_dissoc_restores(keys in prop::collection::btree_set(any::<i64>(), 0..80), k in any::<i64>()) {
            prop_assume!(!keys.contains(&k));
            let m = Map::of(keys.iter().map(|&i| (int(i), int(1))));
            let grown = m.assoc(int(k), int(2)).unwrap();
            prop_assert_eq!(grown.count(), m.count() + 1);
            let back = grown.dissoc(&int(k)).unwrap();
            prop_assert_eq!(back.count(), m.count());
            prop_assert_eq!(back, m);
        }

        #[test]
        fn merge_with_pick_left_on_self(keys in prop::collection::vec(any::<i64>(), 0..120)) {
            let m = Map::of(keys.iter().map(|&i| (int(i), int(i))));
            let merged = m.merge_with(&m, |_, l, _| l.cloned()).unwrap();
            prop_assert_eq!(merged, m);
        }

        #[test]
        fn merge_matches_sequential_assoc(
            a in prop::collection::vec((0i64..200, any::<i64>()), 0..60),
            b in prop::collection::vec((0i64..200, any::<i64>()), 0..60),
        ) {
            let left = Map::of(a.iter().map(|&(k, v)| (int(k), int(v))));
            let right = Map::of(b.iter().map(|&(k, v)| (int(k), int(v))));
            let mut expected = left.clone();
            for (k, v) in right.entries().unwrap() {
                expected = expected.assoc(k, v).unwrap();
            }
            prop_assert_eq!(left.merge(&right).unwrap(), expected);
        }
    }
}
