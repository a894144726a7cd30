//! Ordered maps keyed by blobs.
//!
//! A blob map is a Patricia trie over the hex digits of its keys. Keys
//! iterate in lexicographic byte order, a key sorting before every longer
//! key it is a prefix of.

mod node;

pub use node::BlobMapNode;
pub(crate) use node::expect_node;

use std::fmt;

use crate::blob::Blob;
use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

/// An immutable ordered map from blobs to cells.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BlobMap(Cell);

fn resolve((k, v): &(Ref, Ref)) -> CellResult<(Blob, Cell)> {
    Ok((Blob::try_from(k.value()?)?, v.value()?))
}

impl BlobMap {
    pub fn empty() -> Self {
        Self::from_node(BlobMapNode::empty())
    }

    pub fn of(pairs: impl IntoIterator<Item = (Blob, Cell)>) -> CellResult<Self> {
        pairs
            .into_iter()
            .try_fold(Self::empty(), |map, (k, v)| map.assoc(k, v))
    }

    fn from_node(node: BlobMapNode) -> Self {
        Self(Cell::new(Value::BlobMap(node)))
    }

    pub fn node(&self) -> &BlobMapNode {
        match self.0.value() {
            Value::BlobMap(node) => node,
            _ => unreachable!("blob map wraps a blob map value"),
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

    pub fn get(&self, key: &Blob) -> CellResult<Option<Cell>> {
        match self.node().get(&key.to_bytes()?)? {
            Some((_, v)) => Ok(Some(v.value()?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &Blob) -> CellResult<bool> {
        Ok(self.node().get(&key.to_bytes()?)?.is_some())
    }

    pub fn assoc(&self, key: Blob, value: Cell) -> CellResult<BlobMap> {
        let bytes = key.to_bytes()?;
        let key = key.into_cell().to_ref();
        Ok(match self.node().assoc(&key, &bytes, value.to_ref())? {
            Some(node) => Self::from_node(node),
            None => self.clone(),
        })
    }

    pub fn dissoc(&self, key: &Blob) -> CellResult<BlobMap> {
        Ok(match self.node().dissoc(&key.to_bytes()?)? {
            Some(node) => Self::from_node(node),
            None => self.clone(),
        })
    }

    /// Entry `i` in key order.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.count()`.
    pub fn entry_at(&self, i: u64) -> CellResult<(Blob, Cell)> {
        assert!(i < self.count(), "entry {i} out of range for {} entries", self.count());
        resolve(&self.node().entry_at(i)?)
    }

    pub fn first_entry(&self) -> CellResult<Option<(Blob, Cell)>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.entry_at(0).map(Some)
    }

    /// Every entry in key order.
    pub fn entries(&self) -> CellResult<Vec<(Blob, Cell)>> {
        self.node().entries()?.iter().map(resolve).collect()
    }

    /// The entries whose keys start with `prefix`.
    pub fn with_prefix(&self, prefix: &[u8]) -> CellResult<BlobMap> {
        if prefix.is_empty() {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().with_prefix(prefix)?))
    }

    /// Remove the `n` smallest entries.
    pub fn remove_leading_entries(&self, n: u64) -> CellResult<BlobMap> {
        if n == 0 {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().remove_leading(n)?))
    }
}

impl From<BlobMap> for Cell {
    fn from(map: BlobMap) -> Self {
        map.0
    }
}

impl TryFrom<Cell> for BlobMap {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        expect_node(&cell)?;
        Ok(Self(cell))
    }
}

impl fmt::Display for BlobMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_format::CHUNK_LENGTH;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn hex(s: &str) -> Blob {
        Blob::from_hex(s).unwrap()
    }

    fn keys_hex(map: &BlobMap) -> Vec<String> {
        map.entries()
            .unwrap()
            .iter()
            .map(|(k, _)| k.to_hex().unwrap())
            .collect()
    }

    fn of_hex(keys: &[&str]) -> BlobMap {
        BlobMap::of(
            keys.iter()
                .enumerate()
                .map(|(i, k)| (hex(k), Cell::integer(i as i64))),
        )
        .unwrap()
    }

    // -----------------------------------------------------------------------
    // Shape
    // -----------------------------------------------------------------------

    #[test]
    fn removing_shortest_key_collapses_root() {
        let map = of_hex(&["ca", "cafe", "cafebabe"]);
        assert_eq!(map.count(), 3);
        let root = map.node();
        assert!(root.has_entry());
        assert_eq!(root.prefix_len(), 2);

        let smaller = map.dissoc(&hex("ca")).unwrap();
        assert_eq!(smaller.count(), 2);
        let root = smaller.node();
        assert_eq!(root.depth(), 0);
        assert_eq!(root.prefix_len(), 4);
        assert!(root.has_entry());
        assert_eq!(keys_hex(&smaller), vec!["cafe", "cafebabe"]);

        let fresh = BlobMap::of([
            (hex("cafe"), Cell::integer(1)),
            (hex("cafebabe"), Cell::integer(2)),
        ])
        .unwrap();
        assert_eq!(smaller, fresh);
    }

    #[test]
    fn empty_map_is_a_singleton_encoding() {
        assert_eq!(&BlobMap::empty().as_cell().encoding()[..], &[0x84, 0x00]);
        let m = of_hex(&["01"]).dissoc(&hex("01")).unwrap();
        assert_eq!(m, BlobMap::empty());
    }

    #[test]
    fn empty_key_sorts_first() {
        let map = of_hex(&["ff", "", "00"]);
        assert_eq!(keys_hex(&map), vec!["", "00", "ff"]);
        assert_eq!(map.get(&Blob::empty()).unwrap(), Some(Cell::integer(1)));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[test]
    fn lookups() {
        let map = of_hex(&["0a", "0a0b", "0c", "ff00"]);
        assert_eq!(map.get(&hex("0a0b")).unwrap(), Some(Cell::integer(1)));
        assert_eq!(map.get(&hex("0a0c")).unwrap(), None);
        assert_eq!(map.get(&hex("ff")).unwrap(), None);
        assert!(map.contains_key(&hex("0c")).unwrap());
        assert_eq!(map.entry_at(2).unwrap().0, hex("0c"));
        assert_eq!(map.first_entry().unwrap().unwrap().0, hex("0a"));
        assert_eq!(BlobMap::empty().first_entry().unwrap(), None);
    }

    #[test]
    fn with_prefix_selects_subtree() {
        let map = of_hex(&["0a", "0a0b", "0a0c", "0b", "1a"]);
        assert_eq!(keys_hex(&map.with_prefix(&[0x0a]).unwrap()), vec!["0a", "0a0b", "0a0c"]);
        assert_eq!(keys_hex(&map.with_prefix(&[0x0a, 0x0c]).unwrap()), vec!["0a0c"]);
        assert!(map.with_prefix(&[0x2a]).unwrap().is_empty());
        assert_eq!(map.with_prefix(&[]).unwrap(), map);
        let sub = map.with_prefix(&[0x0a]).unwrap();
        assert_eq!(sub.node().depth(), 0);
        assert_eq!(sub, of_hex(&["0a", "0a0b", "0a0c"]).with_prefix(&[0x0a]).unwrap());
    }

    #[test]
    fn remove_leading_entries_drops_smallest() {
        let keys = ["00", "0001", "01", "0101", "02", "ff"];
        let map = of_hex(&keys);
        for n in 0..=keys.len() as u64 {
            let rest = map.remove_leading_entries(n).unwrap();
            assert_eq!(rest.count(), keys.len() as u64 - n);
            let mut expected = BlobMap::empty();
            for k in &keys[n as usize..] {
                expected = expected.assoc(hex(k), map.get(&hex(k)).unwrap().unwrap()).unwrap();
            }
            assert_eq!(rest, expected);
        }
    }

    #[test]
    fn keys_longer_than_a_chunk() {
        let base: Vec<u8> = (0..CHUNK_LENGTH * 2 + 7).map(|i| (i % 251) as u8).collect();
        let mut forked = base.clone();
        forked[CHUNK_LENGTH + 3] ^= 0x10;
        let prefix = base[..CHUNK_LENGTH + 3].to_vec();

        let mut map = BlobMap::empty();
        for (i, k) in [&base, &forked, &prefix].into_iter().enumerate() {
            map = map.assoc(Blob::from(k.clone()), Cell::integer(i as i64)).unwrap();
            map.as_cell().validate().unwrap();
        }
        assert_eq!(map.get(&Blob::from(forked.clone())).unwrap(), Some(Cell::integer(1)));
        assert_eq!(map.get(&Blob::from(base[..CHUNK_LENGTH].to_vec())).unwrap(), None);
        assert_eq!(map.with_prefix(&prefix).unwrap().count(), 3);
        assert_eq!(map.with_prefix(&forked[..CHUNK_LENGTH + 4]).unwrap().count(), 1);

        let smaller = map.dissoc(&Blob::from(prefix)).unwrap();
        smaller.as_cell().validate().unwrap();
        assert_eq!(smaller.count(), 2);
    }

    #[test]
    fn decoded_map_round_trips() {
        let map = of_hex(&["ca", "cafe", "cafebabe", "00"]);
        let back = Cell::decode(map.as_cell().encoding()).unwrap();
        assert_eq!(back, *map.as_cell());
        let back = BlobMap::try_from(back).unwrap();
        assert_eq!(keys_hex(&back), keys_hex(&map));
    }

    #[test]
    fn random_insert_remove_returns_to_empty() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut keys: Vec<Vec<u8>> = (0..300)
            .map(|_| {
                let len = rng.gen_range(0..5);
                (0..len).map(|_| rng.gen_range(0..4u8) * 0x11).collect()
            })
            .collect();
        keys.sort();
        keys.dedup();

        let mut map = BlobMap::empty();
        for k in &keys {
            map = map.assoc(Blob::from(k.clone()), Cell::nil()).unwrap();
        }
        assert_eq!(map.count(), keys.len() as u64);
        let got: Vec<Vec<u8>> = map
            .entries()
            .unwrap()
            .iter()
            .map(|(k, _)| k.to_bytes().unwrap().to_vec())
            .collect();
        assert_eq!(got, keys);

        keys.shuffle(&mut rng);
        for k in &keys {
            map = map.dissoc(&Blob::from(k.clone())).unwrap();
        }
        assert_eq!(map, BlobMap::empty());
    }

    proptest! {
        #[test]
        fn iteration_is_strictly_increasing(keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..4), 0..60)) {
            let map = BlobMap::of(keys.iter().map(|k| (Blob::from(k.clone()), Cell::nil()))).unwrap();
            let got: Vec<Vec<u8>> = map
                .entries()
                .unwrap()
                .iter()
                .map(|(k, _)| k.to_bytes().unwrap().to_vec())
                .collect();
            prop_assert!(got.windows(2).all(|w| w[0] < w[1]));
            let mut expected = keys.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn shape_is_order_independent(keys in prop::collection::btree_set(prop::collection::vec(0u8..3, 0..4), 0..40)) {
            let forward = BlobMap::of(keys.iter().map(|k| (Blob::from(k.clone()), Cell::nil()))).unwrap();
            let backward = BlobMap::of(keys.iter().rev().map(|k| (Blob::from(k.clone()), Cell::nil()))).unwrap();
            prop_assert_eq!(forward, backward);
        }
    }
}
