use crate::blob::{digit_at, Blob};
use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

/// One node of a blob map.
///
/// A node stands for every key beginning with its accumulated prefix of
/// `depth + prefix_len` hex digits. `depth` digits were consumed by its
/// ancestors (one of them by the branch leading here); the node itself
/// consumes `prefix_len`. `key` is the entry's key when the node holds an
/// entry, and otherwise a blob spelling the accumulated prefix, padded
/// with a zero nibble when its length is odd. Children are indexed by the
/// next digit and sit at depth `depth + prefix_len + 1`.
#[derive(Clone, Debug)]
pub struct BlobMapNode {
    pub(crate) count: u64,
    pub(crate) depth: usize,
    pub(crate) prefix_len: usize,
    pub(crate) key: Option<Ref>,
    pub(crate) value: Option<Ref>,
    pub(crate) mask: u16,
    pub(crate) children: Vec<Ref>,
}

pub(crate) fn expect_node(cell: &Cell) -> CellResult<&BlobMapNode> {
    match cell.value() {
        Value::BlobMap(node) => Ok(node),
        _ => Err(CellError::WrongType {
            expected: "blob map",
            actual: cell.cell_type(),
        }),
    }
}

fn node_ref(node: BlobMapNode) -> Ref {
    Cell::new(Value::BlobMap(node)).to_ref()
}

fn load(r: &Ref) -> CellResult<BlobMapNode> {
    let cell = r.value()?;
    Ok(expect_node(&cell)?.clone())
}

/// Blob spelling the first `digits` hex digits of `bytes`.
fn prefix_blob(bytes: &[u8], digits: usize) -> Ref {
    let mut out = bytes[..digits.div_ceil(2)].to_vec();
    if digits % 2 == 1 {
        if let Some(last) = out.last_mut() {
            *last &= 0xF0;
        }
    }
    Blob::new(out).into_cell().to_ref()
}

fn slot(mask: u16, digit: u8) -> Option<usize> {
    let bit = 1u16 << digit;
    (mask & bit != 0).then(|| (mask & (bit - 1)).count_ones() as usize)
}

impl BlobMapNode {
    /// The canonical empty map.
    pub fn empty() -> Self {
        Self {
            count: 0,
            depth: 0,
            prefix_len: 0,
            key: None,
            value: None,
            mask: 0,
            children: Vec::new(),
        }
    }

    fn leaf(key: Ref, digits: usize, value: Ref, depth: usize) -> Self {
        Self {
            count: 1,
            depth,
            prefix_len: digits - depth,
            key: Some(key),
            value: Some(value),
            mask: 0,
            children: Vec::new(),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub fn has_entry(&self) -> bool {
        self.value.is_some()
    }

    /// Hex digits of the accumulated prefix.
    pub(crate) fn total(&self) -> usize {
        self.depth + self.prefix_len
    }

    pub(crate) fn for_each_ref(&self, f: &mut dyn FnMut(&Ref)) {
        if let Some(key) = &self.key {
            f(key);
        }
        if let Some(value) = &self.value {
            f(value);
        }
        self.children.iter().for_each(f);
    }

    pub(crate) fn map_refs<E>(
        &self,
        f: &mut dyn FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            count: self.count,
            depth: self.depth,
            prefix_len: self.prefix_len,
            key: self.key.as_ref().map(|k| f(k)).transpose()?,
            value: self.value.as_ref().map(|v| f(v)).transpose()?,
            mask: self.mask,
            children: self.children.iter().map(|c| f(c)).collect::<Result<_, _>>()?,
        })
    }

    /// The key blob: the entry key or the padded prefix. Its digits are
    /// read in place, never flattened.
    pub(crate) fn prefix(&self) -> CellResult<Blob> {
        let blob = match &self.key {
            Some(key) => Blob::try_from(key.value()?)?,
            None => Blob::empty(),
        };
        if blob.len() * 2 < self.total() as u64 {
            return Err(CellError::invalid(format!(
                "blob map key of {} bytes is shorter than its {}-digit prefix",
                blob.len(),
                self.total()
            )));
        }
        Ok(blob)
    }

    /// Same subtree re-rooted at `depth`.
    fn rerooted(&self, depth: usize) -> Self {
        let mut node = self.clone();
        node.prefix_len = self.total() - depth;
        node.depth = depth;
        node
    }

    fn own_prefix_matches(&self, k: &[u8]) -> CellResult<bool> {
        let p = self.prefix()?;
        Ok(p.match_bytes(k, self.depth, self.prefix_len)? == self.prefix_len)
    }

    pub(crate) fn get(&self, k: &[u8]) -> CellResult<Option<(Ref, Ref)>> {
        if self.is_empty() || !self.own_prefix_matches(k)? {
            return Ok(None);
        }
        let total = self.total();
        if k.len() * 2 == total {
            return Ok(self.key.clone().zip(self.value.clone()));
        }
        let Some(i) = slot(self.mask, digit_at(k, total)) else {
            return Ok(None);
        };
        let cell = self.children[i].value()?;
        expect_node(&cell)?.get(k)
    }

    /// Insert or replace an entry. `k` holds the bytes of `key`.
    ///
    /// Returns `None` if the map already holds an equal entry.
    pub(crate) fn assoc(&self, key: &Ref, k: &[u8], value: Ref) -> CellResult<Option<Self>> {
        let digits = k.len() * 2;
        if self.is_empty() {
            return Ok(Some(Self::leaf(key.clone(), digits, value, 0)));
        }
        let p = self.prefix()?;
        let total = self.total();
        let m = p.match_bytes(k, self.depth, self.prefix_len)?;

        if m < self.prefix_len {
            let split = self.depth + m;
            let old_digit = p.hex_digit(split as u64)?;
            let old = node_ref(self.rerooted(split + 1));
            if digits == split {
                // The new key ends inside this node's prefix and takes
                // over the shortened node.
                return Ok(Some(Self {
                    count: self.count + 1,
                    depth: self.depth,
                    prefix_len: m,
                    key: Some(key.clone()),
                    value: Some(value),
                    mask: 1 << old_digit,
                    children: vec![old],
                }));
            }
            let new_digit = digit_at(k, split);
            let fresh = node_ref(Self::leaf(key.clone(), digits, value, split + 1));
            let children = if new_digit < old_digit {
                vec![fresh, old]
            } else {
                vec![old, fresh]
            };
            return Ok(Some(Self {
                count: self.count + 1,
                depth: self.depth,
                prefix_len: m,
                key: Some(prefix_blob(k, split)),
                value: None,
                mask: (1 << old_digit) | (1 << new_digit),
                children,
            }));
        }

        if digits == total {
            if let Some(existing) = &self.value {
                if existing.hash() == value.hash() {
                    return Ok(None);
                }
            }
            let mut next = self.clone();
            if !self.has_entry() {
                next.count += 1;
            }
            next.key = Some(key.clone());
            next.value = Some(value);
            return Ok(Some(next));
        }

        let digit = digit_at(k, total);
        let bit = 1u16 << digit;
        let idx = (self.mask & (bit - 1)).count_ones() as usize;
        let mut next = self.clone();
        if self.mask & bit == 0 {
            let fresh = Self::leaf(key.clone(), digits, value, total + 1);
            next.children.insert(idx, node_ref(fresh));
            next.mask |= bit;
            next.count += 1;
            return Ok(Some(next));
        }
        let child = load(&self.children[idx])?;
        let Some(updated) = child.assoc(key, k, value)? else {
            return Ok(None);
        };
        next.count = next.count + updated.count - child.count;
        next.children[idx] = node_ref(updated);
        Ok(Some(next))
    }

    /// Remove the entry for key bytes `k`.
    ///
    /// Returns `None` if there is no such entry. The result may be the empty
    /// node.
    pub(crate) fn dissoc(&self, k: &[u8]) -> CellResult<Option<Self>> {
        if self.is_empty() || !self.own_prefix_matches(k)? {
            return Ok(None);
        }
        let total = self.total();
        let mut next = self.clone();
        if k.len() * 2 == total {
            if !self.has_entry() {
                return Ok(None);
            }
            next.value = None;
        } else {
            let digit = digit_at(k, total);
            let Some(idx) = slot(self.mask, digit) else {
                return Ok(None);
            };
            let Some(updated) = load(&self.children[idx])?.dissoc(k)? else {
                return Ok(None);
            };
            if updated.is_empty() {
                next.children.remove(idx);
                next.mask &= !(1u16 << digit);
            } else {
                next.children[idx] = node_ref(updated);
            }
        }
        next.count -= 1;
        next.normalize().map(Some)
    }

    /// Restore the shape rules after a removal: an empty node becomes the
    /// canonical empty map, and a node left with no entry and one child is
    /// replaced by that child.
    fn normalize(self) -> CellResult<Self> {
        if self.count == 0 {
            return Ok(Self::empty());
        }
        if !self.has_entry() && self.children.len() == 1 {
            return Ok(load(&self.children[0])?.rerooted(self.depth));
        }
        Ok(self)
    }

    /// Every entry in key order.
    pub(crate) fn entries(&self) -> CellResult<Vec<(Ref, Ref)>> {
        let mut out = Vec::with_capacity(self.count as usize);
        self.collect(&mut out)?;
        Ok(out)
    }

    fn collect(&self, out: &mut Vec<(Ref, Ref)>) -> CellResult<()> {
        if let (Some(k), Some(v)) = (&self.key, &self.value) {
            out.push((k.clone(), v.clone()));
        }
        for child in &self.children {
            let cell = child.value()?;
            expect_node(&cell)?.collect(out)?;
        }
        Ok(())
    }

    /// Entry `i` in key order.
    pub(crate) fn entry_at(&self, mut i: u64) -> CellResult<(Ref, Ref)> {
        if let (Some(k), Some(v)) = (&self.key, &self.value) {
            if i == 0 {
                return Ok((k.clone(), v.clone()));
            }
            i -= 1;
        }
        for child in &self.children {
            let cell = child.value()?;
            let node = expect_node(&cell)?;
            if i < node.count {
                return node.entry_at(i);
            }
            i -= node.count;
        }
        Err(CellError::invalid("blob map index beyond child counts"))
    }

    /// Drop the `n` smallest entries.
    pub(crate) fn remove_leading(&self, n: u64) -> CellResult<Self> {
        if n == 0 {
            return Ok(self.clone());
        }
        if n >= self.count {
            return Ok(Self::empty());
        }
        let mut left = n;
        let mut next = self.clone();
        if self.has_entry() {
            next.value = None;
            left -= 1;
        }
        let mut mask = 0u16;
        let mut children = Vec::with_capacity(self.children.len());
        let mut digits = (0..16u8).filter(|d| self.mask & (1 << d) != 0);
        for child in &self.children {
            let digit = digits.next().unwrap_or_default();
            if left == 0 {
                mask |= 1 << digit;
                children.push(child.clone());
                continue;
            }
            let node = load(child)?;
            if left >= node.count {
                left -= node.count;
                continue;
            }
            mask |= 1 << digit;
            children.push(node_ref(node.remove_leading(left)?));
            left = 0;
        }
        next.mask = mask;
        next.children = children;
        next.count = self.count - n;
        next.normalize()
    }

    /// Sub-map of keys starting with `pre`, rooted at depth zero.
    pub(crate) fn with_prefix(&self, pre: &[u8]) -> CellResult<Self> {
        if self.is_empty() {
            return Ok(Self::empty());
        }
        let p = self.prefix()?;
        let wanted = pre.len() * 2;
        let total = self.total();
        if wanted <= total {
            let need = wanted.saturating_sub(self.depth);
            if p.match_bytes(pre, self.depth, need)? < need {
                return Ok(Self::empty());
            }
            return Ok(self.rerooted(0));
        }
        if !self.own_prefix_matches(pre)? {
            return Ok(Self::empty());
        }
        match slot(self.mask, digit_at(pre, total)) {
            Some(i) => load(&self.children[i])?.with_prefix(pre),
            None => Ok(Self::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn key(hex: &str) -> (Ref, Bytes) {
        let blob = Blob::from_hex(hex).unwrap();
        let bytes = blob.to_bytes().unwrap();
        (blob.into_cell().to_ref(), bytes)
    }

    fn insert(node: &BlobMapNode, hex: &str, v: i64) -> BlobMapNode {
        let (r, k) = key(hex);
        node.assoc(&r, &k, Cell::integer(v).to_ref())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn single_entry_owns_whole_key() {
        let node = insert(&BlobMapNode::empty(), "cafe", 1);
        assert_eq!(node.depth, 0);
        assert_eq!(node.prefix_len, 4);
        assert!(node.has_entry());
        assert!(node.children.is_empty());
    }

    #[test]
    fn fork_pads_odd_prefix() {
        let node = insert(&insert(&BlobMapNode::empty(), "ca12", 1), "ca34", 2);
        assert!(!node.has_entry());
        assert_eq!(node.prefix_len, 2);
        let node = insert(&insert(&BlobMapNode::empty(), "cafe", 1), "caf1", 2);
        assert_eq!(node.prefix_len, 3);
        assert_eq!(&node.prefix().unwrap().to_bytes().unwrap()[..], &[0xCA, 0xF0]);
        assert_eq!(node.children.len(), 2);
    }

    #[test]
    fn promote_when_new_key_is_a_prefix() {
        let node = insert(&insert(&BlobMapNode::empty(), "cafe", 1), "ca", 2);
        assert!(node.has_entry());
        assert_eq!(node.prefix_len, 2);
        assert_eq!(node.children.len(), 1);
        let child = load(&node.children[0]).unwrap();
        assert_eq!(child.depth, 3);
        assert_eq!(child.prefix_len, 1);
    }

    #[test]
    fn children_sit_one_digit_below_parent() {
        let mut node = BlobMapNode::empty();
        for (i, hex) in ["00", "0011", "0022", "01"].iter().enumerate() {
            node = insert(&node, hex, i as i64);
        }
        for child in &node.children {
            assert_eq!(load(child).unwrap().depth, node.total() + 1);
        }
    }
}
