use cellar_format::FANOUT;

use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

const CHUNK: u64 = FANOUT as u64;

/// Shape of a vector or list body.
///
/// The shape is a function of the element count alone:
///
/// * up to 16 elements: a leaf holding all of them;
/// * a multiple of 16 above that: a packed tree;
/// * otherwise: a leaf with the trailing `count % 16` elements and a
///   packed prefix holding the rest.
///
/// A packed tree of `count` elements has children of [`child_size`]
/// elements each, the last of which may be smaller but is itself packed.
#[derive(Clone, Debug)]
pub enum VectorNode {
    Leaf {
        count: u64,
        items: Vec<Ref>,
        prefix: Option<Ref>,
    },
    Tree {
        count: u64,
        children: Vec<Ref>,
    },
}

/// Elements per full child of a packed tree of `count` elements: the
/// largest `16^k` strictly below `count`.
pub(crate) fn child_size(count: u64) -> u64 {
    let mut size = CHUNK;
    while size.saturating_mul(CHUNK) < count {
        size *= CHUNK;
    }
    size
}

pub(crate) fn expect_vector(cell: &Cell) -> CellResult<&VectorNode> {
    match cell.value() {
        Value::Vector(node) => Ok(node),
        _ => Err(CellError::WrongType {
            expected: "vector",
            actual: cell.cell_type(),
        }),
    }
}

fn node_ref(node: VectorNode) -> Ref {
    Cell::new(Value::Vector(node)).to_ref()
}

fn with_child<T>(r: &Ref, f: impl FnOnce(&VectorNode) -> CellResult<T>) -> CellResult<T> {
    let cell = r.value()?;
    f(expect_vector(&cell)?)
}

impl VectorNode {
    pub fn empty() -> Self {
        Self::Leaf {
            count: 0,
            items: Vec::new(),
            prefix: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    pub fn count(&self) -> u64 {
        match self {
            Self::Leaf { count, .. } | Self::Tree { count, .. } => *count,
        }
    }

    pub(crate) fn for_each_ref(&self, f: &mut dyn FnMut(&Ref)) {
        match self {
            Self::Leaf { items, prefix, .. } => {
                items.iter().for_each(&mut *f);
                if let Some(prefix) = prefix {
                    f(prefix);
                }
            }
            Self::Tree { children, .. } => children.iter().for_each(f),
        }
    }

    pub(crate) fn map_refs<E>(
        &self,
        f: &mut dyn FnMut(&Ref) -> Result<Ref, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::Leaf {
                count,
                items,
                prefix,
            } => Self::Leaf {
                count: *count,
                items: items.iter().map(|r| f(r)).collect::<Result<_, _>>()?,
                prefix: prefix.as_ref().map(|p| f(p)).transpose()?,
            },
            Self::Tree { count, children } => Self::Tree {
                count: *count,
                children: children.iter().map(|c| f(c)).collect::<Result<_, _>>()?,
            },
        })
    }

    /// Canonical node holding `items` in order.
    pub(crate) fn from_refs(items: Vec<Ref>) -> Self {
        let n = items.len();
        if n <= FANOUT {
            return Self::Leaf {
                count: n as u64,
                items,
                prefix: None,
            };
        }
        let rem = n % FANOUT;
        if rem == 0 {
            return Self::packed(&items);
        }
        Self::Leaf {
            count: n as u64,
            items: items[n - rem..].to_vec(),
            prefix: Some(node_ref(Self::packed(&items[..n - rem]))),
        }
    }

    fn packed(items: &[Ref]) -> Self {
        let n = items.len() as u64;
        if n == CHUNK {
            return Self::Leaf {
                count: n,
                items: items.to_vec(),
                prefix: None,
            };
        }
        let size = child_size(n) as usize;
        Self::Tree {
            count: n,
            children: items.chunks(size).map(|c| node_ref(Self::packed(c))).collect(),
        }
    }

    /// Element `i`. The caller checks the bound.
    pub(crate) fn get(&self, i: u64) -> CellResult<Ref> {
        match self {
            Self::Leaf {
                count,
                items,
                prefix,
            } => {
                let pc = count - items.len() as u64;
                match prefix {
                    Some(p) if i < pc => with_child(p, |n| n.get(i)),
                    _ => Ok(items[(i - pc) as usize].clone()),
                }
            }
            Self::Tree { count, children } => {
                let size = child_size(*count);
                with_child(&children[(i / size) as usize], |c| c.get(i % size))
            }
        }
    }

    /// Replace element `i`, rewriting one path.
    pub(crate) fn assoc(&self, i: u64, value: Ref) -> CellResult<Self> {
        match self {
            Self::Leaf {
                count,
                items,
                prefix,
            } => {
                let pc = count - items.len() as u64;
                if let (true, Some(p)) = (i < pc, prefix) {
                    let updated = with_child(p, |n| n.assoc(i, value))?;
                    return Ok(Self::Leaf {
                        count: *count,
                        items: items.clone(),
                        prefix: Some(node_ref(updated)),
                    });
                }
                let mut items = items.clone();
                items[(i - pc) as usize] = value;
                Ok(Self::Leaf {
                    count: *count,
                    items,
                    prefix: prefix.clone(),
                })
            }
            Self::Tree { count, children } => {
                let size = child_size(*count);
                let idx = (i / size) as usize;
                let updated = with_child(&children[idx], |c| c.assoc(i % size, value))?;
                let mut children = children.clone();
                children[idx] = node_ref(updated);
                Ok(Self::Tree {
                    count: *count,
                    children,
                })
            }
        }
    }

    /// Add one element at the end.
    pub(crate) fn append(&self, value: Ref) -> CellResult<Self> {
        match self {
            Self::Leaf {
                count,
                items,
                prefix,
            } => {
                let room = if prefix.is_some() { FANOUT - 1 } else { FANOUT };
                if items.len() < room {
                    let mut items = items.clone();
                    items.push(value);
                    return Ok(Self::Leaf {
                        count: count + 1,
                        items,
                        prefix: prefix.clone(),
                    });
                }
                let Some(prefix) = prefix else {
                    // A full chunk becomes the prefix of the next leaf.
                    return Ok(Self::Leaf {
                        count: count + 1,
                        items: vec![value],
                        prefix: Some(node_ref(self.clone())),
                    });
                };
                let mut chunk = items.clone();
                chunk.push(value);
                let chunk = node_ref(Self::Leaf {
                    count: CHUNK,
                    items: chunk,
                    prefix: None,
                });
                append_chunk(prefix, chunk)
            }
            Self::Tree { count, .. } => Ok(Self::Leaf {
                count: count + 1,
                items: vec![value],
                prefix: Some(node_ref(self.clone())),
            }),
        }
    }

    /// The first `n` elements.
    pub(crate) fn take(&self, n: u64) -> CellResult<Self> {
        let count = self.count();
        if n >= count {
            return Ok(self.clone());
        }
        if n == 0 {
            return Ok(Self::empty());
        }
        match self {
            Self::Leaf { items, prefix, .. } => {
                let pc = count - items.len() as u64;
                if let (true, Some(p)) = (n <= pc, prefix) {
                    return with_child(p, |node| node.take(n));
                }
                Ok(Self::Leaf {
                    count: n,
                    items: items[..(n - pc) as usize].to_vec(),
                    prefix: prefix.clone(),
                })
            }
            Self::Tree { children, .. } => {
                let size = child_size(count);
                if n <= size {
                    return with_child(&children[0], |c| c.take(n));
                }
                let rem = n % CHUNK;
                if rem != 0 {
                    let packed = self.take(n - rem)?;
                    let mut items = Vec::with_capacity(rem as usize);
                    self.collect_range(n - rem, n, &mut items)?;
                    return Ok(Self::Leaf {
                        count: n,
                        items,
                        prefix: Some(node_ref(packed)),
                    });
                }
                let full = (n / size) as usize;
                let mut kept = children[..full].to_vec();
                let tail = n % size;
                if tail > 0 {
                    kept.push(node_ref(with_child(&children[full], |c| c.take(tail))?));
                }
                Ok(Self::Tree {
                    count: n,
                    children: kept,
                })
            }
        }
    }

    /// Push elements `start..end` onto `out`.
    pub(crate) fn collect_range(&self, start: u64, end: u64, out: &mut Vec<Ref>) -> CellResult<()> {
        if start >= end {
            return Ok(());
        }
        match self {
            Self::Leaf {
                count,
                items,
                prefix,
            } => {
                let pc = count - items.len() as u64;
                if let (true, Some(p)) = (start < pc, prefix) {
                    with_child(p, |n| n.collect_range(start, end.min(pc), out))?;
                }
                let from = start.max(pc);
                if from < end {
                    out.extend_from_slice(&items[(from - pc) as usize..(end - pc) as usize]);
                }
            }
            Self::Tree { count, children } => {
                let size = child_size(*count);
                for idx in start / size..=(end - 1) / size {
                    let base = idx * size;
                    let lo = start.max(base) - base;
                    let hi = end.min(base + size) - base;
                    with_child(&children[idx as usize], |c| c.collect_range(lo, hi, out))?;
                }
            }
        }
        Ok(())
    }
}

/// Grow a packed vector by one full chunk.
fn append_chunk(packed: &Ref, chunk: Ref) -> CellResult<VectorNode> {
    with_child(packed, |node| match node {
        VectorNode::Leaf { count, .. } => Ok(VectorNode::Tree {
            count: count + CHUNK,
            children: vec![packed.clone(), chunk],
        }),
        VectorNode::Tree { count, children } => {
            let size = child_size(*count);
            if *count == size * CHUNK {
                return Ok(VectorNode::Tree {
                    count: count + CHUNK,
                    children: vec![packed.clone(), chunk],
                });
            }
            let mut children = children.clone();
            let last = children.len() - 1;
            let last_count = count - size * last as u64;
            if last_count == size {
                children.push(chunk);
            } else {
                children[last] = node_ref(append_chunk(&children[last], chunk)?);
            }
            Ok(VectorNode::Tree {
                count: count + CHUNK,
                children,
            })
        }
    })
}

/// Length of the common prefix of two vector cells.
///
/// Equal subtrees are recognized by hash without visiting their elements.
pub(crate) fn common_prefix(a: &Cell, b: &Cell) -> CellResult<u64> {
    let (an, bn) = (expect_vector(a)?, expect_vector(b)?);
    if a.hash() == b.hash() {
        return Ok(an.count());
    }
    let limit = an.count().min(bn.count());
    match (an, bn) {
        (
            VectorNode::Tree {
                count: ac,
                children: ach,
            },
            VectorNode::Tree {
                count: bc,
                children: bch,
            },
        ) if child_size(*ac) == child_size(*bc) => {
            let size = child_size(*ac);
            let mut total = 0;
            for (x, y) in ach.iter().zip(bch) {
                let n = common_prefix(&x.value()?, &y.value()?)?;
                total += n;
                if n < size {
                    break;
                }
            }
            Ok(total)
        }
        (VectorNode::Tree { count, children }, _) if bn.count() <= child_size(*count) => {
            common_prefix(&children[0].value()?, b)
        }
        (_, VectorNode::Tree { count, children }) if an.count() <= child_size(*count) => {
            common_prefix(a, &children[0].value()?)
        }
        (
            VectorNode::Leaf {
                prefix: Some(p), ..
            },
            _,
        ) => {
            let cell = p.value()?;
            let n = common_prefix(&cell, b)?;
            if n < expect_vector(&cell)?.count() {
                return Ok(n);
            }
            scan(an, bn, n, limit)
        }
        (
            _,
            VectorNode::Leaf {
                prefix: Some(p), ..
            },
        ) => {
            let cell = p.value()?;
            let n = common_prefix(a, &cell)?;
            if n < expect_vector(&cell)?.count() {
                return Ok(n);
            }
            scan(an, bn, n, limit)
        }
        _ => scan(an, bn, 0, limit),
    }
}

fn scan(a: &VectorNode, b: &VectorNode, from: u64, limit: u64) -> CellResult<u64> {
    for i in from..limit {
        if a.get(i)?.hash() != b.get(i)?.hash() {
            return Ok(i);
        }
    }
    Ok(limit.max(from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(n: u64) -> Vec<Ref> {
        (0..n).map(|i| Cell::integer(i as i64).to_ref()).collect()
    }

    #[test]
    fn child_size_is_largest_power_below() {
        assert_eq!(child_size(32), 16);
        assert_eq!(child_size(256), 16);
        assert_eq!(child_size(272), 256);
        assert_eq!(child_size(4096), 256);
        assert_eq!(child_size(4112), 4096);
    }

    #[test]
    fn canonical_shapes() {
        assert!(VectorNode::from_refs(refs(16)).is_leaf());
        let VectorNode::Leaf { items, prefix, .. } = VectorNode::from_refs(refs(17)) else {
            panic!("expected leaf");
        };
        assert_eq!(items.len(), 1);
        assert!(prefix.is_some());
        let VectorNode::Tree { children, .. } = VectorNode::from_refs(refs(288)) else {
            panic!("expected tree");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn incremental_append_matches_bulk_build() {
        let mut node = VectorNode::empty();
        for (i, r) in refs(600).into_iter().enumerate() {
            node = node.append(r).unwrap();
            if i % 37 == 0 {
                let bulk = VectorNode::from_refs(refs(i as u64 + 1));
                assert_eq!(
                    Cell::new(Value::Vector(node.clone())).hash(),
                    Cell::new(Value::Vector(bulk)).hash(),
                    "shape differs at {}",
                    i + 1
                );
            }
        }
    }

    #[test]
    fn take_matches_bulk_build() {
        let node = VectorNode::from_refs(refs(700));
        for n in [0, 1, 15, 16, 17, 32, 255, 256, 257, 272, 300, 699] {
            let taken = node.take(n).unwrap();
            let bulk = VectorNode::from_refs(refs(n));
            assert_eq!(
                Cell::new(Value::Vector(taken)).hash(),
                Cell::new(Value::Vector(bulk)).hash(),
                "take {n}"
            );
        }
    }

    #[test]
    fn collect_range_crosses_children() {
        let node = VectorNode::from_refs(refs(500));
        let mut out = Vec::new();
        node.collect_range(250, 470, &mut out).unwrap();
        assert_eq!(out.len(), 220);
        assert_eq!(out[0], Cell::integer(250).to_ref());
        assert_eq!(out[219], Cell::integer(469).to_ref());
    }
}
