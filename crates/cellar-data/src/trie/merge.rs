//! Lock-step walk over two tries.
//!
//! Both tries are descended together one hex digit at a time. Where one
//! side is a tree and the other a leaf, the leaf is split by digit without
//! building any cells. Subtrees with equal hashes, and subtrees present on
//! only one side, are handled wholesale according to the walk's policies,
//! so the resolver only ever sees keys that actually differ (or that a
//! `Resolve` policy asks for).

use std::cmp::Ordering;

use cellar_format::{FANOUT, MAP_LEAF_MAX};

use super::{node_of, Entry, HashKind, HashNode};
use crate::cell::Cell;
use crate::error::CellResult;
use crate::refs::Ref;

/// What to do with entries in a given position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Policy {
    Keep,
    Drop,
    /// Ask the resolver per entry.
    Resolve,
}

#[derive(Clone, Copy)]
enum Origin {
    Left,
    Right,
    Both,
}

/// Resolver: key, left value, right value; `None` drops the key.
pub(crate) type Resolver<'a> =
    dyn FnMut(&Ref, Option<&Ref>, Option<&Ref>) -> CellResult<Option<Ref>> + 'a;

/// A two-trie merge.
///
/// Keys whose values differ on the two sides always go to the resolver.
pub(crate) struct Merge<'a> {
    kind: HashKind,
    left_only: Policy,
    right_only: Policy,
    same: Policy,
    resolve: &'a mut Resolver<'a>,
}

// One side of the walk below some digit path.
struct Side {
    node: HashNode,
    /// The cell this node came from, reused when the subtree survives as is.
    origin: Option<Ref>,
}

impl Side {
    fn fresh(node: HashNode) -> Self {
        Self { node, origin: None }
    }

    fn into_ref(self, kind: HashKind) -> Ref {
        match self.origin {
            Some(r) => r,
            None => kind.wrap(self.node).to_ref(),
        }
    }
}

impl<'a> Merge<'a> {
    pub(crate) fn new(
        kind: HashKind,
        left_only: Policy,
        right_only: Policy,
        same: Policy,
        resolve: &'a mut Resolver<'a>,
    ) -> Self {
        Self {
            kind,
            left_only,
            right_only,
            same,
            resolve,
        }
    }

    /// Merge two map or set cells of this walk's kind.
    pub(crate) fn run(&mut self, left: &Cell, right: &Cell) -> CellResult<Cell> {
        let l = self.root(left)?;
        let r = self.root(right)?;
        Ok(match self.walk(l, r, 0)? {
            None => self.kind.wrap(HashNode::empty()),
            Some(Side {
                origin: Some(r), ..
            }) => r.value()?,
            Some(side) => self.kind.wrap(side.node),
        })
    }

    fn root(&self, cell: &Cell) -> CellResult<Option<Side>> {
        let node = node_of(self.kind, cell)?;
        Ok((!node.is_empty()).then(|| Side {
            node: node.clone(),
            origin: Some(cell.to_ref()),
        }))
    }

    fn policy(&self, origin: Origin) -> Policy {
        match origin {
            Origin::Left => self.left_only,
            Origin::Right => self.right_only,
            Origin::Both => self.same,
        }
    }

    fn walk(
        &mut self,
        left: Option<Side>,
        right: Option<Side>,
        shift: u8,
    ) -> CellResult<Option<Side>> {
        match (left, right) {
            (None, None) => Ok(None),
            (Some(l), None) => self.one_sided(l, Origin::Left, shift),
            (None, Some(r)) => self.one_sided(r, Origin::Right, shift),
            (Some(l), Some(r)) => {
                if let (Some(a), Some(b)) = (&l.origin, &r.origin) {
                    if a.hash() == b.hash() {
                        return self.one_sided(l, Origin::Both, shift);
                    }
                }
                if let (HashNode::Leaf(a), HashNode::Leaf(b)) = (&l.node, &r.node) {
                    return self.merge_leaves(a, b, shift);
                }
                self.split(l, r, shift)
            }
        }
    }

    /// A subtree found on one side only, or identical on both.
    fn one_sided(&mut self, side: Side, origin: Origin, shift: u8) -> CellResult<Option<Side>> {
        match self.policy(origin) {
            Policy::Keep => Ok(Some(side)),
            Policy::Drop => Ok(None),
            Policy::Resolve => {
                let mut out = Vec::new();
                for e in side.node.entries(self.kind)? {
                    self.emit(&e, origin, &mut out)?;
                }
                Ok(self.finish(shift, out))
            }
        }
    }

    fn merge_leaves(&mut self, a: &[Entry], b: &[Entry], shift: u8) -> CellResult<Option<Side>> {
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            let ord = match (a.get(i), b.get(j)) {
                (Some(x), Some(y)) => x.key.hash().cmp(&y.key.hash()),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match ord {
                Ordering::Less => {
                    self.emit(&a[i], Origin::Left, &mut out)?;
                    i += 1;
                }
                Ordering::Greater => {
                    self.emit(&b[j], Origin::Right, &mut out)?;
                    j += 1;
                }
                Ordering::Equal => {
                    if a[i].value.hash() == b[j].value.hash() {
                        self.emit(&a[i], Origin::Both, &mut out)?;
                    } else if let Some(value) =
                        (self.resolve)(&a[i].key, Some(&a[i].value), Some(&b[j].value))?
                    {
                        out.push(Entry::new(a[i].key.clone(), value));
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        Ok(self.finish(shift, out))
    }

    fn emit(&mut self, e: &Entry, origin: Origin, out: &mut Vec<Entry>) -> CellResult<()> {
        match self.policy(origin) {
            Policy::Keep => out.push(e.clone()),
            Policy::Drop => {}
            Policy::Resolve => {
                let value = match origin {
                    Origin::Left => (self.resolve)(&e.key, Some(&e.value), None)?,
                    Origin::Right => (self.resolve)(&e.key, None, Some(&e.value))?,
                    Origin::Both => (self.resolve)(&e.key, Some(&e.value), Some(&e.value))?,
                };
                if let Some(value) = value {
                    out.push(Entry::new(e.key.clone(), value));
                }
            }
        }
        Ok(())
    }

    fn finish(&self, shift: u8, entries: Vec<Entry>) -> Option<Side> {
        if entries.is_empty() {
            return None;
        }
        Some(Side::fresh(HashNode::from_entries(self.kind, shift, entries)))
    }

    fn split(&mut self, l: Side, r: Side, shift: u8) -> CellResult<Option<Side>> {
        let lparts = self.parts(l, shift)?;
        let rparts = self.parts(r, shift)?;
        let mut results = Vec::with_capacity(FANOUT);
        for (lp, rp) in lparts.into_iter().zip(rparts) {
            results.push(self.walk(lp, rp, shift + 1)?);
        }
        self.assemble(shift, results)
    }

    /// The sixteen digit-indexed parts of a side at `shift`.
    fn parts(&self, side: Side, shift: u8) -> CellResult<Vec<Option<Side>>> {
        let mut parts: Vec<Option<Side>> = (0..FANOUT).map(|_| None).collect();
        match side.node {
            HashNode::Leaf(entries) => {
                for e in entries {
                    let digit = e.key.hash().digit(shift as usize) as usize;
                    match &mut parts[digit] {
                        Some(Side {
                            node: HashNode::Leaf(group),
                            ..
                        }) => group.push(e),
                        slot => *slot = Some(Side::fresh(HashNode::Leaf(vec![e]))),
                    }
                }
            }
            HashNode::Tree { mask, children, .. } => {
                let mut children = children.into_iter();
                for (digit, part) in parts.iter_mut().enumerate() {
                    if mask & (1 << digit) == 0 {
                        continue;
                    }
                    if let Some(child) = children.next() {
                        let cell = child.value()?;
                        *part = Some(Side {
                            node: node_of(self.kind, &cell)?.clone(),
                            origin: Some(child),
                        });
                    }
                }
            }
        }
        Ok(parts)
    }

    fn assemble(&self, shift: u8, results: Vec<Option<Side>>) -> CellResult<Option<Side>> {
        let total: u64 = results.iter().flatten().map(|s| s.node.count()).sum();
        if total == 0 {
            return Ok(None);
        }
        if total as usize <= MAP_LEAF_MAX {
            let mut entries = Vec::with_capacity(total as usize);
            for side in results.iter().flatten() {
                entries.extend(side.node.entries(self.kind)?);
            }
            return Ok(Some(Side::fresh(HashNode::Leaf(entries))));
        }
        let mut mask = 0u16;
        let mut children = Vec::new();
        for (digit, side) in results.into_iter().enumerate() {
            if let Some(side) = side {
                mask |= 1 << digit;
                children.push(side.into_ref(self.kind));
            }
        }
        Ok(Some(Side::fresh(HashNode::Tree {
            count: total,
            shift,
            mask,
            children,
        })))
    }
}
