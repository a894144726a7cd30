use bytes::{Bytes, BytesMut};
use cellar_format::{CHUNK_LENGTH, FANOUT};

use super::{expect_blob, Blob, BlobNode};
use crate::error::CellResult;
use crate::refs::Ref;

const CHUNK: u64 = CHUNK_LENGTH as u64;

/// Bytes covered by each full child of a tree of `len` bytes: the largest
/// `CHUNK_LENGTH * 16^k` strictly below `len`.
pub(crate) fn child_length(len: u64) -> u64 {
    let mut size = CHUNK;
    while size.saturating_mul(FANOUT as u64) < len {
        size *= FANOUT as u64;
    }
    size
}

pub(super) fn build(bytes: Bytes) -> BlobNode {
    let len = bytes.len();
    if len <= CHUNK_LENGTH {
        return BlobNode::Leaf(bytes);
    }
    let size = child_length(len as u64) as usize;
    let children = (0..len)
        .step_by(size)
        .map(|start| {
            let end = (start + size).min(len);
            node_ref(build(bytes.slice(start..end)))
        })
        .collect();
    BlobNode::Tree {
        count: len as u64,
        children,
    }
}

fn node_ref(node: BlobNode) -> Ref {
    Blob::from_node(node).into_cell().to_ref()
}

fn with_child<T>(r: &Ref, f: impl FnOnce(&BlobNode) -> CellResult<T>) -> CellResult<T> {
    let cell = r.value()?;
    f(expect_blob(&cell)?)
}

pub(super) fn byte_at(node: &BlobNode, i: u64) -> CellResult<u8> {
    match node {
        BlobNode::Leaf(bytes) => Ok(bytes[i as usize]),
        BlobNode::Tree { count, children } => {
            assert!(i < *count, "byte {i} out of range for length {count}");
            let size = child_length(*count);
            with_child(&children[(i / size) as usize], |c| byte_at(c, i % size))
        }
    }
}

pub(super) fn get_chunk(node: &BlobNode, i: u64) -> CellResult<Blob> {
    match node {
        BlobNode::Leaf(bytes) => Ok(Blob::from(bytes.clone())),
        BlobNode::Tree { count, children } => {
            let per_child = child_length(*count) / CHUNK;
            let child = children[(i / per_child) as usize].value()?;
            if expect_blob(&child)?.is_leaf() {
                return Blob::try_from(child);
            }
            get_chunk(expect_blob(&child)?, i % per_child)
        }
    }
}

pub(super) fn to_bytes(node: &BlobNode) -> CellResult<Bytes> {
    match node {
        BlobNode::Leaf(bytes) => Ok(bytes.clone()),
        BlobNode::Tree { count, .. } => {
            let mut out = BytesMut::with_capacity(*count as usize);
            write_range(node, 0, *count, &mut out)?;
            Ok(out.freeze())
        }
    }
}

fn write_range(node: &BlobNode, start: u64, len: u64, out: &mut BytesMut) -> CellResult<()> {
    match node {
        BlobNode::Leaf(bytes) => {
            out.extend_from_slice(&bytes[start as usize..(start + len) as usize]);
        }
        BlobNode::Tree { count, children } => {
            let size = child_length(*count);
            let end = start + len;
            let mut pos = start;
            while pos < end {
                let idx = pos / size;
                let child_end = ((idx + 1) * size).min(end);
                let offset = pos - idx * size;
                with_child(&children[idx as usize], |c| {
                    write_range(c, offset, child_end - pos, out)
                })?;
                pos = child_end;
            }
        }
    }
    Ok(())
}

pub(super) fn slice(node: &BlobNode, start: u64, len: u64) -> CellResult<BlobNode> {
    match node {
        BlobNode::Leaf(bytes) => Ok(BlobNode::Leaf(
            bytes.slice(start as usize..(start + len) as usize),
        )),
        BlobNode::Tree { count, children } => {
            if len == 0 {
                return Ok(BlobNode::Leaf(Bytes::new()));
            }
            let size = child_length(*count);
            let first = start / size;
            if first == (start + len - 1) / size {
                return with_child(&children[first as usize], |c| {
                    slice(c, start - first * size, len)
                });
            }
            let mut out = BytesMut::with_capacity(len as usize);
            write_range(node, start, len, &mut out)?;
            Ok(build(out.freeze()))
        }
    }
}

/// A canonical subtree paired with the number of bytes it covers.
type Piece = (Ref, u64);

pub(super) fn append(a: &BlobNode, b: &BlobNode) -> CellResult<BlobNode> {
    let total = a.len() + b.len();
    if total <= CHUNK {
        let mut out = BytesMut::with_capacity(total as usize);
        out.extend_from_slice(&to_bytes(a)?);
        out.extend_from_slice(&to_bytes(b)?);
        return Ok(BlobNode::Leaf(out.freeze()));
    }

    let mut pieces = Vec::new();
    complete_subtrees(a, &mut pieces)?;
    if a.len() % CHUNK == 0 {
        let mut chunks = Vec::new();
        collect_chunks(b, &mut chunks)?;
        let mut left = b.len();
        for chunk in chunks {
            let len = left.min(CHUNK);
            left -= len;
            pieces.push((chunk, len));
        }
    } else {
        // The partial last chunk of `a` absorbs the head of `b`.
        let mut tail = BytesMut::with_capacity((a.len() % CHUNK + b.len()) as usize);
        if let Some((last, _)) = pieces.pop() {
            tail.extend_from_slice(&with_child(&last, to_bytes)?);
        }
        tail.extend_from_slice(&to_bytes(b)?);
        let tail = tail.freeze();
        for start in (0..tail.len()).step_by(CHUNK_LENGTH) {
            let end = (start + CHUNK_LENGTH).min(tail.len());
            pieces.push((node_ref(BlobNode::Leaf(tail.slice(start..end))), (end - start) as u64));
        }
    }
    from_pieces(&pieces, total)
}

/// Split `node` into its complete children, descending only into the
/// partial last child. Every piece starts at a multiple of its own length.
fn complete_subtrees(node: &BlobNode, out: &mut Vec<Piece>) -> CellResult<()> {
    let BlobNode::Tree { count, children } = node else {
        if node.len() > 0 {
            out.push((node_ref(node.clone()), node.len()));
        }
        return Ok(());
    };
    let size = child_length(*count);
    let last = children.len() - 1;
    for (i, child) in children.iter().enumerate() {
        let len = if i == last { count - size * last as u64 } else { size };
        if len == size {
            out.push((child.clone(), len));
            continue;
        }
        with_child(child, |inner| match inner {
            BlobNode::Leaf(_) => {
                out.push((child.clone(), len));
                Ok(())
            }
            tree => complete_subtrees(tree, out),
        })?;
    }
    Ok(())
}

/// Leaf-level chunk refs of `node`, in order, reusing existing cells.
fn collect_chunks(node: &BlobNode, out: &mut Vec<Ref>) -> CellResult<()> {
    match node {
        BlobNode::Leaf(bytes) => {
            if !bytes.is_empty() {
                out.push(node_ref(BlobNode::Leaf(bytes.clone())));
            }
        }
        BlobNode::Tree { children, .. } => {
            for child in children {
                let cell = child.value()?;
                let inner = expect_blob(&cell)?;
                if inner.is_leaf() {
                    out.push(child.clone());
                } else {
                    collect_chunks(inner, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Canonical node over aligned `pieces` totalling `total` bytes. A piece
/// that exactly fills a child slot is reused as that child.
fn from_pieces(pieces: &[Piece], total: u64) -> CellResult<BlobNode> {
    if let [(only, _)] = pieces {
        return with_child(only, |n| Ok(n.clone()));
    }
    let size = child_length(total);
    let mut children = Vec::new();
    let mut start = 0;
    while start < pieces.len() {
        let mut end = start;
        let mut group_len = 0;
        while end < pieces.len() && group_len < size {
            group_len += pieces[end].1;
            end += 1;
        }
        children.push(match &pieces[start..end] {
            [(r, _)] => r.clone(),
            group => node_ref(from_pieces(group, group_len)?),
        });
        start = end;
    }
    Ok(BlobNode::Tree {
        count: total,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_length_is_largest_power_below() {
        assert_eq!(child_length(CHUNK + 1), CHUNK);
        assert_eq!(child_length(CHUNK * 16), CHUNK);
        assert_eq!(child_length(CHUNK * 16 + 1), CHUNK * 16);
        assert_eq!(child_length(CHUNK * 256), CHUNK * 16);
    }

    #[test]
    fn build_splits_into_full_children() {
        let node = build(Bytes::from(vec![0u8; CHUNK_LENGTH * 3 + 1]));
        let BlobNode::Tree { count, children } = node else {
            panic!("expected tree");
        };
        assert_eq!(count, CHUNK * 3 + 1);
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn append_keeps_complete_subtrees() {
        let a = build(Bytes::from(vec![1u8; CHUNK_LENGTH * 32]));
        let b = build(Bytes::from(vec![2u8; CHUNK_LENGTH]));
        let joined = append(&a, &b).unwrap();
        let (BlobNode::Tree { children: before, .. }, BlobNode::Tree { children: after, .. }) =
            (&a, &joined)
        else {
            panic!("expected trees");
        };
        assert_eq!(after.len(), 3);
        for i in 0..2 {
            let (old, new) = (before[i].try_value().unwrap(), after[i].try_value().unwrap());
            assert!(old.ptr_eq(&new), "subtree {i} rebuilt");
        }
    }

    #[test]
    fn repeated_unaligned_appends_stay_canonical() {
        let mut node = BlobNode::Leaf(Bytes::new());
        let mut flat = Vec::new();
        for i in 0..120u32 {
            let piece: Vec<u8> = (0..1000 + i).map(|j| (i ^ j) as u8).collect();
            flat.extend_from_slice(&piece);
            node = append(&node, &BlobNode::Leaf(Bytes::from(piece))).unwrap();
        }
        let expected = build(Bytes::from(flat));
        assert_eq!(node_ref(node).hash(), node_ref(expected).hash());
    }
}
