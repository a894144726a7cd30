//! Multi-cell messages.
//!
//! A message carries a cell together with the encodings of its descendants
//! so the receiver can rebuild the tree without a store. Layout: the top
//! cell's encoding, then zero or more `(VLC length, encoding)` records, one
//! per distinct non-embedded descendant held in memory by the sender.
//! Descendants the sender does not hold are left out; on the receiving side
//! they stay hash pointers.

use std::collections::{HashMap, HashSet};

use bytes::{BufMut, Bytes, BytesMut};
use cellar_format::vlc::write_vlc_count;
use cellar_format::Reader;
use cellar_types::Hash;
use tracing::debug;

use crate::cell::Cell;
use crate::decode::{decode_cell, decode_first};
use crate::error::CellResult;
use crate::refs::Ref;

/// Encode `cell` and every in-memory descendant into one message.
pub fn encode_multi(cell: &Cell) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(&cell.encoding());
    let mut seen = HashSet::new();
    write_descendants(cell, &mut seen, &mut out);
    out.freeze()
}

fn write_descendants(cell: &Cell, seen: &mut HashSet<Hash>, out: &mut BytesMut) {
    for r in cell.refs() {
        let Some(child) = r.try_value() else {
            continue;
        };
        if !r.is_embedded() {
            if !seen.insert(r.hash()) {
                continue;
            }
            let enc = child.encoding();
            write_vlc_count(out, enc.len() as u64);
            out.put_slice(&enc);
        }
        write_descendants(&child, seen, out);
    }
}

/// Decode a message produced by [`encode_multi`].
///
/// Every hash pointer whose target is in the message becomes a direct
/// reference; the others stay soft references with no store.
pub fn decode_multi(bytes: impl Into<Bytes>) -> CellResult<Cell> {
    let bytes = bytes.into();
    let (top, used) = decode_first(&bytes, None)?;

    let mut index = HashMap::new();
    let mut reader = Reader::new(&bytes[used..]);
    while !reader.is_empty() {
        let len = reader.read_vlc_usize()?;
        let start = used + reader.position();
        reader.read_bytes(len)?;
        let cell = decode_cell(bytes.slice(start..start + len), None)?;
        index.insert(cell.hash(), cell);
    }
    debug!(
        top = %top.hash().short_hex(),
        cells = index.len() + 1,
        bytes = bytes.len(),
        "decoded multi-cell message"
    );

    let mut resolved = HashMap::new();
    attach(&top, &index, &mut resolved)
}

/// Replace hash pointers below `cell` with direct references to the cells
/// in `index`, sharing each rebuilt subtree between its parents.
fn attach(
    cell: &Cell,
    index: &HashMap<Hash, Cell>,
    resolved: &mut HashMap<Hash, Cell>,
) -> CellResult<Cell> {
    cell.try_update_refs(|r| {
        if r.is_embedded() {
            let child = r.value()?;
            let next = attach(&child, index, resolved)?;
            return Ok(if next.ptr_eq(&child) { r.clone() } else { next.to_ref() });
        }
        let hash = r.hash();
        if let Some(done) = resolved.get(&hash) {
            return Ok(done.to_ref());
        }
        let Some(raw) = index.get(&hash).cloned().or_else(|| r.try_value()) else {
            return Ok(r.clone());
        };
        let done = attach(&raw, index, resolved)?;
        resolved.insert(hash, done.clone());
        Ok(Ref::direct(done))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use crate::map::Map;
    use crate::vector::Vector;

    fn fully_resolved(cell: &Cell) -> bool {
        cell.refs()
            .iter()
            .all(|r| r.try_value().is_some_and(|c| fully_resolved(&c)))
    }

    #[test]
    fn message_rebuilds_whole_tree() {
        let map = Map::of((0..200).map(|i| {
            let v = Vector::of((0..i).map(Cell::integer));
            (Cell::integer(i), v.into_cell())
        }));
        let message = encode_multi(map.as_cell());
        assert!(message.len() > map.as_cell().encoding().len());

        let back = decode_multi(message).unwrap();
        assert_eq!(back, *map.as_cell());
        assert!(fully_resolved(&back));
        let back = Map::try_from(back).unwrap();
        assert_eq!(
            back.get(&Cell::integer(150)).unwrap(),
            Some(Vector::of((0..150).map(Cell::integer)).into_cell())
        );
    }

    #[test]
    fn small_cell_is_its_own_message() {
        let v = Vector::of((0..5).map(Cell::integer));
        let message = encode_multi(v.as_cell());
        assert_eq!(message, v.as_cell().encoding());
        assert_eq!(decode_multi(message).unwrap(), *v.as_cell());
    }

    #[test]
    fn shared_subtrees_are_sent_once() {
        let blob = Blob::new(vec![9u8; 1000]).into_cell();
        let v = Vector::of([blob.clone(), blob.clone(), blob]);
        let message = encode_multi(v.as_cell());
        assert_eq!(message.len(), v.as_cell().encoding().len() + 2 + 1003);
    }

    #[test]
    fn omitted_descendants_stay_pointers() {
        let v = Vector::of((0..300).map(Cell::integer));
        let back = decode_multi(v.as_cell().encoding()).unwrap();
        assert_eq!(back, *v.as_cell());
        assert!(!fully_resolved(&back));
    }

    #[test]
    fn corrupt_record_is_rejected() {
        let v = Vector::of((0..300).map(Cell::integer));
        let mut message = encode_multi(v.as_cell()).to_vec();
        message.truncate(message.len() - 1);
        assert!(decode_multi(message).is_err());
    }
}
