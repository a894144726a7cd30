use std::fmt;

use bytes::Bytes;

use crate::blob::{Blob, BlobNode};
use crate::cell::{Cell, Value};
use crate::error::{CellError, CellResult};

/// UTF-8 text stored in blob layout under the string tag.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Str(Cell);

impl Str {
    pub fn new(s: &str) -> Self {
        Self::from_node(BlobNode::from_bytes(Bytes::copy_from_slice(s.as_bytes())))
    }

    fn from_node(node: BlobNode) -> Self {
        Self(Cell::new(Value::Str(node)))
    }

    pub fn node(&self) -> &BlobNode {
        match self.0.value() {
            Value::Str(node) => node,
            _ => unreachable!("str wraps a string value"),
        }
    }

    pub fn as_cell(&self) -> &Cell {
        &self.0
    }

    pub fn into_cell(self) -> Cell {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.node().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_at(&self, i: u64) -> CellResult<u8> {
        self.node().byte_at(i)
    }

    /// The text, reassembled from all chunks.
    pub fn to_text(&self) -> CellResult<String> {
        let bytes = self.node().to_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CellError::invalid(format!("string is not UTF-8: {e}")))
    }

    /// The same bytes as a blob.
    pub fn to_blob(&self) -> Blob {
        Blob::from_node(self.node().clone())
    }

    pub fn append(&self, other: &Str) -> CellResult<Str> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        Ok(Self::from_node(self.node().append(other.node())?))
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Str> for Cell {
    fn from(s: Str) -> Self {
        s.0
    }
}

impl TryFrom<Cell> for Str {
    type Error = CellError;

    fn try_from(cell: Cell) -> CellResult<Self> {
        match cell.value() {
            Value::Str(_) => Ok(Self(cell)),
            _ => Err(CellError::WrongType {
                expected: "string",
                actual: cell.cell_type(),
            }),
        }
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(text) => write!(f, "{text:?}"),
            Err(_) => write!(f, "#string[{}]", self.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;

    #[test]
    fn short_string_encoding() {
        let s = Str::new("hi");
        assert_eq!(&s.as_cell().encoding()[..], b"\x30\x02hi");
        assert_eq!(s.to_text().unwrap(), "hi");
        assert_eq!(s.to_string(), "\"hi\"");
    }

    #[test]
    fn string_and_blob_differ_only_by_tag() {
        let s = Str::new("same bytes");
        let b = s.to_blob();
        assert_ne!(s.as_cell(), b.as_cell());
        assert_eq!(&s.as_cell().encoding()[1..], &b.as_cell().encoding()[1..]);
    }

    #[test]
    fn long_string_is_a_tree_of_blobs() {
        let text = "λ".repeat(5000);
        let s = Str::new(&text);
        assert_eq!(s.as_cell().cell_type(), CellType::StringTree);
        let child = s.as_cell().get_ref(0).value().unwrap();
        assert_eq!(child.cell_type(), CellType::BlobLeaf);
        assert_eq!(s.to_text().unwrap(), text);
    }

    #[test]
    fn append_joins_text() {
        let a = Str::new(&"a".repeat(4000));
        let b = Str::new(&"b".repeat(300));
        let joined = a.append(&b).unwrap();
        assert_eq!(joined, Str::new(&format!("{}{}", "a".repeat(4000), "b".repeat(300))));
    }
}
