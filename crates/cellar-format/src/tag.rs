//! Type tags.
//!
//! The high nibble of a tag selects its family; the families partition the
//! tag space between primitive values, references, blob-like and symbolic
//! values, collections, records, code and extension values.

/// `nil`.
pub const NULL: u8 = 0x00;
/// Signed 64-bit integer, VLC payload.
pub const INTEGER: u8 = 0x10;
/// IEEE-754 double, 8 bytes big-endian.
pub const DOUBLE: u8 = 0x1D;

/// Hash pointer to a non-embedded cell.
pub const REF: u8 = 0x20;

/// UTF-8 string (blob layout).
pub const STRING: u8 = 0x30;
/// Byte sequence.
pub const BLOB: u8 = 0x31;
/// Symbol name.
pub const SYMBOL: u8 = 0x32;
/// Keyword name.
pub const KEYWORD: u8 = 0x33;
/// Unicode scalar value.
pub const CHAR: u8 = 0x3C;

/// Packed vector.
pub const VECTOR: u8 = 0x80;
/// List (reversed vector body).
pub const LIST: u8 = 0x81;
/// Hash-trie map.
pub const MAP: u8 = 0x82;
/// Hash-trie set.
pub const SET: u8 = 0x83;
/// Hex-keyed Patricia trie.
pub const BLOB_MAP: u8 = 0x84;

/// Boolean `false`.
pub const FALSE: u8 = 0xB0;
/// Boolean `true`.
pub const TRUE: u8 = 0xB1;

/// Address value, VLC count payload.
pub const ADDRESS: u8 = 0xEA;

/// Namespace a tag belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagFamily {
    /// Nil and numeric primitives (0x00–0x1F).
    Primitive,
    /// Hash pointers (0x20–0x2F).
    Reference,
    /// Strings, blobs, symbols, keywords, chars (0x30–0x3F).
    BlobLike,
    /// Persistent collections (0x80–0x8F).
    Collection,
    /// Record structures (0xA0–0xAF).
    Record,
    /// Byte flags such as booleans (0xB0–0xBF).
    ByteFlag,
    /// Executable code (0xC0–0xCF).
    Code,
    /// Extension values such as addresses (0xE0–0xEF).
    Extension,
    /// Unassigned ranges.
    Unassigned,
}

impl TagFamily {
    /// Classify a tag byte.
    pub fn of(tag: u8) -> Self {
        match tag >> 4 {
            0x0 | 0x1 => Self::Primitive,
            0x2 => Self::Reference,
            0x3 => Self::BlobLike,
            0x8 => Self::Collection,
            0xA => Self::Record,
            0xB => Self::ByteFlag,
            0xC => Self::Code,
            0xE => Self::Extension,
            _ => Self::Unassigned,
        }
    }
}

/// Returns `true` if the tag is assigned to a value type this format decodes.
pub fn is_known(tag: u8) -> bool {
    matches!(
        tag,
        NULL | INTEGER
            | DOUBLE
            | REF
            | STRING
            | BLOB
            | SYMBOL
            | KEYWORD
            | CHAR
            | VECTOR
            | LIST
            | MAP
            | SET
            | BLOB_MAP
            | FALSE
            | TRUE
            | ADDRESS
    )
}
