use cellar_types::Hash;

/// Digest of a byte sequence: the content hash of a cell is the digest of
/// its canonical encoding.
pub fn digest(data: &[u8]) -> Hash {
    Hash::new(*blake3::hash(data).as_bytes())
}
