//! Variable-length integer coding.
//!
//! Both forms write 7 payload bits per byte, most significant group first,
//! with the high bit of every byte except the last set as a continuation
//! flag.
//!
//! - **VLC long** (signed): bit 6 of the first byte is the sign and is
//!   sign-extended on read, so values in `[-64, 64)` take one byte.
//! - **VLC count** (unsigned): no sign bit, values in `[0, 128)` take one
//!   byte. Counts are limited to `i64::MAX`.
//!
//! Canonical encodings never carry a redundant leading group; readers reject
//! them (see [`Reader::read_vlc_long`](crate::Reader::read_vlc_long)).

use bytes::BufMut;

use crate::error::DecodeResult;
use crate::reader::Reader;

/// Number of bytes [`write_vlc_long`] produces for `x`.
pub fn vlc_long_length(x: i64) -> usize {
    if (-64..64).contains(&x) {
        return 1;
    }
    // Bits needed for two's complement, including the sign bit.
    let magnitude = if x < 0 { !x } else { x };
    let bits = 65 - magnitude.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Write a signed VLC integer.
pub fn write_vlc_long(out: &mut impl BufMut, x: i64) {
    let n = vlc_long_length(x);
    for i in (1..n).rev() {
        let bits = ((x >> (7 * i)) & 0x7F) as u8;
        out.put_u8(0x80 | bits);
    }
    out.put_u8((x & 0x7F) as u8);
}

/// Number of bytes [`write_vlc_count`] produces for `n`.
pub fn vlc_count_length(n: u64) -> usize {
    if n < 0x80 {
        return 1;
    }
    let bits = 64 - n.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Write an unsigned VLC count.
///
/// # Panics
///
/// Panics if `n > i64::MAX`; no structure in this format holds that many
/// elements.
pub fn write_vlc_count(out: &mut impl BufMut, n: u64) {
    assert!(n <= i64::MAX as u64, "count {n} exceeds VLC count range");
    let len = vlc_count_length(n);
    for i in (1..len).rev() {
        let bits = ((n >> (7 * i)) & 0x7F) as u8;
        out.put_u8(0x80 | bits);
    }
    out.put_u8((n & 0x7F) as u8);
}

/// Encode a signed VLC integer into a fresh buffer.
pub fn encode_long(x: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(vlc_long_length(x));
    write_vlc_long(&mut out, x);
    out
}

/// Encode an unsigned VLC count into a fresh buffer.
pub fn encode_count(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(vlc_count_length(n));
    write_vlc_count(&mut out, n);
    out
}

/// Decode a signed VLC integer that must occupy all of `data`.
pub fn decode_long(data: &[u8]) -> DecodeResult<i64> {
    let mut reader = Reader::new(data);
    let x = reader.read_vlc_long()?;
    reader.expect_end()?;
    Ok(x)
}

/// Decode an unsigned VLC count that must occupy all of `data`.
pub fn decode_count(data: &[u8]) -> DecodeResult<u64> {
    let mut reader = Reader::new(data);
    let n = reader.read_vlc_count()?;
    reader.expect_end()?;
    Ok(n)
}
