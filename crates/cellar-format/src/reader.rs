use cellar_types::{Hash, HASH_LENGTH};

use crate::error::{DecodeError, DecodeResult};
use crate::{MAX_VLC_COUNT_LENGTH, MAX_VLC_LONG_LENGTH};

/// Bounds-checked cursor over an encoding.
///
/// Every read either succeeds or returns a [`DecodeError`] carrying the
/// absolute offset of the failure; nothing here panics on malformed input.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` once all input is consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Next byte without consuming it.
    pub fn peek_u8(&self) -> DecodeResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: 1,
            })
    }

    /// Consume one byte.
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Consume `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume a big-endian `u16`.
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Consume a big-endian `u64`.
    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    /// Consume a 32-byte hash.
    pub fn read_hash(&mut self) -> DecodeResult<Hash> {
        let bytes = self.read_bytes(HASH_LENGTH)?;
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Hash::new(arr))
    }

    /// Consume a signed VLC integer, rejecting redundant leading groups.
    pub fn read_vlc_long(&mut self) -> DecodeResult<i64> {
        let start = self.pos;
        let first = self.read_u8()?;
        // Sign-extend the 7 payload bits of the first byte.
        let mut value = (((first & 0x7F) as i64) << 57) >> 57;
        let mut last = first;
        let mut len = 1;

        if first & 0x80 != 0 {
            let next = self.peek_u8()?;
            let redundant = (first == 0x80 && next & 0x40 == 0) || (first == 0xFF && next & 0x40 != 0);
            if redundant {
                return Err(DecodeError::NonCanonical {
                    offset: start,
                    reason: "redundant leading VLC group".into(),
                });
            }
        }

        while last & 0x80 != 0 {
            if len == MAX_VLC_LONG_LENGTH {
                return Err(DecodeError::Overflow { offset: start });
            }
            last = self.read_u8()?;
            len += 1;
            if len == MAX_VLC_LONG_LENGTH && first != 0x80 && first != 0xFF {
                return Err(DecodeError::Overflow { offset: start });
            }
            value = (value << 7) | (last & 0x7F) as i64;
        }
        Ok(value)
    }

    /// Consume an unsigned VLC count, rejecting a leading zero group.
    pub fn read_vlc_count(&mut self) -> DecodeResult<u64> {
        let start = self.pos;
        let first = self.read_u8()?;
        if first == 0x80 {
            return Err(DecodeError::NonCanonical {
                offset: start,
                reason: "leading zero group in VLC count".into(),
            });
        }
        let mut value = (first & 0x7F) as u64;
        let mut last = first;
        let mut len = 1;
        while last & 0x80 != 0 {
            if len == MAX_VLC_COUNT_LENGTH {
                return Err(DecodeError::Overflow { offset: start });
            }
            last = self.read_u8()?;
            len += 1;
            value = (value << 7) | (last & 0x7F) as u64;
        }
        Ok(value)
    }

    /// Consume a VLC count that must fit in memory-sized indices.
    pub fn read_vlc_usize(&mut self) -> DecodeResult<usize> {
        let start = self.pos;
        let n = self.read_vlc_count()?;
        usize::try_from(n).map_err(|_| DecodeError::Overflow { offset: start })
    }

    /// Fail unless all input has been consumed.
    pub fn expect_end(&self) -> DecodeResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                offset: self.pos,
                count: self.remaining(),
            })
        }
    }

    /// Build a structural error at the current offset.
    pub fn invalid(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::InvalidStructure {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    /// Build a canonicality error at the current offset.
    pub fn non_canonical(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::NonCanonical {
            offset: self.pos,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_values() {
        let data = [0x01, 0x02, 0x03, 0, 0, 0, 0, 0, 0, 1, 0x2A];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16().unwrap(), 0x0203);
        assert_eq!(r.read_u64().unwrap(), 1);
        assert_eq!(r.position(), 11 - 1);
        assert_eq!(r.peek_u8().unwrap(), 0x2A);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn truncation_reports_offset_and_shortfall() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.read_u8().unwrap();
        assert_eq!(
            r.read_bytes(5),
            Err(DecodeError::UnexpectedEnd {
                offset: 1,
                needed: 3
            })
        );
    }

    #[test]
    fn hash_is_read_whole() {
        let data = [7u8; HASH_LENGTH];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_hash().unwrap(), Hash::new([7u8; HASH_LENGTH]));
        assert!(r.expect_end().is_ok());
        assert!(Reader::new(&data[..10]).read_hash().is_err());
    }

    #[test]
    fn vlc_inside_buffer_reports_absolute_offset() {
        let data = [0x00, 0x00, 0x80, 0x01];
        let mut r = Reader::new(&data);
        r.read_u16().unwrap();
        assert!(matches!(
            r.read_vlc_long(),
            Err(DecodeError::NonCanonical { offset: 2, .. })
        ));
    }
}
