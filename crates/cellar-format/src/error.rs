use thiserror::Error;

/// Errors raised while decoding an encoding.
///
/// Every variant carries the byte offset at which decoding failed so that
/// malformed messages can be diagnosed without re-parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("unexpected end of input at offset {offset}: needed {needed} more bytes")]
    UnexpectedEnd { offset: usize, needed: usize },

    #[error("non-canonical encoding at offset {offset}: {reason}")]
    NonCanonical { offset: usize, reason: String },

    #[error("invalid structure at offset {offset}: {reason}")]
    InvalidStructure { offset: usize, reason: String },

    #[error("{count} trailing bytes after offset {offset}")]
    TrailingBytes { offset: usize, count: usize },

    #[error("encoding too long: {size} bytes (max {max})")]
    TooLong { size: usize, max: usize },

    #[error("integer overflow at offset {offset}")]
    Overflow { offset: usize },
}

impl DecodeError {
    /// Byte offset at which decoding failed, if known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::UnknownTag { offset, .. }
            | Self::UnexpectedEnd { offset, .. }
            | Self::NonCanonical { offset, .. }
            | Self::InvalidStructure { offset, .. }
            | Self::TrailingBytes { offset, .. }
            | Self::Overflow { offset } => Some(*offset),
            Self::TooLong { .. } => None,
        }
    }
}

/// Result alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
