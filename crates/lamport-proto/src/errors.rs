//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or interpreting frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer shorter than a frame header.
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Magic number mismatch (not a Lamport frame).
    #[error("invalid magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Magic value this implementation speaks
        expected: u32,
        /// Magic value found in the header
        found: u32,
    },

    /// Header version this implementation does not understand.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Opcode outside the known set.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    /// Timestamp at the top of the counter range; no clock can advance past it.
    #[error("timestamp {0} leaves no room for a later clock value")]
    TimestampOverflow(u64),

    /// An ACK frame was found where a protocol message was expected.
    #[error("frame with opcode {0:?} does not carry a protocol message")]
    NotAMessage(crate::Opcode),
}
