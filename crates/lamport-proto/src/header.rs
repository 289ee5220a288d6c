//! Fixed-size frame header.
//!
//! ```text
//! 0       4   5   6       8               16              24
//! ┌───────┬───┬───┬───────┬───────────────┬───────────────┐
//! │ magic │ver│flg│opcode │   timestamp   │    sender     │
//! └───────┴───┴───┴───────┴───────────────┴───────────────┘
//! ```
//!
//! All multi-byte fields are big-endian.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::network_endian::{U16, U32, U64},
};

use crate::{NodeId, Opcode, ProtocolError, Result, Timestamp};

/// Frame header, parsed in place from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    magic: U32,
    version: u8,
    flags: u8,
    opcode: U16,
    timestamp: U64,
    sender: U64,
}

impl FrameHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 24;

    /// "LMTX"
    pub const MAGIC: u32 = 0x4C4D_5458;

    /// Current header version.
    pub const VERSION: u8 = 1;

    /// Build a header for an outgoing frame.
    pub fn new(opcode: Opcode, timestamp: Timestamp, sender: NodeId) -> Self {
        Self {
            magic: U32::new(Self::MAGIC),
            version: Self::VERSION,
            flags: 0,
            opcode: U16::new(opcode.to_u16()),
            timestamp: U64::new(timestamp.get()),
            sender: U64::new(sender.get()),
        }
    }

    /// Parse and validate a header from the first [`Self::SIZE`] bytes.
    ///
    /// Trailing bytes are ignored. Flags are reserved and not checked.
    /// A timestamp of [`Timestamp::MAX`] is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (header, _rest) = Self::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let magic = header.magic.get();
        if magic != Self::MAGIC {
            return Err(ProtocolError::BadMagic { expected: Self::MAGIC, found: magic });
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        header.opcode()?;
        if header.timestamp() == Timestamp::MAX {
            return Err(ProtocolError::TimestampOverflow(Timestamp::MAX.get()));
        }

        Ok(header)
    }

    /// Header bytes in wire order.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Decoded opcode.
    pub fn opcode(&self) -> Result<Opcode> {
        let raw = self.opcode.get();
        Opcode::from_u16(raw).ok_or(ProtocolError::UnknownOpcode(raw))
    }

    /// Sender's Lamport timestamp.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::new(self.timestamp.get())
    }

    /// Sender's node id.
    pub fn sender(&self) -> NodeId {
        NodeId::new(self.sender.get())
    }

    /// Reserved flag bits.
    pub fn flags(&self) -> u8 {
        self.flags
    }
}
