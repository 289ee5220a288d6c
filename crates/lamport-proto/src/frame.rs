//! Frame encoding and decoding.

use bytes::BufMut;

use crate::{FrameHeader, Message, NodeId, Opcode, ProtocolError, Result, Timestamp};

/// A complete frame: header only, the protocol carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
}

impl Frame {
    /// Wrap a header.
    pub fn new(header: FrameHeader) -> Self {
        Self { header }
    }

    /// Frame carrying a protocol message.
    pub fn from_message(message: &Message) -> Self {
        Self::new(FrameHeader::new(message.kind.into(), message.timestamp, message.sender))
    }

    /// Acknowledgement sent by the callee once a message has been handled.
    pub fn ack(timestamp: Timestamp, sender: NodeId) -> Self {
        Self::new(FrameHeader::new(Opcode::Ack, timestamp, sender))
    }

    /// Encoded size in bytes.
    pub const fn encoded_len(&self) -> usize {
        FrameHeader::SIZE
    }

    /// Append the wire encoding to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
    }

    /// Wire encoding as an owned array.
    pub fn to_bytes(&self) -> [u8; FrameHeader::SIZE] {
        self.header.to_bytes()
    }

    /// Decode one frame from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        FrameHeader::parse(bytes).map(Self::new)
    }

    /// Frame opcode.
    ///
    /// # Errors
    ///
    /// `UnknownOpcode` if the header was built without [`FrameHeader::parse`].
    pub fn opcode(&self) -> Result<Opcode> {
        self.header.opcode()
    }

    /// Interpret the frame as a protocol message.
    pub fn into_message(self) -> Result<Message> {
        let opcode = self.header.opcode()?;
        let kind = opcode.message_kind().ok_or(ProtocolError::NotAMessage(opcode))?;
        Ok(Message { kind, timestamp: self.header.timestamp(), sender: self.header.sender() })
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Self::from_message(&message)
    }
}
