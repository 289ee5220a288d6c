//! Frame opcodes.

use crate::MessageKind;

/// Operation carried by a frame.
///
/// Values are stable wire constants. Protocol messages live in `0x01..=0x0F`,
/// transport-level control frames start at `0x10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Permission request for the critical section
    Request = 0x01,
    /// Permission grant
    Reply = 0x02,
    /// Critical section left, request withdrawn
    Release = 0x03,
    /// Message processed by the callee
    Ack = 0x10,
}

impl Opcode {
    /// Convert from the wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Reply),
            0x03 => Some(Self::Release),
            0x10 => Some(Self::Ack),
            _ => None,
        }
    }

    /// Wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Protocol message kind, or `None` for control frames.
    pub fn message_kind(self) -> Option<MessageKind> {
        match self {
            Self::Request => Some(MessageKind::Request),
            Self::Reply => Some(MessageKind::Reply),
            Self::Release => Some(MessageKind::Release),
            Self::Ack => None,
        }
    }
}

impl From<MessageKind> for Opcode {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Request => Self::Request,
            MessageKind::Reply => Self::Reply,
            MessageKind::Release => Self::Release,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for opcode in [Opcode::Request, Opcode::Reply, Opcode::Release, Opcode::Ack] {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
        assert_eq!(Opcode::from_u16(0x00), None);
        assert_eq!(Opcode::from_u16(0x04), None);
    }

    #[test]
    fn ack_is_not_a_message() {
        assert_eq!(Opcode::Ack.message_kind(), None);
        assert_eq!(Opcode::Reply.message_kind(), Some(MessageKind::Reply));
    }
}
