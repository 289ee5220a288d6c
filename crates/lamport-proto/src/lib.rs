//! Wire format for the Lamport mutual-exclusion protocol.
//!
//! Every protocol message is a single fixed 24-byte frame: magic, version,
//! flags, opcode, the sender's Lamport timestamp and the sender's node id.
//! There is no variable-length payload, so a frame can be parsed with one
//! bounded read and validated without allocation.
//!
//! Each connection carries exactly one exchange: the caller writes a
//! REQUEST, REPLY or RELEASE frame and the callee answers with an ACK once
//! the message has been fully processed.
//!
//! # Security
//!
//! All parsing uses compile-time verified layouts via `zerocopy`. Unknown
//! opcodes, foreign magic values and future versions are rejected before any
//! field is interpreted.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod ids;
pub mod message;
pub mod opcodes;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use ids::{NodeId, Timestamp};
pub use message::{Message, MessageKind};
pub use opcodes::Opcode;
