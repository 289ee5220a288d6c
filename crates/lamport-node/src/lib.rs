//! Lamport mutual-exclusion peer process.
//!
//! Production wiring for [`lamport_core`]: TCP transport, system time and
//! randomness, a shared ledger file that records every critical section,
//! and a per-node diagnostic log. The `lamport-node` binary is a thin CLI over [`runner`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod ledger_file;
pub mod logging;
pub mod runner;
pub mod tcp;

pub use env::SystemEnv;
pub use error::ServerError;
pub use ledger_file::FileEventSink;
pub use runner::{NodeOptions, RunningNode, TcpNode};
pub use tcp::{TcpAcceptor, TcpTransport};
