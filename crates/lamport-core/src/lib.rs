//! Lamport distributed mutual exclusion.
//!
//! A fixed set of peers negotiates exclusive turns at a shared critical
//! section using point-to-point REQUEST, REPLY and RELEASE messages stamped
//! with Lamport clocks. There is no coordinator.
//!
//! # Architecture
//!
//! The protocol itself lives in [`engine::Engine`], a deterministic state
//! machine isolated from I/O, time and scheduling. Handlers return
//! declarative [`engine::NodeAction`]s describing the messages to send; they
//! never send anything themselves.
//!
//! [`node::Node`] wraps one engine behind a single lock and drives it from
//! concurrent inbound handlers and the local acquisition cycle. It executes
//! actions outside the lock and wakes the acquiring task whenever a REPLY or
//! RELEASE may have satisfied the entry predicate.
//!
//! The same engine runs under the production TCP transport, the in-process
//! loopback network and turmoil simulations.
//!
//! # Components
//!
//! - [`clock`]: Lamport clock
//! - [`ledger`]: Ordered pending-request ledger
//! - [`replies`]: Reply tracker and deferred-reply set
//! - [`engine`]: Per-node protocol state machine
//! - [`node`]: Lock-guarded engine driven by async tasks
//! - [`transport`]: Message and connection transport abstractions
//! - [`event`]: Critical-section event sink and exclusion checker
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`driver`]: Randomized request driver
//! - [`config`]: Cluster configuration
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod env;
pub mod error;
pub mod event;
pub mod ledger;
pub mod node;
pub mod replies;
pub mod transport;

pub use lamport_proto::{Message, MessageKind, NodeId, Timestamp};
