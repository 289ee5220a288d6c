//! Deterministic simulation harness for Lamport mutual-exclusion testing.
//!
//! Three ways to run a cluster, from most to least controlled:
//!
//! - [`EngineCluster`]: bare engines and an explicit pool of in-flight
//!   messages. Tests choose exactly which message is delivered next, which
//!   makes adversarial interleavings and model-based property tests easy.
//! - [`LoopbackNetwork`]: real [`lamport_core::node::Node`]s wired together
//!   in-process, with per-link pause, cut and jitter controls.
//! - [`Scenario`]: full nodes speaking the framed wire protocol over
//!   turmoil's simulated TCP, verified by a mandatory oracle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod loopback;
pub mod scenario;
pub mod sim_env;
pub mod sim_transport;
pub mod tap;

pub use cluster::{EngineCluster, InFlight};
pub use loopback::{LoopbackNetwork, LoopbackNode, LoopbackTransport};
pub use scenario::{NodePlan, OracleFn, RunnableScenario, Scenario, World};
pub use sim_env::SimEnv;
pub use sim_transport::{SimListener, SimTransport};
pub use tap::{MessageLog, SentMessage, TappedTransport};
