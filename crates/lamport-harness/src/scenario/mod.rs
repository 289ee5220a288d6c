//! Oracle-checked cluster scenarios on turmoil.
//!
//! A [`Scenario`] declares the nodes of a cluster and what each one does;
//! it cannot run until an oracle is attached. [`RunnableScenario::run`]
//! starts every node as a turmoil host speaking the framed protocol over
//! simulated TCP, waits until all drivers finish, then hands the resulting
//! [`World`] to the oracle.

mod builder;
pub mod oracle;
mod world;

pub use builder::{NodePlan, RunnableScenario, Scenario};
pub use world::World;

/// Verification run against the final world.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
