//! Scenario builder API.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use lamport_core::{
    config::ClusterConfig,
    driver::{SimulationConfig, run_simulation},
    engine::Engine,
    event::MemoryEventSink,
    node::Node,
    transport::{FramedTransport, TransportConfig, serve},
};
use lamport_proto::NodeId;
use tracing::info;

use crate::{
    scenario::{OracleFn, World},
    sim_env::SimEnv,
    sim_transport::{SimListener, SimTransport},
    tap::{MessageLog, TappedTransport},
};

const PORT: u16 = 7000;

type SimNode = Node<TappedTransport<FramedTransport<SimTransport>>, SimEnv>;
type NodeRegistry = Arc<Mutex<BTreeMap<NodeId, Arc<SimNode>>>>;

fn host_name(id: NodeId) -> String {
    format!("node-{id}")
}

/// What one node does during a scenario.
#[derive(Debug, Clone)]
pub struct NodePlan {
    /// Node id
    pub id: NodeId,
    /// Extra delay after the common startup delay
    pub start_after: Duration,
    /// Request driver parameters; zero requests makes the node passive
    pub simulation: SimulationConfig,
}

/// Scenario builder.
///
/// Must call `.oracle()` to get a [`RunnableScenario`].
pub struct Scenario {
    name: String,
    plans: Vec<NodePlan>,
    seed: u64,
    min_latency: Duration,
    max_latency: Duration,
    startup_delay: Duration,
    duration: Duration,
    send_timeout: Duration,
}

impl Scenario {
    /// Empty scenario with default network settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plans: Vec::new(),
            seed: 0,
            min_latency: Duration::from_millis(1),
            max_latency: Duration::from_millis(10),
            startup_delay: Duration::from_secs(1),
            duration: Duration::from_secs(300),
            send_timeout: TransportConfig::default().send_timeout,
        }
    }

    /// Add a node that never requests the critical section.
    pub fn node(self, id: u64) -> Self {
        self.requester_after(id, Duration::ZERO, SimulationConfig { requests: 0, ..SimulationConfig::default() })
    }

    /// Add a node running the request driver with `simulation`.
    pub fn requester(self, id: u64, simulation: SimulationConfig) -> Self {
        self.requester_after(id, Duration::ZERO, simulation)
    }

    /// Add a node whose driver starts `start_after` later than the rest.
    pub fn requester_after(mut self, id: u64, start_after: Duration, simulation: SimulationConfig) -> Self {
        self.plans.push(NodePlan { id: NodeId::new(id), start_after, simulation });
        self
    }

    /// RNG seed for the network and every node.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// One-way message latency bounds.
    pub fn latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }

    /// Delay between node start and the first driver step, so every
    /// listener is bound before anyone sends.
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Virtual time limit; a run that has not finished by then fails.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Per-message send timeout of the framed transport.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory; a scenario without verification cannot run.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Every node binds its listener, sleeps the startup delay plus its own
    /// offset, runs its request driver, then keeps serving peers. The run
    /// ends once every driver has finished; the oracle then checks the
    /// final world.
    pub fn run(self) -> Result<(), String> {
        let scenario = self.scenario;
        let name = scenario.name.clone();

        if scenario.plans.is_empty() {
            return Err(format!("Scenario '{name}': no nodes"));
        }

        let cluster = ClusterConfig::new(
            scenario.plans.iter().map(|plan| (plan.id, format!("{}:{PORT}", host_name(plan.id)))),
        );
        let events = MemoryEventSink::new();
        let log = MessageLog::new();
        let nodes: NodeRegistry = Arc::default();
        let finished = Arc::new(AtomicUsize::new(0));

        let mut sim = turmoil::Builder::new()
            .simulation_duration(scenario.duration)
            .min_message_latency(scenario.min_latency)
            .max_message_latency(scenario.max_latency)
            .rng_seed(scenario.seed)
            .build();

        for plan in &scenario.plans {
            let (_, directory) = cluster
                .directory_for(plan.id)
                .map_err(|error| format!("Scenario '{name}': {error}"))?;
            let peers: Vec<NodeId> = directory.ids().collect();
            let transport_config = TransportConfig { send_timeout: scenario.send_timeout };
            let wait = scenario.startup_delay + plan.start_after;
            let seed = scenario.seed ^ plan.id.get();

            let plan = plan.clone();
            let events = events.clone();
            let log = log.clone();
            let nodes = Arc::clone(&nodes);
            let finished = Arc::clone(&finished);

            sim.host(host_name(plan.id), move || {
                let plan = plan.clone();
                let directory = directory.clone();
                let peers = peers.clone();
                let transport_config = transport_config.clone();
                let events = events.clone();
                let log = log.clone();
                let nodes = Arc::clone(&nodes);
                let finished = Arc::clone(&finished);

                async move {
                    let listener = SimListener::bind(&format!("0.0.0.0:{PORT}")).await?;
                    let engine = Engine::new(plan.id, peers)?;
                    let transport = TappedTransport::new(
                        plan.id,
                        FramedTransport::new(SimTransport, directory, transport_config),
                        log,
                    );
                    let node = Arc::new(Node::new(engine, transport, SimEnv::with_seed(seed), Arc::new(events)));

                    match nodes.lock() {
                        Ok(mut nodes) => nodes.insert(plan.id, Arc::clone(&node)),
                        Err(poisoned) => poisoned.into_inner().insert(plan.id, Arc::clone(&node)),
                    };

                    let server = tokio::spawn(serve(listener, Arc::clone(&node)));

                    tokio::time::sleep(wait).await;
                    run_simulation(&node, &plan.simulation).await?;
                    finished.fetch_add(1, Ordering::SeqCst);

                    server.await??;
                    Ok(())
                }
            });
        }

        let expected = scenario.plans.len();
        let observed = Arc::clone(&finished);
        sim.client("observer", async move {
            while observed.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });

        sim.run().map_err(|error| format!("Scenario '{name}': simulation failed: {error}"))?;

        let snapshots = {
            let nodes = match nodes.lock() {
                Ok(nodes) => nodes,
                Err(poisoned) => poisoned.into_inner(),
            };
            nodes
                .iter()
                .map(|(&id, node)| node.snapshot().map(|snapshot| (id, snapshot)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map_err(|error| format!("Scenario '{name}': {error}"))?
        };

        let world = World::new(events.records(), snapshots, log);
        info!(scenario = %name, sections = world.intervals().len(), "scenario finished");

        (self.oracle)(&world).map_err(|error| format!("Scenario '{name}': {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::oracle;

    #[test]
    fn scenario_requires_nodes() {
        let result = Scenario::new("empty").oracle(Box::new(|_world| Ok(()))).run();
        assert!(result.is_err());
    }

    #[test]
    fn passive_cluster_runs_no_sections() {
        Scenario::new("passive")
            .node(1)
            .node(2)
            .oracle(oracle::all_of(vec![oracle::completed(0), oracle::all_idle()]))
            .run()
            .unwrap();
    }
}
