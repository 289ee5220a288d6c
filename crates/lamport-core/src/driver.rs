//! Randomized request driver.
//!
//! Decides when a node wants the critical section and what it does there:
//! wait a random delay, acquire, hold for a fixed time, release, repeat.

use std::time::Duration;

use tracing::info;

use crate::{env::Environment, error::NodeError, node::Node, transport::MessageTransport};

/// Driver parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Number of critical sections to run
    pub requests: usize,
    /// Lower bound of the delay before each request
    pub min_delay: Duration,
    /// Upper bound of the delay before each request
    pub max_delay: Duration,
    /// Time spent inside each critical section
    pub hold: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            requests: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(6),
            hold: Duration::from_secs(2),
        }
    }
}

/// Run `config.requests` request cycles on `node`.
pub async fn run_simulation<T, E>(node: &Node<T, E>, config: &SimulationConfig) -> Result<(), NodeError>
where
    T: MessageTransport,
    E: Environment,
{
    let env = node.env();

    for round in 1..=config.requests {
        let delay = env.random_duration(config.min_delay, config.max_delay);
        info!(
            node = %node.id(),
            clock = %node.clock()?,
            delay_ms = delay.as_millis() as u64,
            "sleeping before critical section request {round}/{}",
            config.requests
        );
        env.sleep(delay).await;

        node.run_critical_section(|| env.sleep(config.hold)).await?;
    }

    info!(node = %node.id(), clock = %node.clock()?, "simulation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::Arc,
        time::{Instant, SystemTime},
    };

    use async_trait::async_trait;
    use lamport_proto::{Message, NodeId};

    use super::*;
    use crate::{
        engine::{Engine, NodeState},
        error::TransportError,
        event::{EventKind, MemoryEventSink},
    };

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn wall_clock(&self) -> SystemTime {
            SystemTime::now()
        }

        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            tokio::time::sleep(duration)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    struct NoPeers;

    #[async_trait]
    impl MessageTransport for NoPeers {
        async fn send(&self, peer: NodeId, _message: Message) -> Result<(), TransportError> {
            Err(TransportError::UnknownPeer(peer))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_every_requested_cycle() {
        let sink = MemoryEventSink::new();
        let engine = Engine::new(NodeId::new(1), std::iter::empty()).unwrap();
        let node = Node::new(engine, NoPeers, TestEnv, Arc::new(sink.clone()));
        let config = SimulationConfig {
            requests: 4,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            hold: Duration::from_millis(5),
        };

        run_simulation(&node, &config).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 8);
        assert_eq!(records.iter().filter(|r| r.kind == EventKind::Entered).count(), 4);
        assert_eq!(node.state().unwrap(), NodeState::Idle);
    }
}
