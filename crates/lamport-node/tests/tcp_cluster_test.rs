//! Real TCP clusters on localhost.

use std::time::Duration;

use lamport_core::{
    config::ClusterConfig,
    driver::{SimulationConfig, run_simulation},
    engine::NodeState,
    event::{check_mutual_exclusion, intervals},
    transport::TransportConfig,
};
use lamport_node::{NodeOptions, RunningNode, TcpAcceptor, ledger_file::read_ledger, runner};
use lamport_proto::NodeId;

fn quick(requests: usize) -> SimulationConfig {
    SimulationConfig {
        requests,
        min_delay: Duration::ZERO,
        max_delay: Duration::from_millis(20),
        hold: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_nodes_share_one_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("shared_ledger.txt");

    let mut acceptors = Vec::new();
    let mut addresses = Vec::new();
    for raw in 1..=3u64 {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        addresses.push((NodeId::new(raw), acceptor.local_addr().unwrap().to_string()));
        acceptors.push(acceptor);
    }
    let cluster = ClusterConfig::new(addresses);

    let running: Vec<RunningNode> = acceptors
        .into_iter()
        .zip(1..=3u64)
        .map(|(acceptor, raw)| {
            let options = NodeOptions {
                id: NodeId::new(raw),
                cluster: cluster.clone(),
                simulation: quick(3),
                transport: TransportConfig::default(),
                startup_delay: Duration::ZERO,
                ledger: ledger.clone(),
            };
            RunningNode::start_with(&options, acceptor).unwrap()
        })
        .collect();

    let drivers: Vec<_> = running
        .iter()
        .map(|running| {
            let node = std::sync::Arc::clone(running.node());
            tokio::spawn(async move { run_simulation(&node, &quick(3)).await })
        })
        .collect();

    for driver in drivers {
        tokio::time::timeout(Duration::from_secs(30), driver).await.unwrap().unwrap().unwrap();
    }

    for running in &running {
        let snapshot = running.node().snapshot().unwrap();
        assert_eq!(snapshot.state, NodeState::Idle);
        assert!(snapshot.ledger.is_empty());
    }

    let records = read_ledger(&ledger).unwrap();
    check_mutual_exclusion(&records).unwrap();
    assert_eq!(intervals(&records).len(), 9);
}

#[tokio::test]
async fn lone_node_runs_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("ledger.txt");
    let options = NodeOptions {
        id: NodeId::new(1),
        cluster: ClusterConfig::from_json(r#"{"1": "http://127.0.0.1:0/"}"#).unwrap(),
        simulation: quick(2),
        transport: TransportConfig::default(),
        startup_delay: Duration::from_millis(10),
        ledger: ledger.clone(),
    };

    runner::run(options, async {}).await.unwrap();

    let contents = std::fs::read_to_string(&ledger).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("Node 1 ENTERED CS at "));
    assert!(lines[1].starts_with("Node 1 EXITING CS at "));
}

#[tokio::test]
async fn unknown_node_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let options = NodeOptions {
        id: NodeId::new(7),
        cluster: ClusterConfig::from_json(r#"{"1": "127.0.0.1:0"}"#).unwrap(),
        simulation: quick(1),
        transport: TransportConfig::default(),
        startup_delay: Duration::ZERO,
        ledger: dir.path().join("ledger.txt"),
    };

    let error = runner::run(options, async {}).await.unwrap_err();
    assert!(matches!(error, lamport_node::ServerError::Config(_)), "{error}");
}
