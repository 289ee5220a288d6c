//! Concurrency tests on real nodes wired together in-process.
//!
//! These run on a multi-threaded runtime in real time, so inbound handlers
//! and acquisition cycles genuinely race for each node's engine lock.

use std::{sync::Arc, time::Duration};

use lamport_core::{
    engine::NodeState,
    event::{MemoryEventSink, check_mutual_exclusion},
};
use lamport_harness::{LoopbackNetwork, SimEnv};

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contending_nodes_never_overlap() {
    let network = LoopbackNetwork::with_jitter(SimEnv::with_seed(42), Duration::from_millis(2));
    let sink = MemoryEventSink::new();
    let nodes = network.cluster(4, Arc::new(sink.clone())).unwrap();

    let tasks: Vec<_> = nodes
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            tokio::spawn(async move {
                for _ in 0..5 {
                    node.run_critical_section(|| tokio::time::sleep(Duration::from_millis(1)))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        tokio::time::timeout(Duration::from_secs(30), task).await.unwrap().unwrap();
    }

    let records = sink.records();
    check_mutual_exclusion(&records).unwrap();
    assert_eq!(sink.completed(), 20);

    for node in &nodes {
        let snapshot = node.snapshot().unwrap();
        assert_eq!(snapshot.state, NodeState::Idle);
        assert!(snapshot.ledger.is_empty(), "node {} ledger {:?}", snapshot.id, snapshot.ledger);
        assert!(snapshot.deferred.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn later_request_is_deferred_until_release() {
    let network = LoopbackNetwork::new(SimEnv::new());
    let sink = MemoryEventSink::new();
    let nodes = network.cluster(3, Arc::new(sink.clone())).unwrap();
    let (a, b, c) = (Arc::clone(&nodes[0]), Arc::clone(&nodes[1]), Arc::clone(&nodes[2]));

    // Hold C's reply so A stays in Requesting.
    network.pause(c.id(), a.id());
    let a_task = tokio::spawn({
        let a = Arc::clone(&a);
        async move { a.acquire().await }
    });
    eventually("A's request at B and C", || {
        b.snapshot().unwrap().ledger.iter().any(|record| record.node == a.id())
            && c.snapshot().unwrap().ledger.iter().any(|record| record.node == a.id())
    })
    .await;

    let b_task = tokio::spawn({
        let b = Arc::clone(&b);
        async move { b.acquire().await }
    });
    eventually("A to defer B", || a.snapshot().unwrap().deferred == vec![b.id()]).await;
    eventually("C to grant B", || b.snapshot().unwrap().replies.contains(&c.id())).await;

    let a_view = a.snapshot().unwrap();
    assert_eq!(a_view.state, NodeState::Requesting);
    let b_view = b.snapshot().unwrap();
    assert_eq!(b_view.state, NodeState::Requesting);
    assert!(!b_view.replies.contains(&a.id()));
    assert!(a_view.own_request.unwrap().precedes(&b_view.own_request.unwrap()));

    network.resume(c.id(), a.id());
    a_task.await.unwrap().unwrap();
    assert_eq!(a.state().unwrap(), NodeState::InCriticalSection);
    assert_eq!(b.state().unwrap(), NodeState::Requesting);

    a.release().await.unwrap();
    b_task.await.unwrap().unwrap();

    let b_view = b.snapshot().unwrap();
    assert_eq!(b_view.state, NodeState::InCriticalSection);
    assert!(b_view.replies.contains(&a.id()));
    assert!(a.snapshot().unwrap().deferred.is_empty());

    b.release().await.unwrap();
    check_mutual_exclusion(&sink.records()).unwrap();
    assert_eq!(sink.completed(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_peer_blocks_entry() {
    let network = LoopbackNetwork::new(SimEnv::new());
    let sink = MemoryEventSink::new();
    let nodes = network.cluster(3, Arc::new(sink.clone())).unwrap();
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    network.cut(c.id(), a.id());

    let outcome = tokio::time::timeout(Duration::from_millis(200), a.acquire()).await;
    assert!(outcome.is_err(), "entry must not happen without every reply");

    let view = a.snapshot().unwrap();
    assert_eq!(view.state, NodeState::Requesting);
    assert!(view.replies.contains(&b.id()));
    assert!(!view.replies.contains(&c.id()));
    assert_eq!(sink.records().len(), 0);
}

#[tokio::test]
async fn peer_in_section_grants_but_blocks_entry() {
    let network = LoopbackNetwork::new(SimEnv::new());
    let sink = MemoryEventSink::new();
    let nodes = network.cluster(2, Arc::new(sink.clone())).unwrap();
    let (a, b) = (Arc::clone(&nodes[0]), Arc::clone(&nodes[1]));

    a.acquire().await.unwrap();

    let b_task = tokio::spawn({
        let b = Arc::clone(&b);
        async move { b.acquire().await }
    });
    eventually("A's reply to B", || b.snapshot().unwrap().replies.contains(&a.id())).await;

    // Granted, but A's request still heads B's ledger.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(b.state().unwrap(), NodeState::Requesting);

    a.release().await.unwrap();
    b_task.await.unwrap().unwrap();
    b.release().await.unwrap();

    check_mutual_exclusion(&sink.records()).unwrap();
    assert_eq!(sink.completed(), 2);
}
