use crate::components::{ContentionModel, Node, RequestState};
use crate::resource::OverflowPolicy;
use crate::topology::tests::{fixed, link, queue, scripted, server};
use crate::topology::Topology;

fn latencies(topology: &Topology) -> Vec<f64> {
    topology
        .requests()
        .iter()
        .filter_map(|r| r.latency())
        .collect()
}

/// Test that a single-slot server never serves two requests at once
#[test]
fn test_single_slot_capacity_invariant() {
    let config = scripted(
        vec![server("s", 1, fixed(1.0), None)],
        "s",
        &[0.0; 10],
    );
    let mut topology = Topology::build(&config).expect("valid topology");
    let stats = topology.run(config.horizon).expect("run succeeds");

    assert_eq!(stats.completed, 10);
    match topology.component("s") {
        Some(Node::Server(s)) => {
            assert_eq!(s.slots.peak(), 1);
            assert_eq!(s.slots.acquisitions(), 10);
        }
        other => panic!("unexpected component: {other:?}"),
    }

    let mut intervals: Vec<(f64, f64)> = topology
        .requests()
        .iter()
        .map(|r| (r.service_start.unwrap_or_default(), r.service_end.unwrap_or_default()))
        .collect();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
    for pair in intervals.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "overlapping service: {pair:?}");
    }
    // FIFO: the i-th arrival finishes at i + 1.
    let expected: Vec<f64> = (1..=10).map(f64::from).collect();
    assert_eq!(latencies(&topology), expected);
    // The clock parks at the horizon once the work runs out.
    assert_eq!(stats.elapsed, 1_000.0);
    assert!((stats.components["s"].utilization - 0.01).abs() < 1e-12);
}

/// Test that a full drop-on-full queue records one completion and one drop
#[test]
fn test_drop_accounting() {
    let config = scripted(
        vec![
            queue("q", Some(1), OverflowPolicy::Drop, "s"),
            server("s", 1, fixed(1.0), None),
        ],
        "q",
        &[0.0, 0.0],
    );
    let mut topology = Topology::build(&config).expect("valid topology");
    let stats = topology.run(config.horizon).expect("run succeeds");

    assert_eq!(stats.generated, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.components["q"].dropped, 1);

    let states: Vec<_> = topology.requests().iter().map(|r| r.state).collect();
    assert_eq!(states, vec![RequestState::Completed, RequestState::Dropped]);
    let dropped = &topology.requests()[1];
    assert_eq!(dropped.completion_time, None);
    assert_eq!(stats.latency.count, 1);
}

/// Test that a blocking queue suspends producers instead of dropping
#[test]
fn test_blocking_queue_backpressure() {
    let config = scripted(
        vec![
            queue("q", Some(1), OverflowPolicy::Block, "s"),
            server("s", 1, fixed(1.0), None),
        ],
        "q",
        &[0.0, 0.0, 0.0],
    );
    let mut topology = Topology::build(&config).expect("valid topology");
    let stats = topology.run(config.horizon).expect("run succeeds");

    assert_eq!(stats.completed, 3);
    assert_eq!(stats.dropped, 0);
    assert_eq!(latencies(&topology), vec![1.0, 2.0, 3.0]);
    match topology.component("q") {
        Some(Node::Queue(q)) => assert_eq!(q.buffer.peak(), 1),
        other => panic!("unexpected component: {other:?}"),
    }
}

/// Test that worker threads pull from their queue in FIFO order
#[test]
fn test_multi_threaded_workers() {
    let config = scripted(
        vec![
            queue("q", None, OverflowPolicy::Block, "s"),
            server("s", 2, fixed(1.0), None),
        ],
        "q",
        &[0.0; 5],
    );
    let mut topology = Topology::build(&config).expect("valid topology");
    let stats = topology.run(config.horizon).expect("run succeeds");

    assert_eq!(stats.completed, 5);
    assert_eq!(latencies(&topology), vec![1.0, 1.0, 2.0, 2.0, 3.0]);
    match topology.component("s") {
        Some(Node::Server(s)) => assert_eq!(s.slots.peak(), 2),
        other => panic!("unexpected component: {other:?}"),
    }
    for request in topology.requests() {
        let path: Vec<_> = request
            .path
            .iter()
            .filter_map(|&id| topology.component_name(id))
            .collect();
        assert_eq!(path, vec!["q", "s"]);
    }
    // Queued requests waited for a worker.
    assert!((stats.mean_queueing_time - 0.8).abs() < 1e-12);
    assert!((stats.mean_service_time - 1.0).abs() < 1e-12);
}

/// Test that link delay grows with concurrent transmissions
#[test]
fn test_link_contention() {
    let shared = scripted(
        vec![link("wire", 1.0, 2.0, None, ContentionModel::Shared)],
        "wire",
        &[0.0, 0.0],
    );
    let mut topology = Topology::build(&shared).expect("valid topology");
    topology.run(shared.horizon).expect("run succeeds");
    assert_eq!(latencies(&topology), vec![3.0, 5.0]);

    let narrow = scripted(
        vec![link("wire", 1.0, 2.0, Some(1), ContentionModel::Shared)],
        "wire",
        &[0.0, 0.0],
    );
    let mut topology = Topology::build(&narrow).expect("valid topology");
    topology.run(narrow.horizon).expect("run succeeds");
    assert_eq!(latencies(&topology), vec![3.0, 6.0]);
}
