use crate::components::{ContentionModel, PolicyConfig, PolicyKind, ServiceTime};
use crate::error::{ConfigError, SimError};
use crate::resource::OverflowPolicy;
use crate::topology::tests::{balancer, fixed, link, queue, scripted, server, single_server};
use crate::topology::{Horizon, Topology};

fn build_error(config: &crate::topology::SimulationConfig) -> ConfigError {
    match Topology::build(config) {
        Ok(_) => panic!("configuration should have been rejected"),
        Err(err) => err,
    }
}

#[test]
fn test_unknown_component() {
    let config = scripted(vec![server("s", 1, fixed(1.0), Some("ghost"))], "s", &[0.0]);
    let err = build_error(&config);
    assert_eq!(
        err,
        ConfigError::UnknownComponent {
            field: "topology.components[0].next".to_string(),
            name: "ghost".to_string(),
        }
    );

    let config = scripted(vec![server("s", 1, fixed(1.0), None)], "nowhere", &[0.0]);
    assert_eq!(build_error(&config).field(), "workload.entry");
}

#[test]
fn test_duplicate_component() {
    let config = scripted(
        vec![server("s", 1, fixed(1.0), None), server("s", 2, fixed(1.0), None)],
        "s",
        &[0.0],
    );
    assert_eq!(
        build_error(&config),
        ConfigError::DuplicateComponent {
            field: "topology.components[1].name".to_string(),
            name: "s".to_string(),
        }
    );
}

#[test]
fn test_empty_topology() {
    let config = scripted(Vec::new(), "s", &[0.0]);
    assert_eq!(build_error(&config).field(), "topology.components");
}

#[test]
fn test_policy_parameters() {
    let missing_d = scripted(
        vec![
            balancer("lb", PolicyConfig::new(PolicyKind::PowerOfD), &["s"]),
            server("s", 1, fixed(1.0), None),
        ],
        "lb",
        &[0.0],
    );
    assert_eq!(
        build_error(&missing_d),
        ConfigError::MissingParameter {
            field: "topology.components[0].policy".to_string(),
            parameter: "d",
        }
    );

    let too_large = scripted(
        vec![
            balancer("lb", PolicyConfig::power_of_d(3), &["s"]),
            server("s", 1, fixed(1.0), None),
        ],
        "lb",
        &[0.0],
    );
    assert_eq!(build_error(&too_large).field(), "topology.components[0].policy.d");

    let zero_bound = scripted(
        vec![
            balancer("lb", PolicyConfig::bounded(0), &["s"]),
            server("s", 1, fixed(1.0), None),
        ],
        "lb",
        &[0.0],
    );
    assert_eq!(
        build_error(&zero_bound),
        ConfigError::NonPositiveCapacity {
            field: "topology.components[0].policy.bound".to_string(),
        }
    );

    let no_targets = scripted(
        vec![balancer("lb", PolicyConfig::new(PolicyKind::RoundRobin), &[])],
        "lb",
        &[0.0],
    );
    assert_eq!(build_error(&no_targets).field(), "topology.components[0].targets");
}

#[test]
fn test_non_positive_capacities() {
    let zero_threads = scripted(vec![server("s", 0, fixed(1.0), None)], "s", &[0.0]);
    assert_eq!(
        build_error(&zero_threads),
        ConfigError::NonPositiveCapacity {
            field: "topology.components[0].threads".to_string(),
        }
    );

    let zero_queue = scripted(
        vec![
            queue("q", Some(0), OverflowPolicy::Drop, "s"),
            server("s", 1, fixed(1.0), None),
        ],
        "q",
        &[0.0],
    );
    assert_eq!(build_error(&zero_queue).field(), "topology.components[0].capacity");

    let zero_bandwidth = scripted(
        vec![link("wire", 1.0, 1.0, Some(0), ContentionModel::None)],
        "wire",
        &[0.0],
    );
    assert_eq!(build_error(&zero_bandwidth).field(), "topology.components[0].bandwidth");
}

#[test]
fn test_invalid_parameters() {
    let negative_service = scripted(
        vec![server("s", 1, ServiceTime::Exponential { mean: -1.0 }, None)],
        "s",
        &[0.0],
    );
    assert_eq!(build_error(&negative_service).field(), "topology.components[0].service");

    let negative_latency = scripted(
        vec![link("wire", -1.0, 1.0, None, ContentionModel::None)],
        "wire",
        &[0.0],
    );
    assert_eq!(build_error(&negative_latency).field(), "topology.components[0].latency");

    let mut bad_rate = single_server(1.0);
    bad_rate.workload.rate = f64::NAN;
    assert_eq!(build_error(&bad_rate).field(), "workload.rate");

    // Gaps at a vanishing rate overflow the clock.
    let mut tiny_rate = single_server(1.0);
    tiny_rate.workload.rate = 1e-320;
    assert_eq!(build_error(&tiny_rate).field(), "workload.rate");

    let mut idle = single_server(1.0);
    idle.workload.rate = 0.0;
    assert!(Topology::build(&idle).is_ok());

    let mut bad_horizon = single_server(1.0);
    bad_horizon.horizon = Horizon::Requests { count: 0 };
    assert_eq!(build_error(&bad_horizon).field(), "horizon.count");

    let mut bad_weights = single_server(1.0);
    bad_weights.workload.priority_weights = vec![0.0, 0.0];
    assert_eq!(build_error(&bad_weights).field(), "workload.priority_weights");

    let mut bad_threshold = single_server(1.0);
    bad_threshold.instability_threshold = Some(0.0);
    assert_eq!(build_error(&bad_threshold).field(), "instability_threshold");
}

#[test]
fn test_routing_cycle() {
    let config = scripted(
        vec![
            balancer("lb", PolicyConfig::new(PolicyKind::RoundRobin), &["a"]),
            server("a", 1, fixed(1.0), Some("lb")),
        ],
        "lb",
        &[0.0],
    );
    let err = build_error(&config);
    assert!(matches!(err, ConfigError::Invalid { .. }), "{err:?}");
    assert_eq!(err.field(), "topology.components[1]");
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn test_queue_wiring() {
    let feeds_link = scripted(
        vec![
            queue("q", None, OverflowPolicy::Block, "wire"),
            link("wire", 1.0, 1.0, None, ContentionModel::None),
        ],
        "q",
        &[0.0],
    );
    assert_eq!(build_error(&feeds_link).field(), "topology.components[0].feeds");

    let fed_twice = scripted(
        vec![
            queue("q0", None, OverflowPolicy::Block, "s"),
            queue("q1", None, OverflowPolicy::Block, "s"),
            server("s", 1, fixed(1.0), None),
        ],
        "q0",
        &[0.0],
    );
    assert_eq!(build_error(&fed_twice).field(), "topology.components[1].feeds");

    // Work for a queue-fed server has to go through its queue.
    let bypass = scripted(
        vec![
            queue("q", None, OverflowPolicy::Block, "s"),
            server("s", 1, fixed(1.0), None),
            server("front", 1, fixed(1.0), Some("s")),
        ],
        "front",
        &[0.0],
    );
    assert_eq!(build_error(&bypass).field(), "topology.components[2].next");

    let entry_bypass = scripted(
        vec![
            queue("q", None, OverflowPolicy::Block, "s"),
            server("s", 1, fixed(1.0), None),
        ],
        "s",
        &[0.0],
    );
    assert_eq!(build_error(&entry_bypass).field(), "workload.entry");
}

#[test]
fn test_config_error_converts_to_sim_error() {
    let config = scripted(vec![server("s", 0, fixed(1.0), None)], "s", &[0.0]);
    let err: SimError = build_error(&config).into();
    assert!(matches!(err, SimError::Configuration(_)));
    assert_eq!(
        err.to_string(),
        "invalid configuration: topology.components[0].threads: capacity must be positive"
    );
}
