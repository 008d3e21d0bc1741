#![allow(dead_code)]

use queuesim::SimulationConfig;

/// A queue in front of a two-thread server, with a link on the way out.
pub const PIPELINE: &str = r#"
seed = 7

[horizon]
kind = "duration"
time = 200.0

[workload]
entry = "lb"
rate = 1.0
warmup_requests = 10

[workload.arrivals]
kind = "poisson"

[[topology.components]]
kind = "load_balancer"
name = "lb"
targets = ["q0", "q1"]
policy = { kind = "shortest_queue" }

[[topology.components]]
kind = "queue"
name = "q0"
capacity = 20
overflow = "drop"
feeds = "s0"

[[topology.components]]
kind = "queue"
name = "q1"
capacity = 20
overflow = "drop"
feeds = "s1"

[[topology.components]]
kind = "server"
name = "s0"
threads = 2
service = { kind = "exponential", mean = 1.5 }
next = "uplink"

[[topology.components]]
kind = "server"
name = "s1"
threads = 2
service = { kind = "uniform", low = 0.5, high = 2.5 }
next = "uplink"

[[topology.components]]
kind = "link"
name = "uplink"
latency = 0.1
transmission_time = 0.05
contention = { kind = "linear", per_flow = 0.5 }
"#;

pub fn pipeline() -> SimulationConfig {
    toml::from_str(PIPELINE).expect("Failed to parse pipeline config")
}

/// One exponential server fed directly by Poisson arrivals.
pub fn single_server() -> SimulationConfig {
    toml::from_str(
        r#"
        seed = 1
        horizon = { kind = "duration", time = 100.0 }

        [workload]
        entry = "server"
        rate = 0.5

        [[topology.components]]
        kind = "server"
        name = "server"
        threads = 1
        service = { kind = "exponential", mean = 1.0 }
        "#,
    )
    .expect("Failed to parse single server config")
}
