use std::path::PathBuf;
use traffic_lab_abstract::{Protocol, TrafficType};
use traffic_lab_simulator::{AggregateOutcome, scenario_runner};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

#[test]
fn bundled_scenarios_pass_their_assertions() {
    for name in ["cbr.toml", "burst.toml", "cbr_burst.toml", "mixed_topology.toml"] {
        let report = scenario_runner::run_scenario(scenario_path(name))
            .unwrap_or_else(|e| panic!("{name}: {e:#}"));
        assert!(report.stats.rejected.is_empty(), "{name}");
    }
}

#[test]
fn mixed_topology_counts_match_source_limits() {
    let scenario = scenario_runner::load_scenario(&scenario_path("mixed_topology.toml")).unwrap();
    assert!(scenario.mobility);
    assert_eq!(scenario.traffic, TrafficType::None);

    let report = scenario_runner::run(&scenario).unwrap();
    let flows = &report.stats.flows;
    assert_eq!(flows.len(), 3);

    // capped by the 5000-packet byte budget
    assert_eq!(flows[0].tx_packets, 5000);
    // one every 10 ms between 2 s and 10 s
    assert_eq!(flows[1].tx_packets, 800);
    // four one-second on periods at 5 Mbps
    assert_eq!(flows[2].tx_packets, 4 * 610);
    assert_eq!(flows[2].key.protocol, Protocol::Tcp);
    assert_eq!(flows[2].key.destination_port, 8080);

    for flow in flows {
        assert_eq!(flow.lost_packets, 0);
        assert!((flow.mean_delay_s.unwrap() - 0.002).abs() < 1e-9);
    }
    assert!((flows[0].throughput_mbps - 8.192).abs() < 1e-9);

    let AggregateOutcome::Observed(total) = &report.stats.aggregate else {
        panic!("expected flows");
    };
    assert!((total.throughput_mbps - 10.846208).abs() < 1e-9);
    assert!((total.summed_mean_delay_s - 0.006).abs() < 1e-9);
}

#[test]
fn overriding_traffic_changes_the_workload() {
    let mut scenario = scenario_runner::load_scenario(&scenario_path("cbr.toml")).unwrap();
    scenario.traffic = TrafficType::CbrBurst;
    scenario.assertions.clear();

    let report = scenario_runner::run(&scenario).unwrap();
    assert_eq!(report.stats.flows.len(), 2);
    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.sources[1].node, 1);
}

#[test]
fn report_serializes_to_json() {
    let report = scenario_runner::run_scenario(scenario_path("cbr.toml")).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["scenario"]["name"], "cbr");
    assert_eq!(json["stats"]["aggregate"]["status"], "observed");
    assert_eq!(json["sources"][0]["packets_sent"], 2440);
    assert_eq!(json["stats"]["flows"][0]["key"]["protocol"], "udp");
}
