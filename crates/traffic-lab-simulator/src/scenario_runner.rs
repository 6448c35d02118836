use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;
use traffic_lab_abstract::{ScenarioAssertion, ScenarioConfig};

use crate::engine::Simulator;
use crate::generator::OnOffGenerator;
use crate::stats::AggregateOutcome;
use crate::trace::{ScenarioSummary, SimulationReport};

pub fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: ScenarioConfig =
        toml::from_str(&content).context("Failed to parse scenario file")?;
    info!("Loaded scenario '{}' from {}", scenario.name, path.display());
    Ok(scenario)
}

/// Seed for the `index`-th generator, so sources draw independent periods.
pub fn generator_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index as u64 + 1)
}

/// Lays out the topology and installs one on/off generator per source.
pub fn build_simulator(scenario: &ScenarioConfig) -> Result<Simulator> {
    scenario
        .validate()
        .with_context(|| format!("Invalid scenario '{}'", scenario.name))?;

    let mut sim = Simulator::new(scenario.sim_config(), scenario.node_addresses())?;
    for (index, source) in scenario.traffic_sources()?.into_iter().enumerate() {
        let node = source.config.node;
        let generator = OnOffGenerator::new(source.config, generator_seed(scenario.seed, index))
            .with_context(|| format!("Invalid traffic source #{index}"))?;
        let app = sim.install(node, Box::new(generator))?;
        sim.start_app(app, source.start);
        sim.stop_app(app, source.stop);
    }
    Ok(sim)
}

pub fn run(scenario: &ScenarioConfig) -> Result<SimulationReport> {
    info!(
        "Running scenario '{}': {} nodes, traffic {:?}, mobility {}, {}",
        scenario.name, scenario.num_nodes, scenario.traffic, scenario.mobility, scenario.sim_duration
    );
    let mut sim = build_simulator(scenario)?;
    sim.run_until_complete();

    let mut report = sim.export_report()?;
    report.scenario = Some(ScenarioSummary {
        name: scenario.name.clone(),
        num_nodes: scenario.num_nodes,
        traffic: scenario.traffic,
        mobility: scenario.mobility,
        sim_duration: scenario.sim_duration,
        seed: scenario.seed,
    });
    Ok(report)
}

/// Returns one message per failed assertion.
pub fn check_assertions(assertions: &[ScenarioAssertion], report: &SimulationReport) -> Vec<String> {
    let aggregate = report.stats.aggregate.report();
    let mut failures = Vec::new();

    for assertion in assertions {
        match assertion {
            ScenarioAssertion::FlowCount { min, max } => {
                let count = report.stats.flows.len() + report.stats.rejected.len();
                if count < *min || max.is_some_and(|max| count > max) {
                    failures.push(format!(
                        "flow count {count} outside [{min}, {}]",
                        max.map_or("∞".to_string(), |m| m.to_string())
                    ));
                }
            }
            ScenarioAssertion::AggregateThroughput { min_mbps, max_mbps } => {
                let mbps = aggregate.map_or(0.0, |a| a.throughput_mbps);
                if mbps < *min_mbps || max_mbps.is_some_and(|max| mbps > max) {
                    failures.push(format!(
                        "aggregate throughput {mbps:.3} Mbps outside [{min_mbps}, {}]",
                        max_mbps.map_or("∞".to_string(), |m| m.to_string())
                    ));
                }
            }
            ScenarioAssertion::MaxLostPackets { max } => {
                let lost = aggregate.map_or(0, |a| a.lost_packets);
                if lost > *max {
                    failures.push(format!("{lost} packets lost, at most {max} allowed"));
                }
            }
            ScenarioAssertion::FlowsObserved => {
                if report.stats.aggregate == AggregateOutcome::NoFlowsObserved {
                    failures.push("no flows observed".to_string());
                }
            }
        }
    }
    failures
}

/// Loads, runs and checks a scenario file.
pub fn run_scenario(path: impl AsRef<Path>) -> Result<SimulationReport> {
    let scenario = load_scenario(path.as_ref())?;
    let report = run(&scenario)?;
    let failures = check_assertions(&scenario.assertions, &report);
    if !failures.is_empty() {
        anyhow::bail!(
            "Scenario '{}' failed {} assertion(s):\n  {}",
            scenario.name,
            failures.len(),
            failures.join("\n  ")
        );
    }
    info!("Scenario '{}' passed {} assertion(s)", scenario.name, scenario.assertions.len());
    Ok(report)
}
