use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use traffic_lab_abstract::{ScenarioConfig, SimTime, TrafficType};
use traffic_lab_simulator::{AggregateOutcome, SimulationReport, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "On/off traffic workload and flow statistics simulator")]
struct Args {
    /// Load a scenario from disk. Without it a CBR scenario is built from the flags below.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of station nodes.
    #[arg(long)]
    num_nodes: Option<u32>,

    /// Traffic mix installed on the stations.
    #[arg(long, value_enum)]
    traffic: Option<TrafficArg>,

    /// Enable station mobility.
    #[arg(long)]
    mobility: Option<bool>,

    /// Simulated duration in seconds.
    #[arg(long)]
    sim_duration: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TrafficArg {
    None,
    #[value(name = "cbr", alias = "CBR")]
    Cbr,
    #[value(name = "burst", alias = "Burst")]
    Burst,
    #[value(name = "cbr-burst", alias = "CBR_Burst")]
    CbrBurst,
}

impl From<TrafficArg> for TrafficType {
    fn from(arg: TrafficArg) -> Self {
        match arg {
            TrafficArg::None => TrafficType::None,
            TrafficArg::Cbr => TrafficType::Cbr,
            TrafficArg::Burst => TrafficType::Burst,
            TrafficArg::CbrBurst => TrafficType::CbrBurst,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("traffic-lab-sim starting…");

    let scenario = args.build_scenario()?;
    let report = scenario_runner::run(&scenario)?;
    print_report(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    let failures = scenario_runner::check_assertions(&scenario.assertions, &report);
    if !failures.is_empty() {
        anyhow::bail!(
            "Scenario '{}' failed {} assertion(s):\n  {}",
            scenario.name,
            failures.len(),
            failures.join("\n  ")
        );
    }
    Ok(())
}

impl Args {
    fn build_scenario(&self) -> Result<ScenarioConfig> {
        let mut scenario = match &self.scenario {
            Some(path) => scenario_runner::load_scenario(path)?,
            None => default_scenario(),
        };

        if let Some(n) = self.num_nodes {
            scenario.num_nodes = n;
        }
        if let Some(traffic) = self.traffic {
            scenario.traffic = traffic.into();
        }
        if let Some(mobility) = self.mobility {
            scenario.mobility = mobility;
        }
        if let Some(secs) = self.sim_duration {
            scenario.sim_duration = SimTime::try_from_secs_f64(secs)
                .filter(|duration| !duration.is_zero())
                .with_context(|| {
                    format!("--sim-duration must be a positive number of seconds, got {secs}")
                })?;
        }
        if let Some(seed) = self.seed {
            scenario.seed = seed;
        }
        Ok(scenario)
    }
}

fn default_scenario() -> ScenarioConfig {
    ScenarioConfig {
        name: "default".to_string(),
        description: "Five stations, CBR from station 0 to the server".to_string(),
        num_nodes: 5,
        traffic: TrafficType::Cbr,
        mobility: false,
        sim_duration: SimTime::from_secs(10),
        seed: 0,
        address_base: Ipv4Addr::new(10, 1, 1, 0),
        channel: Default::default(),
        sources: Vec::new(),
        assertions: Vec::new(),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report(report: &SimulationReport) {
    let stats = &report.stats;
    println!("Flows monitored: {}", stats.flows.len() + stats.rejected.len());
    for flow in &stats.flows {
        println!("Flow {} ({})", flow.flow, flow.key);
        println!("  Tx packets: {}", flow.tx_packets);
        println!("  Rx packets: {}", flow.rx_packets);
        println!("  Throughput: {:.4} Mbps", flow.throughput_mbps);
        match flow.mean_delay_s {
            Some(delay) => println!("  Mean delay: {delay:.6} s"),
            None => println!("  Mean delay: N/A (no packets received)"),
        }
        println!("  Lost packets: {}", flow.lost_packets);
    }
    for rejected in &stats.rejected {
        println!("Rejected: {rejected}");
    }

    match &stats.aggregate {
        AggregateOutcome::Observed(total) => {
            println!("Total Tx packets: {}", total.tx_packets);
            println!("Total Rx packets: {}", total.rx_packets);
            println!("Total lost packets: {}", total.lost_packets);
            println!("Total throughput: {:.4} Mbps", total.throughput_mbps);
            println!("Summed per-flow mean delay: {:.6} s", total.summed_mean_delay_s);
            match total.mean_delay_s {
                Some(delay) => println!("Mean delay: {delay:.6} s"),
                None => println!("Mean delay: N/A"),
            }
        }
        AggregateOutcome::NoFlowsObserved => {
            println!("No flows observed. Check the application setup.");
        }
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    info!("Trace written to {}", path.display());
    Ok(())
}
