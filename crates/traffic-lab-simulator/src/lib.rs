pub mod distribution;
pub mod engine;
pub mod generator;
pub mod monitor;
pub mod scenario_runner;
pub mod stats;
pub mod trace;

pub use distribution::DurationSampler;
pub use engine::{AppId, Simulator};
pub use generator::{OnOffGenerator, Phase, TrafficSourceState};
pub use monitor::FlowMonitor;
pub use stats::{
    AggregateOutcome, AggregateReport, FlowReport, FlowStats, MalformedRecord, StatsError,
    aggregate, flow_report,
};
pub use trace::{ScenarioSummary, SimulationReport, SourceSummary};
