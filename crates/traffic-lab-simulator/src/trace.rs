use serde::Serialize;
use std::net::Ipv4Addr;
use traffic_lab_abstract::{AppTelemetry, NodeId, SimConfig, SimTime, TrafficType};

use crate::stats::FlowStats;

/// Scenario parameters echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub num_nodes: u32,
    pub traffic: TrafficType,
    pub mobility: bool,
    pub sim_duration: SimTime,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub node: NodeId,
    pub address: Ipv4Addr,
    pub port: u16,
    #[serde(flatten)]
    pub telemetry: AppTelemetry,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: Option<ScenarioSummary>,
    pub config: SimConfig,
    pub end_time: SimTime,
    pub events_processed: u64,
    pub dropped_loss: u64,
    pub dropped_no_route: u64,
    pub sources: Vec<SourceSummary>,
    pub stats: FlowStats,
}
