//! Flow statistics: per-flow and aggregate throughput, delay and loss derived
//! from a snapshot of flow records.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use traffic_lab_abstract::{FlowId, FlowKey, ObservedFlow};

/// A flow record that violates the record invariants. The flow is left out of
/// the aggregate; its siblings are still processed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedRecord {
    #[error("flow {flow}: {rx} packets received but only {tx} transmitted")]
    ReceivedExceedsTransmitted { flow: FlowId, tx: u64, rx: u64 },
    #[error("flow {flow}: delay sum {delay_sum}s recorded without any received packet")]
    DelayWithoutReceipts { flow: FlowId, delay_sum: f64 },
    #[error("flow {flow}: delay sum {delay_sum}s is negative or not finite")]
    InvalidDelay { flow: FlowId, delay_sum: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("observation window must be positive and finite, got {0}s")]
    InvalidWindow(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub flow: FlowId,
    pub key: FlowKey,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub throughput_mbps: f64,
    /// `None` when nothing was received.
    pub mean_delay_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub flows: usize,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub throughput_mbps: f64,
    /// Sum of the per-flow mean delays, as the legacy report printed it.
    pub summed_mean_delay_s: f64,
    /// Packet-weighted mean delay over every received packet.
    pub mean_delay_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateOutcome {
    Observed(AggregateReport),
    /// No well-formed flow was seen. Usually an upstream configuration or
    /// connectivity problem.
    NoFlowsObserved,
}

impl AggregateOutcome {
    pub fn report(&self) -> Option<&AggregateReport> {
        match self {
            AggregateOutcome::Observed(report) => Some(report),
            AggregateOutcome::NoFlowsObserved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStats {
    pub window_s: f64,
    pub flows: Vec<FlowReport>,
    pub rejected: Vec<MalformedRecord>,
    pub aggregate: AggregateOutcome,
}

/// Derives the report for a single flow over a window of `window_s` seconds.
pub fn flow_report(flow: &ObservedFlow, window_s: f64) -> Result<FlowReport, MalformedRecord> {
    let record = &flow.record;
    if !record.delay_sum.is_finite() || record.delay_sum < 0.0 {
        return Err(MalformedRecord::InvalidDelay {
            flow: flow.id,
            delay_sum: record.delay_sum,
        });
    }
    let lost_packets = record.tx_packets.checked_sub(record.rx_packets).ok_or(
        MalformedRecord::ReceivedExceedsTransmitted {
            flow: flow.id,
            tx: record.tx_packets,
            rx: record.rx_packets,
        },
    )?;

    let (throughput_mbps, mean_delay_s) = if record.rx_packets > 0 {
        (
            record.rx_bytes as f64 * 8.0 / (window_s * 1_000_000.0),
            Some(record.delay_sum / record.rx_packets as f64),
        )
    } else if record.delay_sum != 0.0 {
        return Err(MalformedRecord::DelayWithoutReceipts {
            flow: flow.id,
            delay_sum: record.delay_sum,
        });
    } else {
        (0.0, None)
    };

    Ok(FlowReport {
        flow: flow.id,
        key: flow.key,
        tx_packets: record.tx_packets,
        rx_packets: record.rx_packets,
        rx_bytes: record.rx_bytes,
        lost_packets,
        throughput_mbps,
        mean_delay_s,
    })
}

/// Summarizes `flows` observed over a window of `window_s` seconds.
///
/// Malformed records are reported in [`FlowStats::rejected`] and excluded from
/// every sum. When no well-formed flow remains the aggregate is
/// [`AggregateOutcome::NoFlowsObserved`] rather than a zero-filled report.
pub fn aggregate(flows: &[ObservedFlow], window_s: f64) -> Result<FlowStats, StatsError> {
    if !window_s.is_finite() || window_s <= 0.0 {
        return Err(StatsError::InvalidWindow(window_s));
    }

    let mut reports = Vec::with_capacity(flows.len());
    let mut rejected = Vec::new();
    let mut delay_total = 0.0;

    for flow in flows {
        match flow_report(flow, window_s) {
            Ok(report) => {
                delay_total += flow.record.delay_sum;
                reports.push(report);
            }
            Err(malformed) => {
                warn!("skipping malformed flow record: {}", malformed);
                rejected.push(malformed);
            }
        }
    }

    let aggregate = if reports.is_empty() {
        warn!(
            "no flows observed ({} records, {} rejected); check application and routing setup",
            flows.len(),
            rejected.len()
        );
        AggregateOutcome::NoFlowsObserved
    } else {
        let rx_packets: u64 = reports.iter().map(|r| r.rx_packets).sum();
        AggregateOutcome::Observed(AggregateReport {
            flows: reports.len(),
            tx_packets: reports.iter().map(|r| r.tx_packets).sum(),
            rx_packets,
            lost_packets: reports.iter().map(|r| r.lost_packets).sum(),
            throughput_mbps: reports.iter().map(|r| r.throughput_mbps).sum(),
            summed_mean_delay_s: reports.iter().filter_map(|r| r.mean_delay_s).sum(),
            mean_delay_s: (rx_packets > 0).then(|| delay_total / rx_packets as f64),
        })
    };

    Ok(FlowStats {
        window_s,
        flows: reports,
        rejected,
        aggregate,
    })
}
