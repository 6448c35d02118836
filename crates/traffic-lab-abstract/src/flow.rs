use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::packet::Protocol;
use crate::time::SimTime;

/// Identifier assigned by the flow classifier, starting at 1.
pub type FlowId = u32;

/// The five-tuple a flow is classified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: Protocol,
    pub source_port: u16,
    pub destination_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.source, self.source_port, self.destination, self.destination_port, self.protocol
        )
    }
}

/// Counters collected for one flow over the observation window.
///
/// Well-formed records satisfy `rx_packets <= tx_packets` and carry no delay
/// when nothing was received. The statistics pass rejects records that don't.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// Sum of end-to-end delays of received packets, in seconds.
    pub delay_sum: f64,
    pub first_tx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
}

impl FlowRecord {
    /// Minimal record with only the fields the statistics pass reads.
    pub fn new(tx_packets: u64, rx_packets: u64, rx_bytes: u64, delay_sum: f64) -> Self {
        Self {
            tx_packets,
            rx_packets,
            rx_bytes,
            delay_sum,
            ..Default::default()
        }
    }
}

/// A classified flow as exposed by a monitor snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedFlow {
    pub id: FlowId,
    pub key: FlowKey,
    pub record: FlowRecord,
}
