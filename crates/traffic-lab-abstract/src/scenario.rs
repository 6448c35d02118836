//! Scenario files: one configuration-driven description covering every
//! topology/traffic variant, parameterized by node count, traffic mix,
//! mobility and duration.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::config::{ConfigError, SimConfig};
use crate::packet::Protocol;
use crate::rate::DataRate;
use crate::time::SimTime;
use crate::traffic::{DurationDistribution, NodeId, TrafficSourceConfig};

/// UDP port the preset sources target on the server node.
pub const PRESET_PORT: u16 = 9;
/// Preset sources start two seconds in, leaving room for association.
pub const PRESET_START: SimTime = SimTime::from_secs(2);
const PRESET_PACKET_SIZE: u32 = 4096;
const PRESET_RATE_MBPS: u64 = 10;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Number of station nodes. One extra server node is always present.
    pub num_nodes: u32,
    #[serde(default)]
    pub traffic: TrafficType,
    /// Whether stations move. Position updates belong to the external
    /// mobility model; the flag is carried for reporting.
    #[serde(default)]
    pub mobility: bool,
    pub sim_duration: SimTime,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_address_base")]
    pub address_base: Ipv4Addr,
    #[serde(default)]
    pub channel: ChannelOverride,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

fn default_address_base() -> Ipv4Addr {
    Ipv4Addr::new(10, 1, 1, 0)
}

/// Built-in traffic mixes.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    /// Only the sources listed explicitly in the scenario.
    #[default]
    None,
    /// Constant bit rate from station 0.
    #[serde(alias = "CBR")]
    Cbr,
    /// Exponential on/off bursts from station 1.
    #[serde(alias = "Burst")]
    Burst,
    /// Both of the above.
    #[serde(alias = "CBR_Burst")]
    CbrBurst,
}

impl TrafficType {
    fn includes_cbr(self) -> bool {
        matches!(self, TrafficType::Cbr | TrafficType::CbrBurst)
    }

    fn includes_burst(self) -> bool {
        matches!(self, TrafficType::Burst | TrafficType::CbrBurst)
    }

    /// Smallest station count the preset can be installed on.
    fn min_nodes(self) -> u32 {
        if self.includes_burst() { 2 } else { 1 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ChannelOverride {
    pub loss_rate: Option<f64>,
    pub min_latency: Option<SimTime>,
    pub max_latency: Option<SimTime>,
}

impl ChannelOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
    }
}

/// An explicitly listed source with its optional active window.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SourceSpec {
    #[serde(flatten)]
    pub config: TrafficSourceConfig,
    pub start: Option<SimTime>,
    pub stop: Option<SimTime>,
}

/// A validated source together with the interval it is active in.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSource {
    pub config: TrafficSourceConfig,
    pub start: SimTime,
    pub stop: SimTime,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Number of classified flows is within range
    FlowCount { min: usize, max: Option<usize> },
    /// Summed throughput across well-formed flows is within range
    AggregateThroughput { min_mbps: f64, max_mbps: Option<f64> },
    /// Total lost packets does not exceed `max`
    MaxLostPackets { max: u64 },
    /// At least one well-formed flow was observed
    FlowsObserved,
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_nodes == 0 {
            return Err(ConfigError::Validation("num_nodes must be positive".into()));
        }
        if self.sim_duration.is_zero() {
            return Err(ConfigError::Validation("sim_duration must be positive".into()));
        }
        if self.num_nodes < self.traffic.min_nodes() {
            return Err(ConfigError::Validation(format!(
                "traffic {:?} needs at least {} nodes, got {}",
                self.traffic,
                self.traffic.min_nodes(),
                self.num_nodes
            )));
        }
        if self.node_address(self.server_node()).is_none() {
            return Err(ConfigError::Validation(format!(
                "{} nodes do not fit above address base {}",
                self.num_nodes, self.address_base
            )));
        }
        self.sim_config().validate()?;
        self.traffic_sources().map(|_| ())
    }

    /// The server node sits after all stations.
    pub fn server_node(&self) -> NodeId {
        self.num_nodes
    }

    /// Address of `node`: the base address plus `node + 1`.
    pub fn node_address(&self, node: NodeId) -> Option<Ipv4Addr> {
        if node > self.server_node() {
            return None;
        }
        u32::from(self.address_base)
            .checked_add(node.checked_add(1)?)
            .map(Ipv4Addr::from)
    }

    /// Addresses of every node, stations first, server last.
    pub fn node_addresses(&self) -> Vec<Ipv4Addr> {
        (0..=self.server_node())
            .filter_map(|node| self.node_address(node))
            .collect()
    }

    pub fn sim_config(&self) -> SimConfig {
        let mut config = SimConfig {
            seed: self.seed,
            stop_time: self.sim_duration,
            ..SimConfig::default()
        };
        self.channel.apply_to(&mut config);
        config
    }

    /// Expands the traffic preset and explicit sources into validated,
    /// scheduled sources. Preset sources come first.
    pub fn traffic_sources(&self) -> Result<Vec<ScheduledSource>, ConfigError> {
        let mut sources = Vec::new();

        if self.traffic != TrafficType::None {
            let server = self
                .node_address(self.server_node())
                .ok_or_else(|| ConfigError::Validation("server has no address".into()))?;
            let destination = SocketAddrV4::new(server, PRESET_PORT);
            if self.traffic.includes_cbr() {
                sources.push(self.preset(
                    0,
                    destination,
                    DurationDistribution::constant(1.0),
                    DurationDistribution::constant(0.0),
                )?);
            }
            if self.traffic.includes_burst() {
                sources.push(self.preset(
                    1,
                    destination,
                    DurationDistribution::exponential(1.0),
                    DurationDistribution::exponential(1.0),
                )?);
            }
        }

        for spec in &self.sources {
            let source = ScheduledSource {
                config: spec.config.clone(),
                start: spec.start.unwrap_or(SimTime::ZERO),
                stop: spec.stop.unwrap_or(self.sim_duration),
            };
            if source.config.node > self.server_node() {
                return Err(ConfigError::Validation(format!(
                    "source bound to node {} but the topology has nodes 0..={}",
                    source.config.node,
                    self.server_node()
                )));
            }
            sources.push(source);
        }

        for source in &sources {
            source.config.validate()?;
            if source.start >= source.stop {
                return Err(ConfigError::Validation(format!(
                    "source on node {} starts at {} but stops at {}",
                    source.config.node, source.start, source.stop
                )));
            }
        }
        Ok(sources)
    }

    fn preset(
        &self,
        node: NodeId,
        destination: SocketAddrV4,
        on_time: DurationDistribution,
        off_time: DurationDistribution,
    ) -> Result<ScheduledSource, ConfigError> {
        Ok(ScheduledSource {
            config: TrafficSourceConfig {
                node,
                destination,
                protocol: Protocol::Udp,
                packet_size: PRESET_PACKET_SIZE,
                data_rate: DataRate::from_mbps(PRESET_RATE_MBPS)?,
                on_time,
                off_time,
                max_bytes: None,
            },
            start: PRESET_START,
            stop: self.sim_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ScenarioConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn cbr_burst_preset_expands_to_two_sources() {
        let scenario = parse(
            r#"
            name = "mix"
            num_nodes = 5
            traffic = "CBR_Burst"
            sim_duration = 10.0
            "#,
        );
        scenario.validate().unwrap();
        let sources = scenario.traffic_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].config.node, 0);
        assert_eq!(sources[1].config.node, 1);
        assert_eq!(
            sources[0].config.destination,
            "10.1.1.6:9".parse::<SocketAddrV4>().unwrap()
        );
        assert_eq!(sources[1].config.on_time, DurationDistribution::exponential(1.0));
        assert_eq!(sources[0].start, PRESET_START);
        assert_eq!(sources[0].stop, SimTime::from_secs(10));
    }

    #[test]
    fn explicit_sources_keep_their_window() {
        let scenario = parse(
            r#"
            name = "explicit"
            num_nodes = 2
            sim_duration = 10
            address_base = "192.168.0.0"

            [channel]
            loss_rate = 0.1

            [[sources]]
            node = 0
            destination = "192.168.0.3:10"
            packet_size = 1024
            data_rate = "819.2kbps"
            on_time = { kind = "constant", value = 10 }
            off_time = { kind = "constant", value = 0 }
            max_bytes = 1024000
            start = 2.0
            stop = 9.5

            [[assertions]]
            type = "flows_observed"
            "#,
        );
        scenario.validate().unwrap();
        let sources = scenario.traffic_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].start, SimTime::from_secs(2));
        assert_eq!(sources[0].stop, SimTime::from_millis(9500));
        assert_eq!(sources[0].config.max_bytes, Some(1_024_000));
        assert_eq!(scenario.sim_config().loss_rate, 0.1);
        assert_eq!(scenario.assertions, vec![ScenarioAssertion::FlowsObserved]);
        assert_eq!(
            scenario.node_addresses(),
            vec![
                Ipv4Addr::new(192, 168, 0, 1),
                Ipv4Addr::new(192, 168, 0, 2),
                Ipv4Addr::new(192, 168, 0, 3),
            ]
        );
    }

    #[test]
    fn burst_needs_two_stations() {
        let scenario = parse(
            r#"
            name = "tiny"
            num_nodes = 1
            traffic = "burst"
            sim_duration = 10.0
            "#,
        );
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn source_on_unknown_node_is_rejected() {
        let scenario = parse(
            r#"
            name = "bad"
            num_nodes = 1
            sim_duration = 5.0

            [[sources]]
            node = 7
            destination = "10.1.1.2:9"
            packet_size = 512
            data_rate = "1Mbps"
            on_time = { kind = "constant", value = 1 }
            off_time = { kind = "constant", value = 1 }
            "#,
        );
        assert!(matches!(scenario.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn preset_that_starts_after_the_end_is_rejected() {
        let scenario = parse(
            r#"
            name = "short"
            num_nodes = 1
            traffic = "cbr"
            sim_duration = 1.5
            "#,
        );
        assert!(scenario.validate().is_err());
    }
}
