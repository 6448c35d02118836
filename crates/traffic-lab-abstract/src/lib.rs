pub mod config;
pub mod flow;
pub mod interface;
pub mod packet;
pub mod rate;
pub mod scenario;
pub mod time;
pub mod traffic;

pub use config::{ConfigError, SimConfig};
pub use flow::{FlowId, FlowKey, FlowRecord, ObservedFlow};
pub use interface::{AppTelemetry, SystemContext, TrafficApplication};
pub use packet::{Datagram, Protocol};
pub use rate::DataRate;
pub use scenario::{
    ChannelOverride, ScenarioAssertion, ScenarioConfig, ScheduledSource, SourceSpec, TrafficType,
};
pub use time::SimTime;
pub use traffic::{DurationDistribution, NodeId, TrafficSourceConfig};
