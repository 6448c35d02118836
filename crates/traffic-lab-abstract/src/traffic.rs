//! Traffic source descriptors: what a generator sends, where, and with which
//! on/off timing.

use serde::{Deserialize, Serialize};
use std::net::SocketAddrV4;

use crate::config::ConfigError;
use crate::packet::Protocol;
use crate::rate::DataRate;
use crate::time::SimTime;

/// Smallest exponential mean the nanosecond clock can resolve, in seconds.
const MIN_EXPONENTIAL_MEAN: f64 = 1e-9;

/// Index of a node in the scenario topology.
pub type NodeId = u32;

/// Distribution that on and off period lengths are drawn from, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationDistribution {
    /// Every sample equals `value`.
    Constant { value: f64 },
    /// Independent exponential samples with the given mean.
    Exponential { mean: f64 },
}

impl DurationDistribution {
    pub fn constant(value: f64) -> Self {
        DurationDistribution::Constant { value }
    }

    pub fn exponential(mean: f64) -> Self {
        DurationDistribution::Exponential { mean }
    }

    /// Expected sample value in seconds.
    pub fn mean(&self) -> f64 {
        match *self {
            DurationDistribution::Constant { value } => value,
            DurationDistribution::Exponential { mean } => mean,
        }
    }

    /// True when every sample is zero once converted to simulated time.
    pub fn is_always_zero(&self) -> bool {
        match *self {
            DurationDistribution::Constant { value } => {
                SimTime::try_from_secs_f64(value).is_some_and(SimTime::is_zero)
            }
            DurationDistribution::Exponential { .. } => false,
        }
    }

    pub fn validate(&self, phase: &'static str) -> Result<(), ConfigError> {
        match *self {
            DurationDistribution::Constant { value } if !value.is_finite() || value < 0.0 => {
                Err(ConfigError::InvalidDistribution {
                    phase,
                    reason: format!("constant must be finite and non-negative, got {value}"),
                })
            }
            DurationDistribution::Constant { value } if value != 0.0 && self.is_always_zero() => {
                Err(ConfigError::InvalidDistribution {
                    phase,
                    reason: format!("constant {value}s is shorter than one nanosecond"),
                })
            }
            DurationDistribution::Exponential { mean } if !mean.is_finite() || mean <= 0.0 => {
                Err(ConfigError::InvalidDistribution {
                    phase,
                    reason: format!("mean must be finite and positive, got {mean}"),
                })
            }
            DurationDistribution::Exponential { mean } if mean < MIN_EXPONENTIAL_MEAN => {
                Err(ConfigError::InvalidDistribution {
                    phase,
                    reason: format!("mean {mean}s is shorter than one nanosecond"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Immutable description of one on/off traffic source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSourceConfig {
    /// Node the source is installed on.
    pub node: NodeId,
    pub destination: SocketAddrV4,
    #[serde(default)]
    pub protocol: Protocol,
    /// Payload size of each emitted unit, in bytes.
    pub packet_size: u32,
    /// Sending rate while in the on phase.
    pub data_rate: DataRate,
    pub on_time: DurationDistribution,
    pub off_time: DurationDistribution,
    /// Total payload budget. The source stops once it is spent.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

impl TrafficSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_size == 0 {
            return Err(ConfigError::ZeroPacketSize);
        }
        self.on_time.validate("on")?;
        self.off_time.validate("off")?;
        if self.on_time.is_always_zero() && self.off_time.is_always_zero() {
            return Err(ConfigError::Validation(
                "on and off durations cannot both be constant zero".into(),
            ));
        }
        if self.max_bytes == Some(0) {
            return Err(ConfigError::Validation(
                "max_bytes must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Long-run fraction of time spent in the on phase.
    pub fn duty_cycle(&self) -> f64 {
        let on = self.on_time.mean();
        let off = self.off_time.mean();
        if on + off == 0.0 { 0.0 } else { on / (on + off) }
    }
}
