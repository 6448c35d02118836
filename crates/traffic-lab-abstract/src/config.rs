use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::SimTime;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("packet size must be positive")]
    ZeroPacketSize,
    #[error("invalid data rate: {0}")]
    InvalidRate(String),
    #[error("invalid {phase} distribution: {reason}")]
    InvalidDistribution { phase: &'static str, reason: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Channel and clock parameters for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Probability that a datagram is dropped in transit.
    pub loss_rate: f64,
    /// One-way latency is drawn uniformly from `min_latency..=max_latency`.
    pub min_latency: SimTime,
    pub max_latency: SimTime,
    pub seed: u64,
    /// No event scheduled after this instant is processed.
    pub stop_time: SimTime,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            min_latency: SimTime::from_millis(2),
            max_latency: SimTime::from_millis(2),
            seed: 0,
            stop_time: SimTime::from_secs(10),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::Validation(format!(
                "loss rate must be within [0, 1], got {}",
                self.loss_rate
            )));
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::Validation(format!(
                "min latency {} exceeds max latency {}",
                self.min_latency, self.max_latency
            )));
        }
        if self.stop_time.is_zero() {
            return Err(ConfigError::Validation("stop time must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_loss_and_inverted_latency() {
        let lossy = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(lossy.validate().is_err());

        let inverted = SimConfig {
            min_latency: SimTime::from_millis(10),
            max_latency: SimTime::from_millis(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
