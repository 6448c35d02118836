use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Link or application data rate in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    /// Builds a rate from bits per second. Zero is not a usable rate.
    pub fn from_bps(bps: u64) -> Result<Self, ConfigError> {
        if bps == 0 {
            return Err(ConfigError::InvalidRate("rate must be positive".into()));
        }
        Ok(Self(bps))
    }

    pub fn from_mbps(mbps: u64) -> Result<Self, ConfigError> {
        Self::from_bps(mbps.saturating_mul(1_000_000))
    }

    pub const fn bps(self) -> u64 {
        self.0
    }
}

/// Unit suffixes accepted by [`DataRate::from_str`], as (suffix, bits per unit).
const UNITS: &[(&str, f64)] = &[
    ("Gbps", 1e9),
    ("Mbps", 1e6),
    ("kbps", 1e3),
    ("Kbps", 1e3),
    ("bps", 1.0),
    ("GBps", 8e9),
    ("MBps", 8e6),
    ("KBps", 8e3),
    ("kBps", 8e3),
    ("Bps", 8.0),
];

impl FromStr for DataRate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (number, scale) = UNITS
            .iter()
            .find_map(|(suffix, scale)| s.strip_suffix(suffix).map(|n| (n.trim(), *scale)))
            .unwrap_or((s, 1.0));

        let value: f64 = number
            .parse()
            .map_err(|_| ConfigError::InvalidRate(format!("cannot parse rate '{s}'")))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidRate(format!(
                "rate must be positive, got '{s}'"
            )));
        }
        let bps = (value * scale).round();
        if bps >= u64::MAX as f64 {
            return Err(ConfigError::InvalidRate(format!("rate '{s}' is out of range")));
        }
        Self::from_bps(bps as u64)
    }
}

impl TryFrom<String> for DataRate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
