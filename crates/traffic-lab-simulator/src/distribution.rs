use rand::Rng;
use rand_distr::{Distribution, Exp};
use traffic_lab_abstract::{ConfigError, DurationDistribution, SimTime};

/// Draws on/off period lengths from a validated [`DurationDistribution`].
#[derive(Debug, Clone)]
pub enum DurationSampler {
    Constant(SimTime),
    Exponential(Exp<f64>),
}

impl DurationSampler {
    /// `phase` names the period ("on" / "off") in error messages.
    pub fn new(distribution: &DurationDistribution, phase: &'static str) -> Result<Self, ConfigError> {
        distribution.validate(phase)?;
        match *distribution {
            DurationDistribution::Constant { value } => SimTime::try_from_secs_f64(value)
                .map(DurationSampler::Constant)
                .ok_or_else(|| ConfigError::InvalidDistribution {
                    phase,
                    reason: format!("constant {value} is not a valid duration"),
                }),
            DurationDistribution::Exponential { mean } => Exp::new(1.0 / mean)
                .map(DurationSampler::Exponential)
                .map_err(|e| ConfigError::InvalidDistribution {
                    phase,
                    reason: e.to_string(),
                }),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        match self {
            DurationSampler::Constant(value) => *value,
            DurationSampler::Exponential(exp) => {
                let secs: f64 = exp.sample(rng);
                SimTime::try_from_secs_f64(secs).unwrap_or(SimTime::MAX)
            }
        }
    }
}
