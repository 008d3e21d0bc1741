//! Service-time models.
//!
//! [`ServiceTime`] is the configuration form; [`ServiceTime::build`] turns it
//! into a sampler that draws from the run's random source.

use std::fmt::Debug;

use rand::RngCore;
use rand_distr::{Distribution, Exp1, Standard, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub trait ServiceTimeModel: Send + Debug {
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64;

    /// Analytic mean, used to convert relative load into arrival rates.
    fn mean(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceTime {
    Exponential { mean: f64 },
    Deterministic { value: f64 },
    Uniform { low: f64, high: f64 },
    /// `short` with probability `short_fraction`, otherwise `long`.
    Bimodal {
        short_fraction: f64,
        short: f64,
        long: f64,
    },
    /// Replays the samples in order, wrapping around.
    Trace { samples: Vec<f64> },
}

impl ServiceTime {
    pub fn mean(&self) -> f64 {
        match self {
            ServiceTime::Exponential { mean } => *mean,
            ServiceTime::Deterministic { value } => *value,
            ServiceTime::Uniform { low, high } => (low + high) / 2.0,
            ServiceTime::Bimodal {
                short_fraction,
                short,
                long,
            } => short_fraction * short + (1.0 - short_fraction) * long,
            ServiceTime::Trace { samples } if !samples.is_empty() => {
                samples.iter().sum::<f64>() / samples.len() as f64
            }
            ServiceTime::Trace { .. } => 0.0,
        }
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        let non_negative = |value: f64, what: &str| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    field,
                    format!("{what} must be a non-negative number, got {value}"),
                ))
            }
        };
        match self {
            ServiceTime::Exponential { mean } => {
                if !(mean.is_finite() && *mean > 0.0) {
                    return Err(ConfigError::invalid(
                        field,
                        format!("exponential mean must be positive, got {mean}"),
                    ));
                }
            }
            ServiceTime::Deterministic { value } => non_negative(*value, "service time")?,
            ServiceTime::Uniform { low, high } => {
                non_negative(*low, "low")?;
                non_negative(*high, "high")?;
                if low > high {
                    return Err(ConfigError::invalid(field, "uniform low exceeds high"));
                }
            }
            ServiceTime::Bimodal {
                short_fraction,
                short,
                long,
            } => {
                if !(0.0..=1.0).contains(short_fraction) {
                    return Err(ConfigError::invalid(
                        field,
                        "short_fraction must lie in [0, 1]",
                    ));
                }
                non_negative(*short, "short")?;
                non_negative(*long, "long")?;
            }
            ServiceTime::Trace { samples } => {
                if samples.is_empty() {
                    return Err(ConfigError::MissingParameter {
                        field: field.to_string(),
                        parameter: "samples",
                    });
                }
                for sample in samples {
                    non_negative(*sample, "trace sample")?;
                }
            }
        }
        Ok(())
    }

    /// Builds a sampler. Call [`validate`](Self::validate) first.
    pub fn build(&self) -> Box<dyn ServiceTimeModel> {
        match self.clone() {
            ServiceTime::Exponential { mean } => Box::new(Exponential { mean }),
            ServiceTime::Deterministic { value } => Box::new(Deterministic { value }),
            ServiceTime::Uniform { low, high } => Box::new(UniformTime { low, high }),
            ServiceTime::Bimodal {
                short_fraction,
                short,
                long,
            } => Box::new(Bimodal {
                short_fraction,
                short,
                long,
            }),
            ServiceTime::Trace { samples } => Box::new(Trace { samples, cursor: 0 }),
        }
    }
}

#[derive(Debug)]
struct Exponential {
    mean: f64,
}

impl ServiceTimeModel for Exponential {
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64 {
        let unit: f64 = Exp1.sample(rng);
        unit * self.mean
    }

    fn mean(&self) -> f64 {
        self.mean
    }
}

#[derive(Debug)]
struct Deterministic {
    value: f64,
}

impl ServiceTimeModel for Deterministic {
    fn sample(&mut self, _rng: &mut dyn RngCore) -> f64 {
        self.value
    }

    fn mean(&self) -> f64 {
        self.value
    }
}

#[derive(Debug)]
struct UniformTime {
    low: f64,
    high: f64,
}

impl ServiceTimeModel for UniformTime {
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64 {
        if self.high <= self.low {
            return self.low;
        }
        Uniform::new(self.low, self.high).sample(rng)
    }

    fn mean(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

#[derive(Debug)]
struct Bimodal {
    short_fraction: f64,
    short: f64,
    long: f64,
}

impl ServiceTimeModel for Bimodal {
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64 {
        let roll: f64 = Standard.sample(rng);
        if roll < self.short_fraction {
            self.short
        } else {
            self.long
        }
    }

    fn mean(&self) -> f64 {
        self.short_fraction * self.short + (1.0 - self.short_fraction) * self.long
    }
}

#[derive(Debug)]
struct Trace {
    samples: Vec<f64>,
    cursor: usize,
}

impl ServiceTimeModel for Trace {
    fn sample(&mut self, _rng: &mut dyn RngCore) -> f64 {
        let value = self.samples[self.cursor % self.samples.len()];
        self.cursor += 1;
        value
    }

    fn mean(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}
