use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const LOW_POINT: f64 = 0.05;
const HIGH_POINT: f64 = 1.0;

fn default_start() -> f64 {
    LOW_POINT
}

fn default_end() -> f64 {
    HIGH_POINT
}

/// Places `concentration` of the points at or above `cutoff`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Skew {
    pub cutoff: f64,
    pub concentration: f64,
}

/// Load levels expressed relative to the topology's saturation rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRange {
    #[serde(default = "default_start")]
    pub start: f64,
    #[serde(default = "default_end")]
    pub end: f64,
    pub num_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew: Option<Skew>,
}

fn linspace(low: f64, high: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let step = (high - low) / (points - 1) as f64;
            (0..points).map(|i| low + step * i as f64).collect()
        }
    }
}

impl LoadRange {
    pub fn new(num_points: usize) -> Self {
        Self {
            start: LOW_POINT,
            end: HIGH_POINT,
            num_points,
            skew: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_points == 0 {
            return Err(ConfigError::invalid(
                "sweep.load_range.num_points",
                "must be positive",
            ));
        }
        if !(self.start > 0.0 && self.start <= self.end && self.end.is_finite()) {
            return Err(ConfigError::invalid(
                "sweep.load_range",
                "expected 0 < start <= end",
            ));
        }
        if let Some(skew) = self.skew {
            if !(self.start..=self.end).contains(&skew.cutoff) {
                return Err(ConfigError::invalid(
                    "sweep.load_range.skew.cutoff",
                    "cutoff must lie between start and end",
                ));
            }
            if !(0.0..=1.0).contains(&skew.concentration) {
                return Err(ConfigError::invalid(
                    "sweep.load_range.skew.concentration",
                    "must lie in [0, 1]",
                ));
            }
        }
        Ok(())
    }

    /// Relative utilisations, ascending.
    pub fn relative(&self) -> Vec<f64> {
        match self.skew {
            None => linspace(self.start, self.end, self.num_points),
            Some(skew) => {
                let high = (self.num_points as f64 * skew.concentration).ceil() as usize;
                let high = high.min(self.num_points);
                let mut points = linspace(self.start, skew.cutoff, self.num_points - high);
                points.extend(linspace(skew.cutoff, self.end, high));
                points
            }
        }
    }

    /// Absolute arrival rates for a topology saturating at `saturation_rate`.
    pub fn rates(&self, saturation_rate: f64) -> Vec<f64> {
        self.relative()
            .into_iter()
            .map(|rho| rho * saturation_rate)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_even_spacing() {
        assert_close(&LoadRange::new(3).relative(), &[0.05, 0.525, 1.0]);
    }

    #[test]
    fn test_rates_scale_with_saturation() {
        // 5 threads, mean service 10: saturates at 0.5 requests per unit time.
        assert_close(&LoadRange::new(3).rates(0.5), &[0.025, 0.2625, 0.5]);
    }

    #[test]
    fn test_concentrated_points() {
        let range = LoadRange {
            skew: Some(Skew {
                cutoff: 0.8,
                concentration: 0.7,
            }),
            ..LoadRange::new(10)
        };
        let mut expected = linspace(0.05, 0.8, 3);
        expected.extend(linspace(0.8, 1.0, 7));
        assert_close(&range.relative(), &expected);
        assert!(range.validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(LoadRange::new(0).validate().is_err());
        let backwards = LoadRange {
            start: 0.9,
            end: 0.5,
            ..LoadRange::new(3)
        };
        assert!(backwards.validate().is_err());
    }
}
