//! Open-loop request sources.

use rand::RngCore;
use rand_distr::{Distribution, Exp1};
use serde::{Deserialize, Serialize};

use crate::engine::SimTime;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrivalProcess {
    /// Exponential inter-arrival times at the workload rate.
    #[default]
    Poisson,
    /// Fixed `1 / rate` spacing.
    Deterministic,
    /// Explicit arrival instants, ignoring the rate.
    Scripted { times: Vec<SimTime> },
}

/// Generates arrival instants for one entry point. The first arrival is at t=0
/// unless scripted otherwise.
#[derive(Debug)]
pub struct ArrivalSource {
    process: ArrivalProcess,
    rate: f64,
    remaining: Option<u64>,
    cursor: usize,
    next: Option<SimTime>,
}

impl ArrivalSource {
    pub fn new(process: ArrivalProcess, rate: f64, max_requests: Option<u64>) -> Self {
        let next = match &process {
            ArrivalProcess::Scripted { times } => times.first().copied(),
            _ if rate > 0.0 => Some(0.0),
            _ => None,
        };
        let mut source = Self {
            process,
            rate,
            remaining: max_requests,
            cursor: 0,
            next,
        };
        if source.remaining == Some(0) {
            source.next = None;
        }
        source
    }

    /// Instant of the next arrival, if any remain.
    pub fn peek(&self) -> Option<SimTime> {
        self.next
    }

    /// Consumes the pending arrival and draws the one after it.
    pub fn advance(&mut self, rng: &mut dyn RngCore) -> Option<SimTime> {
        let current = self.next?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.next = None;
                return Some(current);
            }
        }
        self.cursor += 1;
        self.next = match &self.process {
            ArrivalProcess::Poisson => {
                let gap: f64 = Exp1.sample(rng);
                Some(current + gap / self.rate)
            }
            ArrivalProcess::Deterministic => Some(current + 1.0 / self.rate),
            ArrivalProcess::Scripted { times } => {
                times.get(self.cursor).map(|&time| time.max(current))
            }
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn drain(source: &mut ArrivalSource, rng: &mut ChaCha8Rng, limit: usize) -> Vec<SimTime> {
        std::iter::from_fn(|| source.advance(rng)).take(limit).collect()
    }

    #[test]
    fn test_deterministic_spacing_and_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut source = ArrivalSource::new(ArrivalProcess::Deterministic, 4.0, Some(3));
        assert_eq!(drain(&mut source, &mut rng, 10), vec![0.0, 0.25, 0.5]);
        assert_eq!(source.peek(), None);
    }

    #[test]
    fn test_scripted_times() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut source = ArrivalSource::new(
            ArrivalProcess::Scripted {
                times: vec![0.0, 0.0, 2.5],
            },
            1.0,
            None,
        );
        assert_eq!(drain(&mut source, &mut rng, 10), vec![0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_poisson_rate() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut source = ArrivalSource::new(ArrivalProcess::Poisson, 2.0, Some(10_001));
        let times = drain(&mut source, &mut rng, 20_000);
        let last = *times.last().unwrap();
        // 10_000 gaps with mean 0.5.
        assert!((last / 10_000.0 - 0.5).abs() < 0.03, "mean gap {}", last / 10_000.0);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_zero_rate_generates_nothing() {
        let source = ArrivalSource::new(ArrivalProcess::Poisson, 0.0, None);
        assert_eq!(source.peek(), None);
    }
}
