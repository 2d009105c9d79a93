//! Inter-arrival delay generation
//!
//! A `RateGenerator` turns a target mean rate into a stream of delays drawn
//! from either an exponential distribution (Poisson arrivals) or a lognormal
//! distribution with a configurable coefficient of variation.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution as _, Exp, LogNormal};

use crate::utils::{BenchError, BenchResult};

/// Distribution selector as configured by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Poisson,
    Lognormal { cv: f64 },
}

impl Distribution {
    /// Parses a distribution name; `cv` is only used for lognormal.
    pub fn parse(name: &str, cv: f64) -> BenchResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "poisson" => Ok(Distribution::Poisson),
            "lognormal" => {
                if !cv.is_finite() || cv < 0.0 {
                    return Err(BenchError::InvalidVariation(cv));
                }
                Ok(Distribution::Lognormal { cv })
            }
            other => Err(BenchError::UnknownDistribution(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Poisson => "poisson",
            Distribution::Lognormal { .. } => "lognormal",
        }
    }
}

impl FromStr for Distribution {
    type Err = BenchError;

    /// Lognormal parsed this way uses the default cv of 4.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Distribution::parse(s, 4.0)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Poisson => write!(f, "poisson"),
            Distribution::Lognormal { cv } => write!(f, "lognormal (cv={cv})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sampler {
    Exponential(Exp<f64>),
    LogNormal(LogNormal<f64>),
}

/// Underlying normal parameters (μ, σ) for a lognormal with the given mean
/// and coefficient of variation.
pub fn lognormal_params(mean: f64, cv: f64) -> (f64, f64) {
    let variance = (cv * mean).powi(2);
    let mu = (mean.powi(2) / (variance + mean.powi(2)).sqrt()).ln();
    let sigma = (variance / mean.powi(2) + 1.0).ln().sqrt();
    (mu, sigma)
}

#[derive(Debug, Clone)]
pub struct RateGenerator {
    rate: f64,
    distribution: Distribution,
    sampler: Sampler,
    rng: StdRng,
}

impl RateGenerator {
    /// Creates a generator seeded from OS entropy, so two sessions never
    /// replay the same sequence.
    pub fn new(rate: f64, distribution: Distribution) -> BenchResult<Self> {
        Self::with_rng(rate, distribution, StdRng::from_os_rng())
    }

    /// Creates a reproducible generator for tests and replays.
    pub fn with_seed(rate: f64, distribution: Distribution, seed: u64) -> BenchResult<Self> {
        Self::with_rng(rate, distribution, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rate: f64, distribution: Distribution, rng: StdRng) -> BenchResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BenchError::InvalidRate(rate));
        }
        let sampler = match distribution {
            Distribution::Poisson => {
                Sampler::Exponential(Exp::new(rate).map_err(|_| BenchError::InvalidRate(rate))?)
            }
            Distribution::Lognormal { cv } => {
                let (mu, sigma) = lognormal_params(1.0 / rate, cv);
                Sampler::LogNormal(
                    LogNormal::new(mu, sigma).map_err(|_| BenchError::InvalidVariation(cv))?,
                )
            }
        };
        Ok(Self {
            rate,
            distribution,
            sampler,
            rng,
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    /// Draws a raw inter-arrival delay in seconds.
    pub fn sample_secs(&mut self) -> f64 {
        let raw = match &self.sampler {
            Sampler::Exponential(exp) => exp.sample(&mut self.rng),
            Sampler::LogNormal(lognormal) => lognormal.sample(&mut self.rng),
        };
        raw.max(0.0)
    }

    /// Time to wait before the next send, given how long the previous send
    /// attempt took: `max(raw - elapsed, 0)`.
    pub fn next_delay(&mut self, elapsed: Duration) -> Duration {
        let wait = self.sample_secs() - elapsed.as_secs_f64();
        if wait > 0.0 {
            Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}
