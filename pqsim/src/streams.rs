use rand::distributions::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

const ARRIVAL_STREAM: u64 = 0;
const SERVICE_STREAM: u64 = 1;
const ROUTING_STREAM: u64 = 2;
const COPY_STREAM: u64 = 3;

/// Independent random number generators derived from a single seed.
///
/// Each concern draws from its own ChaCha stream, so that, e.g., changing the routing policy does
/// not change the sequence of arrival times or service times.
#[derive(Debug, Clone)]
pub struct RandomStreams {
    seed: u64,
}

impl RandomStreams {
    /// Creates a stream provider for the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// The seed all streams are derived from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn stream(&self, stream: u64) -> ChaChaRng {
        let mut rng = ChaChaRng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        rng
    }

    /// Generator for interarrival gaps.
    #[must_use]
    pub fn arrivals(&self) -> ChaChaRng {
        self.stream(ARRIVAL_STREAM)
    }

    /// Generator for service durations.
    #[must_use]
    pub fn services(&self) -> ChaChaRng {
        self.stream(SERVICE_STREAM)
    }

    /// Generator for routing decisions.
    #[must_use]
    pub fn routing(&self) -> ChaChaRng {
        self.stream(ROUTING_STREAM)
    }

    /// Generator for service durations of redundant copies.
    #[must_use]
    pub fn copies(&self) -> ChaChaRng {
        self.stream(COPY_STREAM)
    }
}

/// Distribution of a time interval, such as an interarrival gap or a service duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeDistribution {
    /// Exponential distribution with the given rate (events per time unit).
    Exponential {
        /// Rate parameter; the mean is `1 / rate`.
        rate: f64,
    },
    /// Always the same value.
    Deterministic {
        /// The constant value.
        value: f64,
    },
    /// Uniform distribution over the closed interval `[low, high]`.
    Uniform {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
    /// Erlang distribution: sum of `shape` exponential phases with the given rate each.
    Erlang {
        /// Number of phases.
        shape: u32,
        /// Rate of each phase.
        rate: f64,
    },
    /// Log-normal distribution.
    LogNormal {
        /// Mean of the underlying normal distribution.
        mu: f64,
        /// Standard deviation of the underlying normal distribution.
        sigma: f64,
    },
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidDistribution {
            parameter: name,
            value,
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidDistribution {
            parameter: name,
            value,
        })
    }
}

impl TimeDistribution {
    /// Exponential distribution with the given rate.
    #[must_use]
    pub fn exponential(rate: f64) -> Self {
        Self::Exponential { rate }
    }

    /// Validates the parameters and constructs a sampler.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDistribution`] for non-finite, negative, or (where they must
    /// be positive) zero parameters.
    pub fn sampler(&self) -> Result<TimeSampler, ConfigError> {
        let inner = match *self {
            Self::Exponential { rate } => {
                SamplerInner::Exponential(Exp::new(positive("rate", rate)?).map_err(|_| {
                    ConfigError::InvalidDistribution {
                        parameter: "rate",
                        value: rate,
                    }
                })?)
            }
            Self::Deterministic { value } => {
                SamplerInner::Deterministic(non_negative("value", value)?)
            }
            Self::Uniform { low, high } => {
                let low = non_negative("low", low)?;
                let high = non_negative("high", high)?;
                if high < low {
                    return Err(ConfigError::InvalidDistribution {
                        parameter: "high",
                        value: high,
                    });
                }
                SamplerInner::Uniform(Uniform::new_inclusive(low, high))
            }
            Self::Erlang { shape, rate } => {
                if shape == 0 {
                    return Err(ConfigError::InvalidDistribution {
                        parameter: "shape",
                        value: 0.0,
                    });
                }
                let scale = 1.0 / positive("rate", rate)?;
                SamplerInner::Erlang(Gamma::new(f64::from(shape), scale).map_err(|_| {
                    ConfigError::InvalidDistribution {
                        parameter: "rate",
                        value: rate,
                    }
                })?)
            }
            Self::LogNormal { mu, sigma } => {
                if !mu.is_finite() {
                    return Err(ConfigError::InvalidDistribution {
                        parameter: "mu",
                        value: mu,
                    });
                }
                let sigma = non_negative("sigma", sigma)?;
                SamplerInner::LogNormal(LogNormal::new(mu, sigma).map_err(|_| {
                    ConfigError::InvalidDistribution {
                        parameter: "sigma",
                        value: sigma,
                    }
                })?)
            }
        };
        Ok(TimeSampler { inner })
    }

    /// Expected value of the distribution.
    #[must_use]
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Exponential { rate } => 1.0 / rate,
            Self::Deterministic { value } => value,
            Self::Uniform { low, high } => (low + high) / 2.0,
            Self::Erlang { shape, rate } => f64::from(shape) / rate,
            Self::LogNormal { mu, sigma } => (mu + sigma * sigma / 2.0).exp(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SamplerInner {
    Exponential(Exp<f64>),
    Deterministic(f64),
    Uniform(Uniform<f64>),
    Erlang(Gamma<f64>),
    LogNormal(LogNormal<f64>),
}

/// Validated [`TimeDistribution`] ready to draw samples. Samples are never negative.
#[derive(Debug, Clone, Copy)]
pub struct TimeSampler {
    inner: SamplerInner,
}

impl Distribution<f64> for TimeSampler {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let value = match &self.inner {
            SamplerInner::Exponential(d) => d.sample(rng),
            SamplerInner::Deterministic(v) => *v,
            SamplerInner::Uniform(d) => d.sample(rng),
            SamplerInner::Erlang(d) => d.sample(rng),
            SamplerInner::LogNormal(d) => d.sample(rng),
        };
        value.max(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rand::RngCore;
    use rstest::rstest;

    #[test]
    fn test_streams_are_reproducible_and_independent() {
        let streams = RandomStreams::new(42);
        assert_eq!(streams.seed(), 42);
        assert_eq!(streams.arrivals().next_u64(), streams.arrivals().next_u64());
        assert_ne!(streams.arrivals().next_u64(), streams.services().next_u64());
        assert_ne!(streams.routing().next_u64(), streams.copies().next_u64());
        assert_ne!(
            RandomStreams::new(1).arrivals().next_u64(),
            RandomStreams::new(2).arrivals().next_u64()
        );
    }

    #[rstest(
        dist,
        case(TimeDistribution::exponential(2.0)),
        case(TimeDistribution::Deterministic { value: 0.7 }),
        case(TimeDistribution::Uniform { low: 1.0, high: 3.0 }),
        case(TimeDistribution::Erlang { shape: 3, rate: 2.0 }),
        case(TimeDistribution::LogNormal { mu: 0.0, sigma: 0.5 })
    )]
    fn test_sample_mean(dist: TimeDistribution) {
        let sampler = dist.sampler().unwrap();
        let mut rng = RandomStreams::new(17).services();
        let n = 200_000;
        let mean = (0..n).map(|_| sampler.sample(&mut rng)).sum::<f64>() / f64::from(n);
        assert!(
            approx_eq!(f64, mean, dist.mean(), epsilon = 0.02 * dist.mean()),
            "sample mean {} differs from {}",
            mean,
            dist.mean()
        );
    }

    #[rstest(
        dist,
        case(TimeDistribution::exponential(0.0)),
        case(TimeDistribution::exponential(-1.0)),
        case(TimeDistribution::exponential(f64::NAN)),
        case(TimeDistribution::Deterministic { value: -0.1 }),
        case(TimeDistribution::Uniform { low: 2.0, high: 1.0 }),
        case(TimeDistribution::Erlang { shape: 0, rate: 1.0 }),
        case(TimeDistribution::LogNormal { mu: 0.0, sigma: -1.0 })
    )]
    fn test_invalid_parameters(dist: TimeDistribution) {
        assert!(matches!(
            dist.sampler(),
            Err(ConfigError::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn test_deserialize() {
        let dist: TimeDistribution =
            serde_json::from_str(r#"{"kind": "erlang", "shape": 2, "rate": 4.0}"#).unwrap();
        assert_eq!(dist, TimeDistribution::Erlang { shape: 2, rate: 4.0 });
        let dist: TimeDistribution =
            serde_json::from_str(r#"{"kind": "log_normal", "mu": 1.0, "sigma": 0.1}"#).unwrap();
        assert_eq!(dist, TimeDistribution::LogNormal { mu: 1.0, sigma: 0.1 });
    }
}
