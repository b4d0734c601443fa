use serde::{Deserialize, Serialize};

use crate::routing::{PolicyKind, RoutingConfig};
use crate::TimeDistribution;

/// What the job cap `max_jobs` counts.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLimit {
    /// Stop generating after `max_jobs` arrivals and let the system drain.
    Generated,
    /// End the run as soon as `max_jobs` jobs have been disposed.
    Disposed,
}

impl Default for JobLimit {
    fn default() -> Self {
        Self::Generated
    }
}

/// What happens to a job routed to a replica whose queue is full.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Full replicas are not eligible for routing. The job is dropped only if all are full.
    Avoid,
    /// The chosen replica rejects the job, which is dropped.
    Drop,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Avoid
    }
}

/// How dropped jobs are accounted for.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropAccounting {
    /// Dropped jobs are only counted as dropped.
    Separate,
    /// Dropped jobs also count as disposed.
    Disposed,
}

impl Default for DropAccounting {
    fn default() -> Self {
        Self::Separate
    }
}

/// Invalid simulation configuration. Reported before any event is scheduled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Arrival or service rate is not a positive finite number.
    #[error("{name} must be positive and finite, but is {value}")]
    InvalidRate {
        /// Name of the rate.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A time distribution has an invalid parameter.
    #[error("invalid distribution parameter {parameter}: {value}")]
    InvalidDistribution {
        /// Name of the parameter.
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The system must have at least one replica.
    #[error("at least one replica is required")]
    NoReplicas,
    /// The routing policy needs a parameter that was not given.
    #[error("routing policy {policy} requires parameter {parameter}")]
    MissingParameter {
        /// Routing policy.
        policy: String,
        /// Missing parameter.
        parameter: &'static str,
    },
    /// Number of sampled replicas out of range.
    #[error("d must be between 1 and the number of replicas ({replicas}), but is {d}")]
    InvalidSampleSize {
        /// Requested sample size.
        d: usize,
        /// Number of replicas.
        replicas: usize,
    },
    /// Time cap is negative or not finite.
    #[error("time cap must be a non-negative finite number, but is {0}")]
    InvalidTimeCap(f64),
    /// Neither a time cap nor a job cap is given, so the run would never end.
    #[error("no stopping condition: set max_time or max_jobs")]
    Unbounded,
    /// Queue capacity of zero.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
}

/// Configuration of a single simulation run.
///
/// All fields have defaults, so a configuration file only needs to list what differs.
///
/// ```
/// # use pqsim::SimulationConfig;
/// let config: SimulationConfig = serde_json::from_str(
///     r#"{"replicas": 4, "routing": {"policy": "power_of_d", "d": 2}, "max_jobs": 100}"#,
/// ).unwrap();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Rate of the default exponential interarrival distribution.
    pub arrival_rate: f64,
    /// Rate of the default exponential service distribution.
    pub service_rate: f64,
    /// Interarrival distribution overriding `arrival_rate`.
    pub arrival: Option<TimeDistribution>,
    /// Service time distribution overriding `service_rate`.
    pub service: Option<TimeDistribution>,
    /// Number of replicas.
    pub replicas: usize,
    /// Routing policy.
    pub routing: RoutingConfig,
    /// Random seed. If missing, one is drawn and reported.
    pub seed: Option<u64>,
    /// Events scheduled at or after this time are not executed.
    pub max_time: Option<f64>,
    /// Job cap, see `job_limit`.
    pub max_jobs: Option<usize>,
    /// What `max_jobs` counts.
    pub job_limit: JobLimit,
    /// Maximum number of jobs waiting in each replica's queue, not counting the one in service.
    pub queue_capacity: Option<usize>,
    /// What to do with jobs routed to full replicas.
    pub overflow: OverflowPolicy,
    /// Whether dropped jobs count as disposed.
    pub drop_accounting: DropAccounting,
    /// Record per-replica resident counts with each occupancy sample.
    pub track_replicas: bool,
    /// Record the full event trace.
    pub record_events: bool,
    /// Log every arrival, service start, completion, and cancellation at the info level.
    pub verbose: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arrival_rate: 0.5,
            service_rate: 1.0,
            arrival: None,
            service: None,
            replicas: 1,
            routing: RoutingConfig::default(),
            seed: None,
            max_time: Some(100.0),
            max_jobs: None,
            job_limit: JobLimit::default(),
            queue_capacity: None,
            overflow: OverflowPolicy::default(),
            drop_accounting: DropAccounting::default(),
            track_replicas: false,
            record_events: false,
            verbose: false,
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { name, value })
    }
}

impl SimulationConfig {
    /// Interarrival distribution: `arrival` if given, exponential with `arrival_rate` otherwise.
    #[must_use]
    pub fn arrival_distribution(&self) -> TimeDistribution {
        self.arrival
            .unwrap_or_else(|| TimeDistribution::exponential(self.arrival_rate))
    }

    /// Service time distribution: `service` if given, exponential with `service_rate` otherwise.
    #[must_use]
    pub fn service_distribution(&self) -> TimeDistribution {
        self.service
            .unwrap_or_else(|| TimeDistribution::exponential(self.service_rate))
    }

    /// Checks the configuration for errors.
    ///
    /// # Errors
    ///
    /// Returns the first problem found. See [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arrival.is_none() {
            check_rate("arrival_rate", self.arrival_rate)?;
        }
        if self.service.is_none() {
            check_rate("service_rate", self.service_rate)?;
        }
        self.arrival_distribution().sampler()?;
        self.service_distribution().sampler()?;
        if self.replicas == 0 {
            return Err(ConfigError::NoReplicas);
        }
        self.validate_routing()?;
        if let Some(max_time) = self.max_time {
            if !max_time.is_finite() || max_time < 0.0 {
                return Err(ConfigError::InvalidTimeCap(max_time));
            }
        }
        if self.max_time.is_none() && self.max_jobs.is_none() {
            return Err(ConfigError::Unbounded);
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    fn validate_routing(&self) -> Result<(), ConfigError> {
        match self.routing.policy {
            PolicyKind::PowerOfD | PolicyKind::Redundancy => {
                let d = self.routing.d.ok_or_else(|| ConfigError::MissingParameter {
                    policy: self.routing.policy.to_string(),
                    parameter: "d",
                })?;
                if d == 0 || d > self.replicas {
                    return Err(ConfigError::InvalidSampleSize {
                        d,
                        replicas: self.replicas,
                    });
                }
                Ok(())
            }
            PolicyKind::Random | PolicyKind::RoundRobin | PolicyKind::ShortestQueue => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn config() -> SimulationConfig {
        SimulationConfig {
            replicas: 3,
            ..SimulationConfig::default()
        }
    }

    fn routing(policy: PolicyKind, d: Option<usize>) -> RoutingConfig {
        RoutingConfig {
            policy,
            d,
            ..RoutingConfig::default()
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
        assert_eq!(
            SimulationConfig::default().arrival_distribution(),
            TimeDistribution::exponential(0.5)
        );
    }

    #[rstest(
        modified,
        expected,
        case(SimulationConfig { arrival_rate: 0.0, ..config() }, ConfigError::InvalidRate { name: "arrival_rate", value: 0.0 }),
        case(SimulationConfig { service_rate: -1.0, ..config() }, ConfigError::InvalidRate { name: "service_rate", value: -1.0 }),
        case(SimulationConfig { replicas: 0, ..config() }, ConfigError::NoReplicas),
        case(SimulationConfig { max_time: Some(-1.0), ..config() }, ConfigError::InvalidTimeCap(-1.0)),
        case(SimulationConfig { max_time: None, ..config() }, ConfigError::Unbounded),
        case(SimulationConfig { queue_capacity: Some(0), ..config() }, ConfigError::ZeroCapacity),
        case(
            SimulationConfig { routing: routing(PolicyKind::PowerOfD, Some(4)), ..config() },
            ConfigError::InvalidSampleSize { d: 4, replicas: 3 }
        ),
        case(
            SimulationConfig { routing: routing(PolicyKind::Redundancy, Some(0)), ..config() },
            ConfigError::InvalidSampleSize { d: 0, replicas: 3 }
        ),
        case(
            SimulationConfig { routing: routing(PolicyKind::PowerOfD, None), ..config() },
            ConfigError::MissingParameter { policy: String::from("power_of_d"), parameter: "d" }
        ),
        case(
            SimulationConfig { service: Some(TimeDistribution::Uniform { low: 2.0, high: 1.0 }), ..config() },
            ConfigError::InvalidDistribution { parameter: "high", value: 1.0 }
        )
    )]
    fn test_invalid(modified: SimulationConfig, expected: ConfigError) {
        assert_eq!(modified.validate(), Err(expected));
    }

    #[test]
    fn test_explicit_distribution_ignores_rate() {
        let config = SimulationConfig {
            arrival_rate: 0.0,
            arrival: Some(TimeDistribution::Deterministic { value: 1.0 }),
            ..config()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<SimulationConfig>(r#"{"replica": 3}"#).is_err());
    }

    #[test]
    fn test_deserialize() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{
                "replicas": 5,
                "routing": {"policy": "redundancy", "d": 2, "threshold": 1},
                "service": {"kind": "deterministic", "value": 0.5},
                "max_time": null,
                "max_jobs": 10,
                "job_limit": "disposed",
                "queue_capacity": 3,
                "overflow": "drop",
                "drop_accounting": "disposed"
            }"#,
        )
        .unwrap();
        assert_eq!(config.replicas, 5);
        assert_eq!(config.routing.policy, PolicyKind::Redundancy);
        assert_eq!(config.routing.threshold, Some(1));
        assert_eq!(config.max_time, None);
        assert_eq!(config.job_limit, JobLimit::Disposed);
        assert_eq!(config.overflow, OverflowPolicy::Drop);
        assert_eq!(config.drop_accounting, DropAccounting::Disposed);
        assert_eq!(config.arrival_rate, 0.5);
        assert_eq!(config.validate(), Ok(()));
    }
}
