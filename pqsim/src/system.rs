use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use simkit::{ComponentId, EndCondition, Key, QueueId, Simulation};

use crate::routing::RoutingConfig;
use crate::stats::resident_jobs;
use crate::{
    ConfigError, Dispatcher, GeneratorEvent, Job, JobGenerator, JobLimit, JobRecord,
    OccupancySample, RandomStreams, Replica, ReplicaId, ReplicaSummary, Server, ServerEvent,
    SimulationConfig, Statistics,
};

/// Keys to the values in the simulation state shared by the components of the system.
#[derive(Clone, Copy)]
pub struct SystemKeys {
    /// All replicas, indexed by [`ReplicaId`].
    pub replicas: Key<Vec<Replica>>,
    /// The statistics collector.
    pub stats: Key<Statistics>,
    /// Jobs generated but not yet routed.
    pub entry: QueueId<Job>,
    /// Server components, indexed by [`ReplicaId`].
    pub servers: Key<Vec<ComponentId<ServerEvent>>>,
}

/// Error of a simulation run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The configuration was rejected before the run started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The run was aborted by the simulation engine.
    #[error("simulation failed: {0}")]
    Simulation(#[from] simkit::Error),
}

/// Outcome of a single run.
#[derive(Serialize)]
pub struct Report {
    /// Seed of all random streams of the run.
    pub seed: u64,
    /// Routing policy used.
    pub routing: RoutingConfig,
    /// Simulation time at which the run ended.
    pub end_time: f64,
    /// Number of executed events.
    pub events_executed: usize,
    /// Number of events that were still scheduled when the run ended.
    pub events_discarded: usize,
    /// Generated jobs.
    pub generated: usize,
    /// Disposed jobs.
    pub disposed: usize,
    /// Dropped jobs.
    pub dropped: usize,
    /// Jobs left in the system at the end of the run.
    pub resident: usize,
    /// Per-replica activity.
    pub replicas: Vec<ReplicaSummary>,
    /// Collected series and records.
    pub statistics: Statistics,
}

impl Report {
    /// Records of disposed jobs in the order of completion.
    #[must_use]
    pub fn jobs(&self) -> &[JobRecord] {
        self.statistics.jobs()
    }

    /// Occupancy time series.
    #[must_use]
    pub fn occupancy(&self) -> &[OccupancySample] {
        self.statistics.occupancy()
    }

    /// Mean waiting time of disposed jobs.
    #[must_use]
    pub fn mean_wait(&self) -> Option<f64> {
        self.statistics.mean_wait()
    }

    /// Mean sojourn time of disposed jobs.
    #[must_use]
    pub fn mean_sojourn(&self) -> Option<f64> {
        self.statistics.mean_sojourn()
    }

    /// The `p`-th percentile of sojourn times, see [`Statistics::sojourn_percentile`].
    #[must_use]
    pub fn sojourn_percentile(&self, p: f64) -> Option<f64> {
        self.statistics.sojourn_percentile(p)
    }

    /// Average number of jobs in the system over the whole run.
    #[must_use]
    pub fn time_average_occupancy(&self) -> f64 {
        self.statistics.time_average_occupancy(self.end_time)
    }

    /// Disposed jobs per time unit over the whole run.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        self.statistics.throughput(self.end_time)
    }
}

/// A parallel queueing system ready to run: the simulation with all components registered and
/// the first arrival scheduled.
pub struct ParallelQueueSystem {
    simulation: Simulation,
    keys: SystemKeys,
    config: SimulationConfig,
    seed: u64,
}

impl ParallelQueueSystem {
    /// Validates `config` and builds the system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid. No event is scheduled then.
    pub fn new(config: SimulationConfig) -> Result<Self, Error> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let streams = RandomStreams::new(seed);
        let mut simulation = Simulation::default();

        let replicas: Vec<_> = (0..config.replicas)
            .map(|idx| Replica::new(ReplicaId::from(idx), config.queue_capacity))
            .collect();
        let stats = Statistics::new(
            simulation.scheduler.clock(),
            config.drop_accounting,
            config.track_replicas,
            config.record_events,
        );
        let keys = SystemKeys {
            replicas: simulation.state.insert(replicas),
            stats: simulation.state.insert(stats),
            entry: simulation.state.new_queue(),
            servers: simulation.state.insert(Vec::new()),
        };

        let servers: Vec<_> = (0..config.replicas)
            .map(|idx| {
                simulation.add_component(Server::new(ReplicaId::from(idx), keys, config.verbose))
            })
            .collect();
        *simulation.state.try_get_mut(keys.servers)? = servers;

        let dispatcher = simulation.add_component(Dispatcher::new(
            keys,
            config.routing.build(config.replicas, streams.routing()),
            config.overflow,
            streams.copies(),
            config.service_distribution().sampler()?,
            config.verbose,
        ));

        let limit = match config.job_limit {
            JobLimit::Generated => config.max_jobs,
            JobLimit::Disposed => None,
        };
        let generator = simulation.add_component(JobGenerator::new(
            streams.arrivals(),
            streams.services(),
            config.arrival_distribution().sampler()?,
            config.service_distribution().sampler()?,
            limit,
            keys,
            dispatcher,
        ));
        if config.max_jobs != Some(0) {
            simulation.schedule(0.0, generator, GeneratorEvent::Arrival)?;
        }
        log::debug!(
            "Built system of {} replicas with {} routing (seed {})",
            config.replicas,
            config.routing.policy.to_string(),
            seed
        );

        Ok(Self {
            simulation,
            keys,
            config,
            seed,
        })
    }

    /// Seed of all random streams of this system.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn end_condition(&self) -> Result<EndCondition, Error> {
        match self.config.max_time {
            Some(max_time) => Duration::try_from_secs_f64(max_time)
                .map(EndCondition::Time)
                .map_err(|_| Error::Config(ConfigError::InvalidTimeCap(max_time))),
            None => Ok(EndCondition::NoEvents),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn progress_length(&self) -> u64 {
        match (self.config.max_time, self.config.max_jobs) {
            (Some(max_time), _) => max_time.ceil() as u64,
            (None, Some(max_jobs)) => max_jobs as u64,
            (None, None) => 0,
        }
    }

    /// Runs the simulation until the stopping condition, updating `pb` along the way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Simulation`] if any component fails, which aborts the run.
    pub fn run(mut self, pb: &ProgressBar) -> Result<Report, Error> {
        let end = self.end_condition()?;
        let disposed_limit = match self.config.job_limit {
            JobLimit::Disposed => self.config.max_jobs,
            JobLimit::Generated => None,
        };
        let by_time = self.config.max_time.is_some();
        let keys = self.keys;

        pb.set_length(self.progress_length());
        pb.set_style(ProgressStyle::default_bar().template("{msg} {wide_bar} {percent}%"));
        let clock = self.simulation.scheduler.clock();
        let executed = self.simulation.run_until(end, |state| {
            let stats = match state.get(keys.stats) {
                Some(stats) => stats,
                None => return false,
            };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let position = if by_time {
                clock.time().as_secs()
            } else if disposed_limit.is_some() {
                stats.disposed() as u64
            } else {
                stats.generated() as u64
            };
            if pb.position() < position {
                pb.set_position(position);
                pb.set_message(&format!(
                    "[{time:.0}] [G={generated}] [D={disposed}] [X={dropped}]",
                    time = stats.now(),
                    generated = stats.generated(),
                    disposed = stats.disposed(),
                    dropped = stats.dropped(),
                ));
            }
            disposed_limit.map_or(false, |limit| stats.disposed() >= limit)
        })?;
        let discarded = self.simulation.scheduler.discard_pending();
        pb.finish();

        let end_time = self.simulation.time().as_secs_f64();
        let state = &mut self.simulation.state;
        let waiting = state.len(keys.entry);
        let replicas = state
            .remove(keys.replicas)
            .ok_or(simkit::Error::MissingValue("replicas"))?;
        let statistics = state
            .remove(keys.stats)
            .ok_or(simkit::Error::MissingValue("statistics"))?;
        let report = Report {
            seed: self.seed,
            routing: self.config.routing,
            end_time,
            events_executed: executed,
            events_discarded: discarded,
            generated: statistics.generated(),
            disposed: statistics.disposed(),
            dropped: statistics.dropped(),
            resident: resident_jobs(&replicas, waiting),
            replicas: replicas.iter().map(|r| r.summary(end_time)).collect(),
            statistics,
        };
        log::info!(
            "Finished at {:.3} after {} events: generated {}, disposed {}, dropped {}, resident {}",
            report.end_time,
            report.events_executed,
            report.generated,
            report.disposed,
            report.dropped,
            report.resident
        );
        Ok(report)
    }
}

/// Builds and runs a system for `config` without displaying progress.
///
/// # Errors
///
/// See [`ParallelQueueSystem::new`] and [`ParallelQueueSystem::run`].
pub fn run_sim(config: &SimulationConfig) -> Result<Report, Error> {
    ParallelQueueSystem::new(config.clone())?.run(&ProgressBar::hidden())
}
