//! Parallel queueing network simulation.
//!
//! Jobs arrive at a dispatcher, which asks a routing policy to pick one (or, with redundancy,
//! several) of `N` replicas. Each replica is a FIFO wait queue with a single service slot.
//! The whole system runs on top of the [`simkit`] discrete-event engine: the job generator,
//! the dispatcher, and every replica's server are components exchanging events.
//!
//! ```
//! # use pqsim::{run_sim, SimulationConfig, routing::PolicyKind};
//! let config = SimulationConfig {
//!     replicas: 3,
//!     seed: Some(7),
//!     max_time: Some(50.0),
//!     routing: pqsim::routing::RoutingConfig {
//!         policy: PolicyKind::ShortestQueue,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! let report = run_sim(&config)?;
//! assert_eq!(report.seed, 7);
//! assert_eq!(
//!     report.generated,
//!     report.disposed + report.dropped + report.resident
//! );
//! # Ok::<(), pqsim::Error>(())
//! ```

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_precision_loss
)]

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

mod config;
pub use config::{ConfigError, DropAccounting, JobLimit, OverflowPolicy, SimulationConfig};

mod dispatcher;
pub use dispatcher::{Dispatcher, Event as DispatcherEvent};

mod generator;
pub use generator::{Event as GeneratorEvent, JobGenerator};

mod replica;
pub use replica::{Replica, ReplicaSummary, ServiceStart};

pub mod routing;

mod server;
pub use server::{Event as ServerEvent, Server};

mod stats;
pub use stats::{
    DroppedJob, EventKind, EventRecord, JobRecord, OccupancySample, ReplicaOccupancy, Statistics,
};

mod streams;
pub use streams::{RandomStreams, TimeDistribution, TimeSampler};

mod system;
pub use system::{run_sim, Error, ParallelQueueSystem, Report, SystemKeys};

/// Job ID.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct JobId(usize);

/// Replica ID: the index of the replica in `[0, N)`.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct ReplicaId(usize);

/// A unit of work travelling through the system.
///
/// With redundant routing, each replica holds its own copy of the job. All copies share the ID,
/// the arrival time, and the list of replicas the copies were sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    arrival: f64,
    service_time: f64,
    replica: Option<ReplicaId>,
    service_start: Option<f64>,
    copies: Vec<ReplicaId>,
}

impl Job {
    /// Creates a new job arriving at `arrival` that will require `service_time` at a server.
    #[must_use]
    pub fn new(id: JobId, arrival: f64, service_time: f64) -> Self {
        Self {
            id,
            arrival,
            service_time,
            replica: None,
            service_start: None,
            copies: Vec::new(),
        }
    }

    /// The ID of the job, unique throughout the entire simulation.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The time of arrival to the system.
    #[must_use]
    pub fn arrival(&self) -> f64 {
        self.arrival
    }

    /// How long the job occupies the service slot once started.
    #[must_use]
    pub fn service_time(&self) -> f64 {
        self.service_time
    }

    /// The replica this copy was admitted to, if routed already.
    #[must_use]
    pub fn replica(&self) -> Option<ReplicaId> {
        self.replica
    }

    /// The time the job entered the service slot, if it did.
    #[must_use]
    pub fn service_start(&self) -> Option<f64> {
        self.service_start
    }

    /// All replicas holding a copy of this job.
    #[must_use]
    pub fn copies(&self) -> &[ReplicaId] {
        &self.copies
    }

    /// Returns a copy of the job assigned to `replica`, with its own service time.
    pub(crate) fn copy_for(&self, replica: ReplicaId, service_time: f64) -> Self {
        Self {
            replica: Some(replica),
            service_time,
            ..self.clone()
        }
    }

    pub(crate) fn set_copies(&mut self, copies: Vec<ReplicaId>) {
        self.copies = copies;
    }

    pub(crate) fn start_service(&mut self, time: f64) {
        debug_assert!(time >= self.arrival, "service cannot start before arrival");
        self.service_start = Some(time);
    }

    /// Name used in the per-event trace.
    pub(crate) fn name(&self) -> String {
        match self.replica {
            Some(replica) => copy_name(self.id, replica),
            None => format!("Job{:02}", self.id.0),
        }
    }
}

/// Name of the copy of a job held by a replica, used in the per-event trace.
pub(crate) fn copy_name(id: JobId, replica: ReplicaId) -> String {
    format!("Job{:02}@{}", id.0, replica)
}

/// Logs a per-event trace line: at `info` level when `verbose`, otherwise at `trace` level.
pub(crate) fn log_event(verbose: bool, args: std::fmt::Arguments<'_>) {
    if verbose {
        log::info!("{}", args);
    } else {
        log::trace!("{}", args);
    }
}
