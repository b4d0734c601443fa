use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use simkit::{ClockRef, State};

use crate::{DropAccounting, Job, JobId, Replica, ReplicaId, SystemKeys};

/// Finalized record of a disposed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job ID.
    pub id: JobId,
    /// Time of arrival.
    pub arrival: f64,
    /// Time the completed copy entered service.
    pub service_start: f64,
    /// Time of completion.
    pub completion: f64,
    /// Service time of the completed copy, as elapsed on the simulation clock.
    /// Equals `completion - service_start`. It can differ from the sampled service
    /// time by the clock resolution of one nanosecond.
    pub service_time: f64,
    /// Replica that completed the job.
    pub replica: ReplicaId,
    /// Number of copies issued.
    pub copies: usize,
}

impl JobRecord {
    pub(crate) fn completed(job: &Job, replica: ReplicaId, completion: f64) -> Self {
        let service_start = job.service_start().unwrap_or(completion);
        Self {
            id: job.id(),
            arrival: job.arrival(),
            service_start,
            completion,
            service_time: completion - service_start,
            replica,
            copies: job.copies().len().max(1),
        }
    }

    /// Time spent in the queue.
    #[must_use]
    pub fn waiting(&self) -> f64 {
        self.service_start - self.arrival
    }

    /// Time spent in the system.
    #[must_use]
    pub fn sojourn(&self) -> f64 {
        self.completion - self.arrival
    }
}

/// A job that was never admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedJob {
    /// Job ID.
    pub id: JobId,
    /// Time of arrival.
    pub arrival: f64,
    /// The replica that rejected the job, if any was chosen.
    pub replica: Option<ReplicaId>,
}

/// Number of jobs in the system at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancySample {
    /// Time of the sample.
    pub time: f64,
    /// Jobs generated but neither disposed nor dropped.
    pub resident: usize,
}

/// Number of jobs at each replica at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaOccupancy {
    /// Time of the sample.
    pub time: f64,
    /// Resident jobs, indexed by replica.
    pub resident: Vec<usize>,
}

/// Type of traced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Job arrived.
    Arrival,
    /// Job (or its copy) entered service.
    ServiceStart,
    /// Job completed and left the system.
    Completion,
    /// A redundant copy was cancelled.
    Cancellation,
    /// Job was dropped.
    Drop,
}

/// A single entry of the event trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Time of the event.
    pub time: f64,
    /// Type of the event.
    pub kind: EventKind,
    /// Job concerned.
    pub job: JobId,
    /// Replica concerned, if any.
    pub replica: Option<ReplicaId>,
}

/// Passive collector of run statistics, stored in the simulation state.
#[derive(Serialize)]
pub struct Statistics {
    generated: usize,
    disposed: usize,
    dropped: usize,
    occupancy: Vec<OccupancySample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replica_occupancy: Option<Vec<ReplicaOccupancy>>,
    jobs: Vec<JobRecord>,
    dropped_jobs: Vec<DroppedJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<EventRecord>>,
    #[serde(skip_serializing)]
    drop_accounting: DropAccounting,
    #[serde(skip_serializing)]
    clock: ClockRef,
}

impl Statistics {
    /// Constructs an empty collector. `clock` is the reference to the simulation clock.
    #[must_use]
    pub fn new(
        clock: ClockRef,
        drop_accounting: DropAccounting,
        track_replicas: bool,
        record_events: bool,
    ) -> Self {
        Self {
            generated: 0,
            disposed: 0,
            dropped: 0,
            occupancy: Vec::new(),
            replica_occupancy: if track_replicas { Some(Vec::new()) } else { None },
            jobs: Vec::new(),
            dropped_jobs: Vec::new(),
            events: if record_events { Some(Vec::new()) } else { None },
            drop_accounting,
            clock,
        }
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.clock.time().as_secs_f64()
    }

    pub(crate) fn record(&mut self, kind: EventKind, job: JobId, replica: Option<ReplicaId>) {
        let time = self.now();
        if let Some(events) = &mut self.events {
            events.push(EventRecord {
                time,
                kind,
                job,
                replica,
            });
        }
    }

    /// Registers a newly generated job.
    pub fn arrive(&mut self, job: &Job) {
        self.generated += 1;
        self.record(EventKind::Arrival, job.id(), None);
    }

    /// Registers a job leaving the system after completion.
    pub fn dispose(&mut self, record: JobRecord) {
        self.disposed += 1;
        self.record(EventKind::Completion, record.id, Some(record.replica));
        self.jobs.push(record);
    }

    /// Registers a dropped job.
    pub fn drop_job(&mut self, dropped: DroppedJob) {
        self.dropped += 1;
        if self.drop_accounting == DropAccounting::Disposed {
            self.disposed += 1;
        }
        self.record(EventKind::Drop, dropped.id, dropped.replica);
        self.dropped_jobs.push(dropped);
    }

    /// Appends an occupancy sample at the current time.
    pub fn sample(&mut self, resident: usize, per_replica: Option<Vec<usize>>) {
        let time = self.now();
        debug_assert!(
            self.occupancy.last().map_or(true, |s| s.time <= time),
            "occupancy samples must be ordered by time"
        );
        self.occupancy.push(OccupancySample { time, resident });
        if let (Some(series), Some(resident)) = (&mut self.replica_occupancy, per_replica) {
            series.push(ReplicaOccupancy { time, resident });
        }
    }

    /// Whether per-replica occupancy is recorded.
    #[must_use]
    pub fn tracks_replicas(&self) -> bool {
        self.replica_occupancy.is_some()
    }

    /// Number of generated jobs.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// Number of disposed jobs. Includes dropped jobs if they are accounted as disposed.
    #[must_use]
    pub fn disposed(&self) -> usize {
        self.disposed
    }

    /// Number of dropped jobs.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Jobs that are generated but neither disposed nor dropped, according to the counters.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        match self.drop_accounting {
            DropAccounting::Separate => self.generated - self.disposed - self.dropped,
            DropAccounting::Disposed => self.generated - self.disposed,
        }
    }

    /// Occupancy time series.
    #[must_use]
    pub fn occupancy(&self) -> &[OccupancySample] {
        &self.occupancy
    }

    /// Per-replica occupancy time series, if tracked.
    #[must_use]
    pub fn replica_occupancy(&self) -> Option<&[ReplicaOccupancy]> {
        self.replica_occupancy.as_deref()
    }

    /// Records of disposed jobs in the order of completion.
    #[must_use]
    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    /// Dropped jobs in the order of arrival.
    #[must_use]
    pub fn dropped_jobs(&self) -> &[DroppedJob] {
        &self.dropped_jobs
    }

    /// Event trace, if recorded.
    #[must_use]
    pub fn events(&self) -> Option<&[EventRecord]> {
        self.events.as_deref()
    }

    /// Mean time spent waiting in a queue by completed jobs.
    #[must_use]
    pub fn mean_wait(&self) -> Option<f64> {
        mean(self.jobs.iter().map(JobRecord::waiting))
    }

    /// Mean time spent in the system by completed jobs.
    #[must_use]
    pub fn mean_sojourn(&self) -> Option<f64> {
        mean(self.jobs.iter().map(JobRecord::sojourn))
    }

    /// The `p`-th percentile (`p` in `[0, 1]`) of sojourn times of completed jobs, using the
    /// nearest-rank method.
    #[must_use]
    pub fn sojourn_percentile(&self, p: f64) -> Option<f64> {
        if self.jobs.is_empty() || !(0.0..=1.0).contains(&p) {
            return None;
        }
        let sorted = self
            .jobs
            .iter()
            .map(|j| OrderedFloat(j.sojourn()))
            .sorted()
            .collect_vec();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rank = (p * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1)].into_inner())
    }

    /// Average number of jobs in the system over `[0, until]`.
    #[must_use]
    pub fn time_average_occupancy(&self, until: f64) -> f64 {
        if until <= 0.0 {
            return 0.0;
        }
        let area: f64 = self
            .occupancy
            .iter()
            .zip(self.occupancy.iter().skip(1).map(|s| s.time).chain(Some(until)))
            .map(|(sample, next)| sample.resident as f64 * (next.min(until) - sample.time).max(0.0))
            .sum();
        area / until
    }

    /// Completed jobs per time unit over `[0, until]`.
    #[must_use]
    pub fn throughput(&self, until: f64) -> f64 {
        if until > 0.0 {
            self.jobs.len() as f64 / until
        } else {
            0.0
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Number of distinct jobs in the system: resident at any replica or waiting to be dispatched.
/// A job with several redundant copies counts once.
pub(crate) fn resident_jobs(replicas: &[Replica], waiting: usize) -> usize {
    replicas
        .iter()
        .flat_map(Replica::jobs)
        .map(Job::id)
        .unique()
        .count()
        + waiting
}

/// Samples the current occupancy from the replicas in the state.
pub(crate) fn sample_occupancy(state: &mut State, keys: &SystemKeys) -> simkit::Result<()> {
    let tracks_replicas = state.try_get(keys.stats)?.tracks_replicas();
    let waiting = state.len(keys.entry);
    let replicas = state.try_get(keys.replicas)?;
    let resident = resident_jobs(replicas, waiting);
    let per_replica = if tracks_replicas {
        Some(replicas.iter().map(Replica::resident).collect_vec())
    } else {
        None
    };
    state.try_get_mut(keys.stats)?.sample(resident, per_replica);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rstest::{fixture, rstest};
    use simkit::Simulation;

    struct Collector {
        sim: Simulation,
        stats: Statistics,
    }

    #[fixture]
    fn collector() -> Collector {
        let sim = Simulation::default();
        let stats = Statistics::new(sim.scheduler.clock(), DropAccounting::Separate, true, true);
        Collector { sim, stats }
    }

    fn record(id: usize, arrival: f64, service_start: f64, completion: f64) -> JobRecord {
        JobRecord {
            id: JobId::from(id),
            arrival,
            service_start,
            completion,
            service_time: completion - service_start,
            replica: ReplicaId::from(0),
            copies: 1,
        }
    }

    #[rstest]
    fn test_counters(mut collector: Collector) {
        let stats = &mut collector.stats;
        for id in 0..4 {
            stats.arrive(&Job::new(JobId::from(id), 0.0, 1.0));
        }
        stats.dispose(record(0, 0.0, 0.0, 1.0));
        stats.drop_job(DroppedJob {
            id: JobId::from(1),
            arrival: 0.0,
            replica: None,
        });
        assert_eq!(stats.generated(), 4);
        assert_eq!(stats.disposed(), 1);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.outstanding(), 2);
        let kinds = stats.events().unwrap().iter().map(|e| e.kind).collect_vec();
        assert_eq!(
            kinds,
            vec![
                EventKind::Arrival,
                EventKind::Arrival,
                EventKind::Arrival,
                EventKind::Arrival,
                EventKind::Completion,
                EventKind::Drop
            ]
        );
    }

    #[rstest]
    fn test_drops_accounted_as_disposed(collector: Collector) {
        let mut stats = Statistics::new(
            collector.sim.scheduler.clock(),
            DropAccounting::Disposed,
            false,
            false,
        );
        stats.arrive(&Job::new(JobId::from(0), 0.0, 1.0));
        stats.drop_job(DroppedJob {
            id: JobId::from(0),
            arrival: 0.0,
            replica: Some(ReplicaId::from(2)),
        });
        assert_eq!(stats.disposed(), 1);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.outstanding(), 0);
        assert!(stats.events().is_none());
        assert!(!stats.tracks_replicas());
    }

    #[rstest]
    fn test_summaries(mut collector: Collector) {
        let stats = &mut collector.stats;
        assert_eq!(stats.mean_sojourn(), None);
        assert_eq!(stats.sojourn_percentile(0.5), None);
        stats.dispose(record(0, 0.0, 0.0, 1.0));
        stats.dispose(record(1, 0.5, 1.0, 3.0));
        stats.dispose(record(2, 1.0, 3.0, 5.0));
        assert!(approx_eq!(f64, stats.mean_wait().unwrap(), 2.5 / 3.0));
        assert!(approx_eq!(f64, stats.mean_sojourn().unwrap(), 7.5 / 3.0));
        assert!(approx_eq!(f64, stats.sojourn_percentile(0.5).unwrap(), 2.5));
        assert!(approx_eq!(f64, stats.sojourn_percentile(1.0).unwrap(), 4.0));
        assert!(approx_eq!(f64, stats.sojourn_percentile(0.0).unwrap(), 1.0));
        assert!(approx_eq!(f64, stats.throughput(6.0), 0.5));
    }

    #[test]
    fn test_time_average_occupancy() {
        use simkit::{Component, ComponentId, EndCondition, Key, Scheduler};

        // Samples 1 at t=0, 3 at t=1, 0 at t=3.
        struct Sampler {
            stats: Key<Statistics>,
        }
        impl Component for Sampler {
            type Event = usize;
            fn process_event(
                &mut self,
                _: ComponentId<usize>,
                resident: &usize,
                _: &mut Scheduler,
                state: &mut State,
            ) -> simkit::Result<()> {
                state.try_get_mut(self.stats)?.sample(*resident, None);
                Ok(())
            }
        }

        let mut sim = Simulation::default();
        let stats = Statistics::new(sim.scheduler.clock(), DropAccounting::Separate, false, false);
        let stats = sim.state.insert(stats);
        let sampler = sim.add_component(Sampler { stats });
        sim.schedule(0.0, sampler, 1).unwrap();
        sim.schedule(1.0, sampler, 3).unwrap();
        sim.schedule(3.0, sampler, 0).unwrap();
        sim.run(EndCondition::NoEvents).unwrap();
        let stats = sim.state.get(stats).unwrap();
        let times = stats.occupancy().iter().map(|s| s.time).collect_vec();
        assert_eq!(times, vec![0.0, 1.0, 3.0]);
        assert!(approx_eq!(f64, stats.time_average_occupancy(4.0), 7.0 / 4.0));
        assert!(approx_eq!(f64, stats.time_average_occupancy(2.0), 4.0 / 2.0));
        assert!(approx_eq!(f64, stats.time_average_occupancy(0.0), 0.0));
    }

    #[test]
    fn test_resident_jobs_counts_copies_once() {
        let mut replicas = vec![
            Replica::new(ReplicaId::from(0), None),
            Replica::new(ReplicaId::from(1), None),
        ];
        let job = Job::new(JobId::from(0), 0.0, 1.0);
        for replica in &mut replicas {
            let copy = job.copy_for(replica.id(), 1.0);
            replica.admit(copy, 0.0).unwrap();
        }
        replicas[1]
            .admit(Job::new(JobId::from(1), 0.0, 1.0), 0.0)
            .unwrap();
        assert_eq!(resident_jobs(&replicas, 0), 2);
        assert_eq!(resident_jobs(&replicas, 3), 5);
    }
}
