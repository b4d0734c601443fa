use simkit::{Component, ComponentId, Scheduler, State};

use crate::stats::sample_occupancy;
use crate::{copy_name, log_event, EventKind, JobId, JobRecord, ReplicaId, ServiceStart, SystemKeys};

/// Events handled by a replica's server.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// The service of a job ends. If the job was cancelled in the meantime (because another copy
    /// finished first), the event is stale and ignored.
    ServiceFinished {
        /// The job whose service ends.
        job: JobId,
    },
}

/// Drives the service slot of a single replica.
///
/// When a job finishes, the server disposes it, cancels all its redundant copies at other
/// replicas, and starts the next waiting job at every replica whose slot became free.
pub struct Server {
    replica: ReplicaId,
    keys: SystemKeys,
    verbose: bool,
}

impl Server {
    /// Constructs a server of `replica`, operating on the replicas and statistics in `keys`.
    #[must_use]
    pub fn new(replica: ReplicaId, keys: SystemKeys, verbose: bool) -> Self {
        Self {
            replica,
            keys,
            verbose,
        }
    }

    fn finish(
        &mut self,
        job_id: JobId,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simkit::Result<()> {
        let now = scheduler.time().as_secs_f64();
        let replicas = state.try_get_mut(self.keys.replicas)?;
        let idx = usize::from(self.replica);
        let job = match replicas[idx].finish(job_id, now) {
            Some(job) => job,
            None => {
                log::trace!(
                    "[{:?}] Ignoring stale completion of {} at replica {}",
                    scheduler.time(),
                    job_id,
                    self.replica
                );
                return Ok(());
            }
        };
        let mut starts: Vec<(ReplicaId, ServiceStart)> = Vec::new();
        if let Some(start) = replicas[idx].start_next(now) {
            starts.push((self.replica, start));
        }
        let mut cancelled = Vec::new();
        for &sibling in job.copies().iter().filter(|&&r| r != self.replica) {
            let replica = &mut replicas[usize::from(sibling)];
            if let Some(was_in_service) = replica.cancel(job_id, now) {
                cancelled.push(sibling);
                if was_in_service {
                    if let Some(start) = replica.start_next(now) {
                        starts.push((sibling, start));
                    }
                }
            }
        }

        let record = JobRecord::completed(&job, self.replica, now);
        log_event(
            self.verbose,
            format_args!(
                "{:7.4} {}: Finished, total {:2.3}",
                now,
                job.name(),
                record.sojourn()
            ),
        );
        let stats = state.try_get_mut(self.keys.stats)?;
        stats.dispose(record);
        for sibling in cancelled {
            stats.record(EventKind::Cancellation, job_id, Some(sibling));
            log_event(
                self.verbose,
                format_args!("    ↳ {} - Interrupted", copy_name(job_id, sibling)),
            );
        }

        for (replica, start) in starts {
            begin_service(replica, start, scheduler, state, &self.keys, self.verbose)?;
        }
        sample_occupancy(state, &self.keys)
    }
}

impl Component for Server {
    type Event = Event;

    fn process_event(
        &mut self,
        _self_id: ComponentId<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simkit::Result<()> {
        match event {
            Event::ServiceFinished { job } => self.finish(*job, scheduler, state),
        }
    }
}

/// Records the start of a service at `replica` and schedules its completion with the server of
/// that replica.
pub(crate) fn begin_service(
    replica: ReplicaId,
    start: ServiceStart,
    scheduler: &mut Scheduler,
    state: &mut State,
    keys: &SystemKeys,
    verbose: bool,
) -> simkit::Result<()> {
    let server = *state
        .try_get(keys.servers)?
        .get(usize::from(replica))
        .ok_or(simkit::Error::MissingValue("server of replica"))?;
    log_event(
        verbose,
        format_args!(
            "{:7.4} {}: Waited {:6.3}",
            scheduler.time().as_secs_f64(),
            copy_name(start.job, replica),
            start.waited
        ),
    );
    state
        .try_get_mut(keys.stats)?
        .record(EventKind::ServiceStart, start.job, Some(replica));
    scheduler.schedule(
        start.service_time,
        server,
        Event::ServiceFinished { job: start.job },
    )
}
