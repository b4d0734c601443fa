use rand::Rng;
use rand_distr::Distribution;
use simkit::{Component, ComponentId, Scheduler, State};

use crate::routing::{Route, RoutingContext};
use crate::server::begin_service;
use crate::stats::sample_occupancy;
use crate::{copy_name, log_event, DroppedJob, Job, OverflowPolicy, Replica, ReplicaId, SystemKeys};

/// Events handled by the dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// New jobs are waiting in the entry queue. All of them are routed at once.
    NewJob,
}

/// Routes incoming jobs to replicas.
///
/// For each job taken from the entry queue, the routing policy selects one replica, or several
/// with redundancy. Each selected replica admits its own copy of the job. Jobs that cannot be
/// admitted anywhere are dropped.
pub struct Dispatcher<R, S>
where
    R: Rng,
    S: Distribution<f64>,
{
    keys: SystemKeys,
    router: Box<dyn Route>,
    overflow: OverflowPolicy,
    copy_rng: R,
    copy_service: S,
    verbose: bool,
}

impl<R, S> Dispatcher<R, S>
where
    R: Rng,
    S: Distribution<f64>,
{
    /// Constructs a dispatcher. Redundant copies beyond the first draw their service times from
    /// `copy_service` using `copy_rng`.
    pub fn new(
        keys: SystemKeys,
        router: Box<dyn Route>,
        overflow: OverflowPolicy,
        copy_rng: R,
        copy_service: S,
        verbose: bool,
    ) -> Self {
        Self {
            keys,
            router,
            overflow,
            copy_rng,
            copy_service,
            verbose,
        }
    }

    fn drop_job(
        &self,
        job: &Job,
        replica: Option<ReplicaId>,
        state: &mut State,
    ) -> simkit::Result<()> {
        match replica {
            Some(replica) => log::warn!(
                "{:7.4} {}: Dropped, replica {} is full",
                job.arrival(),
                job.name(),
                replica
            ),
            None => log::warn!(
                "{:7.4} {}: Dropped, no replica can admit it",
                job.arrival(),
                job.name()
            ),
        }
        state.try_get_mut(self.keys.stats)?.drop_job(DroppedJob {
            id: job.id(),
            arrival: job.arrival(),
            replica,
        });
        Ok(())
    }

    fn dispatch(
        &mut self,
        mut job: Job,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simkit::Result<()> {
        let now = scheduler.time().as_secs_f64();
        let replicas = state.try_get_mut(self.keys.replicas)?;
        let ctx = RoutingContext::new(replicas, self.overflow == OverflowPolicy::Avoid);
        let chosen = self.router.choose_all(&ctx);
        let (accepted, full): (Vec<ReplicaId>, Vec<ReplicaId>) = chosen
            .into_iter()
            .partition(|&r| replicas[usize::from(r)].accepts());
        for &replica in &full {
            replicas[usize::from(replica)].reject();
        }
        if accepted.is_empty() {
            return self.drop_job(&job, full.first().copied(), state);
        }

        job.set_copies(accepted.clone());
        if accepted.len() == 1 {
            log_event(self.verbose, format_args!("{:7.4} {}: Arrival", now, job.name()));
        } else {
            log_event(
                self.verbose,
                format_args!(
                    "{:7.4} {}: Arrival for {} copies",
                    now,
                    job.name(),
                    accepted.len()
                ),
            );
        }

        let mut starts = Vec::new();
        for (n, &replica) in accepted.iter().enumerate() {
            log_event(
                self.verbose,
                format_args!("    ↳ {}", copy_name(job.id(), replica)),
            );
            let service_time = if n == 0 {
                job.service_time()
            } else {
                self.copy_service.sample(&mut self.copy_rng)
            };
            let copy = job.copy_for(replica, service_time);
            let started = replicas[usize::from(replica)]
                .admit(copy, now)
                .map_err(|_| simkit::Error::QueueFull(std::any::type_name::<Replica>()))?;
            if let Some(start) = started {
                starts.push((replica, start));
            }
        }
        for (replica, start) in starts {
            begin_service(replica, start, scheduler, state, &self.keys, self.verbose)?;
        }
        Ok(())
    }
}

impl<R, S> Component for Dispatcher<R, S>
where
    R: Rng,
    S: Distribution<f64>,
{
    type Event = Event;

    fn process_event(
        &mut self,
        _self_id: ComponentId<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simkit::Result<()> {
        match event {
            Event::NewJob => {
                let mut dispatched = 0;
                while let Some(job) = state.recv(self.keys.entry) {
                    self.dispatch(job, scheduler, state)?;
                    dispatched += 1;
                }
                if dispatched > 0 {
                    sample_occupancy(state, &self.keys)?;
                }
                Ok(())
            }
        }
    }
}
