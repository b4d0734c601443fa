use rand::Rng;
use rand_distr::Distribution;
use simkit::{Component, ComponentId, Scheduler, State};

use crate::{DispatcherEvent, Job, JobId, SystemKeys};

/// Job generator has only one job and hence one event.
#[derive(Debug, Copy, Clone)]
pub enum Event {
    /// At this event, we generate a new job with a freshly drawn service time and hand it over to
    /// the dispatcher. Then, unless the job limit is reached, the generator schedules itself to
    /// run again after a time drawn from the interarrival distribution.
    Arrival,
}

/// Generates jobs at random intervals. See [`Event`].
pub struct JobGenerator<R, A, S>
where
    R: Rng,
    A: Distribution<f64>,
    S: Distribution<f64>,
{
    arrival_rng: R,
    service_rng: R,
    interarrival: A,
    service: S,
    counter: usize,
    limit: Option<usize>,
    keys: SystemKeys,
    dispatcher: ComponentId<DispatcherEvent>,
}

impl<R, A, S> JobGenerator<R, A, S>
where
    R: Rng,
    A: Distribution<f64>,
    S: Distribution<f64>,
{
    /// Creates a new job generator with given distributions for time intervals and service
    /// times, each with its own random number generator. At most `limit` jobs are generated if
    /// given. Jobs are sent to the entry queue in `keys`, and the dispatcher is notified.
    pub fn new(
        arrival_rng: R,
        service_rng: R,
        interarrival: A,
        service: S,
        limit: Option<usize>,
        keys: SystemKeys,
        dispatcher: ComponentId<DispatcherEvent>,
    ) -> Self {
        Self {
            arrival_rng,
            service_rng,
            interarrival,
            service,
            counter: 0,
            limit,
            keys,
            dispatcher,
        }
    }

    /// Number of jobs generated so far.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.counter
    }

    fn generate_job(&mut self, now: f64) -> Job {
        let id = JobId::from(self.counter);
        self.counter += 1;
        Job::new(id, now, self.service.sample(&mut self.service_rng))
    }

    fn exhausted(&self) -> bool {
        self.limit.map_or(false, |limit| self.counter >= limit)
    }
}

impl<R, A, S> Component for JobGenerator<R, A, S>
where
    R: Rng,
    A: Distribution<f64>,
    S: Distribution<f64>,
{
    type Event = Event;

    fn process_event(
        &mut self,
        self_id: ComponentId<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simkit::Result<()> {
        match event {
            Event::Arrival => {
                if self.exhausted() {
                    return Ok(());
                }
                let job = self.generate_job(scheduler.time().as_secs_f64());
                log::trace!("[{:?}] Generated job {}", scheduler.time(), job.id());
                state.try_get_mut(self.keys.stats)?.arrive(&job);
                state
                    .send(self.keys.entry, job)
                    .map_err(|_| simkit::Error::QueueFull(std::any::type_name::<Job>()))?;
                scheduler.schedule_immediately(self.dispatcher, DispatcherEvent::NewJob);
                if self.exhausted() {
                    log::debug!("Generated all {} jobs", self.counter);
                } else {
                    let gap = self.interarrival.sample(&mut self.arrival_rng);
                    scheduler.schedule(gap, self_id, Event::Arrival)?;
                }
                Ok(())
            }
        }
    }
}
