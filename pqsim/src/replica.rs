use delegate::delegate;
use serde::Serialize;
use simkit::Queue;

use crate::{Job, JobId, ReplicaId};

/// A job that has just entered the service slot of a replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceStart {
    /// The started job.
    pub job: JobId,
    /// When the service will finish, measured from now.
    pub service_time: f64,
    /// How long the job waited in the queue.
    pub waited: f64,
}

/// A single server: a FIFO wait queue plus one service slot.
///
/// The number of waiting jobs can be capped; the job in service does not count toward the cap.
/// At all times, the number of queued jobs equals
/// `admitted - completed - cancelled - (1 if busy else 0)`.
#[derive(Debug, Clone)]
pub struct Replica {
    id: ReplicaId,
    queue: Queue<Job>,
    in_service: Option<Job>,
    admitted: usize,
    completed: usize,
    cancelled: usize,
    rejected: usize,
    busy_time: f64,
}

impl Replica {
    /// Constructs an idle replica, with a bounded queue if `capacity` is given.
    #[must_use]
    pub fn new(id: ReplicaId, capacity: Option<usize>) -> Self {
        Self {
            id,
            queue: Queue::with_capacity_limit(capacity),
            in_service: None,
            admitted: 0,
            completed: 0,
            cancelled: 0,
            rejected: 0,
            busy_time: 0.0,
        }
    }

    delegate! {
        to self.queue {
            /// Whether the queue reached its capacity.
            #[must_use]
            pub fn is_full(&self) -> bool;
        }
    }

    /// Number of jobs waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The index of this replica.
    #[must_use]
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Jobs queued or in service.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.queue.len() + usize::from(self.in_service.is_some())
    }

    /// Whether a job is in service.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_service.is_some()
    }

    /// Whether another job can be admitted.
    #[must_use]
    pub fn accepts(&self) -> bool {
        !self.is_full()
    }

    /// The job in service, if any.
    #[must_use]
    pub fn in_service(&self) -> Option<&Job> {
        self.in_service.as_ref()
    }

    /// Iterates over all resident jobs, starting with the one in service.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.in_service.iter().chain(self.queue.iter())
    }

    /// Appends `job` to the queue. If the server is idle, the job goes straight into service,
    /// and the returned value describes it.
    ///
    /// # Errors
    ///
    /// Returns the job back if the queue is full. The rejection is counted.
    pub fn admit(&mut self, job: Job, now: f64) -> Result<Option<ServiceStart>, Job> {
        if let Err(job) = self.queue.push_back(job) {
            self.rejected += 1;
            return Err(job);
        }
        self.admitted += 1;
        Ok(self.start_next(now))
    }

    /// Moves the head of the queue into the service slot if it is free.
    pub fn start_next(&mut self, now: f64) -> Option<ServiceStart> {
        if self.in_service.is_some() {
            return None;
        }
        let mut job = self.queue.pop_front()?;
        job.start_service(now);
        let start = ServiceStart {
            job: job.id(),
            service_time: job.service_time(),
            waited: now - job.arrival(),
        };
        self.in_service = Some(job);
        Some(start)
    }

    fn release(&mut self, now: f64) -> Option<Job> {
        let job = self.in_service.take()?;
        if let Some(start) = job.service_start() {
            self.busy_time += now - start;
        }
        Some(job)
    }

    /// Finishes the service of `job_id`, freeing the slot. Returns `None` if that job is not in
    /// service here, which happens for completions of cancelled copies.
    pub fn finish(&mut self, job_id: JobId, now: f64) -> Option<Job> {
        if self.in_service.as_ref().map(Job::id) != Some(job_id) {
            return None;
        }
        let job = self.release(now);
        self.completed += 1;
        job
    }

    /// Cancels the copy of `job_id` held by this replica.
    ///
    /// Returns `Some(true)` if the copy was in service (the slot is now free), `Some(false)` if it
    /// was waiting in the queue, and `None` if there was no such copy.
    pub fn cancel(&mut self, job_id: JobId, now: f64) -> Option<bool> {
        let in_service = if self.in_service.as_ref().map(Job::id) == Some(job_id) {
            self.release(now);
            true
        } else {
            self.queue.remove_first(|job| job.id() == job_id)?;
            false
        };
        self.cancelled += 1;
        Some(in_service)
    }

    /// Counts a job that was routed here but never admitted.
    pub fn reject(&mut self) {
        self.rejected += 1;
    }

    /// Summarizes the activity of the replica from the beginning of the run until `now`.
    #[must_use]
    pub fn summary(&self, now: f64) -> ReplicaSummary {
        let ongoing = self
            .in_service
            .as_ref()
            .and_then(Job::service_start)
            .map_or(0.0, |start| now - start);
        let busy_time = self.busy_time + ongoing;
        let per_time = |value: f64| if now > 0.0 { value / now } else { 0.0 };
        ReplicaSummary {
            id: self.id,
            admitted: self.admitted,
            completed: self.completed,
            cancelled: self.cancelled,
            rejected: self.rejected,
            resident: self.resident(),
            busy_time,
            throughput: per_time(self.completed as f64),
            utilization: per_time(busy_time),
        }
    }
}

/// Activity counters of a single replica at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaSummary {
    /// Replica index.
    pub id: ReplicaId,
    /// Jobs (or copies) ever admitted.
    pub admitted: usize,
    /// Jobs completed here.
    pub completed: usize,
    /// Copies cancelled because another copy finished first.
    pub cancelled: usize,
    /// Jobs rejected because the queue was full.
    pub rejected: usize,
    /// Jobs still queued or in service.
    pub resident: usize,
    /// Total time the service slot was occupied.
    pub busy_time: f64,
    /// Completed jobs per time unit.
    pub throughput: f64,
    /// Fraction of time the service slot was occupied.
    pub utilization: f64,
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rstest::{fixture, rstest};

    fn job(id: usize, arrival: f64, service_time: f64) -> Job {
        Job::new(JobId::from(id), arrival, service_time)
    }

    fn assert_consistent(replica: &Replica) {
        assert_eq!(
            replica.queued() + usize::from(replica.is_busy()),
            replica.admitted - replica.completed - replica.cancelled
        );
    }

    #[fixture]
    fn replica() -> Replica {
        Replica::new(ReplicaId::from(0), None)
    }

    #[rstest]
    fn test_admit_starts_service_when_idle(mut replica: Replica) {
        let started = replica.admit(job(0, 0.5, 2.0), 1.0).unwrap().unwrap();
        assert_eq!(started.job, JobId::from(0));
        assert!(approx_eq!(f64, started.service_time, 2.0));
        assert!(approx_eq!(f64, started.waited, 0.5));
        assert!(replica.is_busy());
        assert_eq!(replica.queued(), 0);
        assert_eq!(replica.admit(job(1, 1.0, 1.0), 1.0), Ok(None));
        assert_eq!(replica.queued(), 1);
        assert_eq!(replica.resident(), 2);
        assert_consistent(&replica);
    }

    #[rstest]
    fn test_fifo_service(mut replica: Replica) {
        for id in 0..3 {
            let _ = replica.admit(job(id, 0.0, 1.0), 0.0).unwrap();
        }
        let mut now = 0.0;
        for id in 0..3 {
            now += 1.0;
            let finished = replica.finish(JobId::from(id), now).unwrap();
            assert_eq!(finished.id(), JobId::from(id));
            assert_eq!(finished.service_start(), Some(now - 1.0));
            assert_consistent(&replica);
            if let Some(next) = replica.start_next(now) {
                assert_eq!(next.job, JobId::from(id + 1));
            }
        }
        assert!(!replica.is_busy());
        assert_eq!(replica.resident(), 0);
        let summary = replica.summary(4.0);
        assert_eq!(summary.completed, 3);
        assert!(approx_eq!(f64, summary.utilization, 0.75));
        assert!(approx_eq!(f64, summary.throughput, 0.75));
    }

    #[rstest]
    fn test_stale_finish_is_ignored(mut replica: Replica) {
        let _ = replica.admit(job(0, 0.0, 1.0), 0.0).unwrap();
        assert_eq!(replica.finish(JobId::from(7), 1.0), None);
        assert!(replica.is_busy());
        assert_eq!(replica.completed, 0);
    }

    #[rstest]
    fn test_cancel(mut replica: Replica) {
        for id in 0..3 {
            let _ = replica.admit(job(id, 0.0, 1.0), 0.0).unwrap();
        }
        assert_eq!(replica.cancel(JobId::from(1), 0.5), Some(false));
        assert_consistent(&replica);
        assert_eq!(replica.cancel(JobId::from(0), 0.5), Some(true));
        assert!(!replica.is_busy());
        assert_consistent(&replica);
        assert_eq!(replica.cancel(JobId::from(0), 0.5), None);
        assert_eq!(replica.start_next(0.5).map(|s| s.job), Some(JobId::from(2)));
        assert_eq!(replica.cancelled, 2);
        assert!(approx_eq!(f64, replica.summary(1.0).busy_time, 1.0));
        assert_consistent(&replica);
    }

    #[test]
    fn test_capacity_excludes_job_in_service() {
        let mut replica = Replica::new(ReplicaId::from(1), Some(1));
        assert!(replica.admit(job(0, 0.0, 1.0), 0.0).unwrap().is_some());
        assert!(replica.accepts());
        assert_eq!(replica.admit(job(1, 0.0, 1.0), 0.0), Ok(None));
        assert!(!replica.accepts());
        let rejected = replica.admit(job(2, 0.0, 1.0), 0.0).unwrap_err();
        assert_eq!(rejected.id(), JobId::from(2));
        assert_eq!(replica.summary(1.0).rejected, 1);
        assert_eq!(replica.resident(), 2);
        assert_consistent(&replica);
    }
}
