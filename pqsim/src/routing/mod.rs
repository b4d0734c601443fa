//! Routing policies deciding which replica admits an arriving job.

use std::cell::RefCell;

use rand::seq::{index, SliceRandom};
use rand_chacha::ChaChaRng;
use serde::{Deserialize, Serialize};

use crate::{Replica, ReplicaId};

mod power_of_d;
mod random;
mod redundancy;
mod round_robin;
mod shortest_queue;

pub use power_of_d::PowerOfDRoute;
pub use random::RandomRoute;
pub use redundancy::RedundancyRoute;
pub use round_robin::RoundRobinRoute;
pub use shortest_queue::ShortestQueueRoute;

/// Read-only view of the replicas at the moment of a routing decision.
pub struct RoutingContext<'a> {
    replicas: &'a [Replica],
    skip_full: bool,
}

impl<'a> RoutingContext<'a> {
    /// Constructs a context. If `skip_full` is set, replicas with a full queue are not eligible.
    #[must_use]
    pub fn new(replicas: &'a [Replica], skip_full: bool) -> Self {
        Self {
            replicas,
            skip_full,
        }
    }

    /// Total number of replicas, eligible or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Checks if there are no replicas at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Number of jobs queued or in service at replica `idx`.
    #[must_use]
    pub fn resident(&self, idx: usize) -> usize {
        self.replicas[idx].resident()
    }

    /// Number of jobs waiting at replica `idx`, not counting the one in service.
    #[must_use]
    pub fn queued(&self, idx: usize) -> usize {
        self.replicas[idx].queued()
    }

    /// Whether replica `idx` has a job in service.
    #[must_use]
    pub fn is_busy(&self, idx: usize) -> bool {
        self.replicas[idx].is_busy()
    }

    /// Whether replica `idx` can be chosen.
    #[must_use]
    pub fn is_eligible(&self, idx: usize) -> bool {
        !self.skip_full || self.replicas[idx].accepts()
    }

    /// Indices of all eligible replicas in increasing order.
    #[must_use]
    pub fn eligible(&self) -> Vec<usize> {
        (0..self.len()).filter(|&idx| self.is_eligible(idx)).collect()
    }
}

/// Implementors are routing policies that select replicas for arriving jobs.
///
/// Routing never mutates replicas. Policies keeping their own state, such as a cursor or a random
/// number generator, do so through interior mutability.
pub trait Route {
    /// Selects the replica to admit the job, or `None` if no replica is eligible.
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId>;

    /// Selects all replicas that should receive a copy of the job. Unless the policy replicates
    /// jobs, this is the single replica returned by [`Route::choose`].
    fn choose_all(&self, ctx: &RoutingContext<'_>) -> Vec<ReplicaId> {
        self.choose(ctx).into_iter().collect()
    }
}

/// How to pick among replicas with equally many resident jobs.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, strum::EnumString, strum::ToString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The replica with the lowest index wins.
    LowestIndex,
    /// Uniformly at random among the tied replicas.
    Random,
}

impl Default for TieBreak {
    fn default() -> Self {
        Self::LowestIndex
    }
}

/// Type of routing policy.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, strum::EnumString, strum::ToString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// See [`RandomRoute`].
    Random,
    /// See [`RoundRobinRoute`].
    RoundRobin,
    /// Join the shortest queue. See [`ShortestQueueRoute`].
    ShortestQueue,
    /// Join the shortest of `d` sampled queues. See [`PowerOfDRoute`].
    PowerOfD,
    /// Send copies to `d` sampled queues. See [`RedundancyRoute`].
    Redundancy,
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::Random
    }
}

/// Routing policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Type of the policy.
    pub policy: PolicyKind,
    /// Number of sampled replicas, required by `power_of_d` and `redundancy`.
    pub d: Option<usize>,
    /// Redundancy threshold: copies are only sent to sampled replicas with at most this many
    /// resident jobs.
    pub threshold: Option<usize>,
    /// Tie-break rule of `shortest_queue` and `power_of_d`.
    pub tie_break: TieBreak,
}

impl RoutingConfig {
    /// Constructs the policy for `replicas` replicas, taking ownership of the routing stream.
    /// A missing `d` means sampling all replicas.
    #[must_use]
    pub fn build(&self, replicas: usize, rng: ChaChaRng) -> Box<dyn Route> {
        let d = self.d.unwrap_or(replicas);
        match self.policy {
            PolicyKind::Random => Box::new(RandomRoute::new(rng)),
            PolicyKind::RoundRobin => Box::new(RoundRobinRoute::default()),
            PolicyKind::ShortestQueue => Box::new(ShortestQueueRoute::new(self.tie_break, rng)),
            PolicyKind::PowerOfD => Box::new(PowerOfDRoute::new(d, self.tie_break, rng)),
            PolicyKind::Redundancy => Box::new(RedundancyRoute::new(d, self.threshold, rng)),
        }
    }
}

/// Samples `d` distinct indices out of `candidates` in increasing order. If there are no more than
/// `d` candidates, all of them are returned and no randomness is consumed.
fn sample(candidates: Vec<usize>, d: usize, rng: &RefCell<ChaChaRng>) -> Vec<usize> {
    if d >= candidates.len() {
        return candidates;
    }
    let mut sampled: Vec<usize> = index::sample(&mut *rng.borrow_mut(), candidates.len(), d)
        .into_iter()
        .map(|i| candidates[i])
        .collect();
    sampled.sort_unstable();
    sampled
}

/// Selects the candidate with the fewest resident jobs.
fn shortest(
    ctx: &RoutingContext<'_>,
    candidates: &[usize],
    tie_break: TieBreak,
    rng: &RefCell<ChaChaRng>,
) -> Option<ReplicaId> {
    let min = candidates.iter().map(|&idx| ctx.resident(idx)).min()?;
    let tied = candidates
        .iter()
        .copied()
        .filter(|&idx| ctx.resident(idx) == min);
    let chosen = match tie_break {
        TieBreak::LowestIndex => tied.min(),
        TieBreak::Random => tied
            .collect::<Vec<_>>()
            .choose(&mut *rng.borrow_mut())
            .copied(),
    };
    chosen.map(ReplicaId::from)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{Job, JobId};
    use rand::SeedableRng;

    /// Builds replicas with the given resident counts, capacity bounding the waiting jobs.
    pub(crate) fn replicas(resident: &[usize], capacity: Option<usize>) -> Vec<Replica> {
        let mut next_id = 0;
        resident
            .iter()
            .enumerate()
            .map(|(idx, &count)| {
                let mut replica = Replica::new(ReplicaId::from(idx), capacity);
                for _ in 0..count {
                    let job = Job::new(JobId::from(next_id), 0.0, 1.0);
                    next_id += 1;
                    replica.admit(job, 0.0).unwrap();
                }
                replica
            })
            .collect()
    }

    pub(crate) fn rng() -> ChaChaRng {
        ChaChaRng::seed_from_u64(1)
    }

    #[test]
    fn test_context() {
        let replicas = replicas(&[2, 0, 1], Some(1));
        let ctx = RoutingContext::new(&replicas, true);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.resident(0), 2);
        assert_eq!(ctx.queued(0), 1);
        assert!(ctx.is_busy(0));
        assert_eq!(ctx.queued(1), 0);
        assert!(!ctx.is_busy(1));
        assert_eq!(ctx.queued(2), 0);
        assert!(ctx.is_busy(2));
        assert_eq!(ctx.eligible(), vec![1, 2]);
        let ctx = RoutingContext::new(&replicas, false);
        assert_eq!(ctx.eligible(), vec![0, 1, 2]);
    }

    #[test]
    fn test_sample_all_does_not_consume_randomness() {
        let shared = RefCell::new(rng());
        assert_eq!(sample(vec![0, 2, 5], 3, &shared), vec![0, 2, 5]);
        assert_eq!(sample(vec![0, 2, 5], 4, &shared), vec![0, 2, 5]);
        let mut fresh = rng();
        assert_eq!(
            rand::RngCore::next_u64(&mut *shared.borrow_mut()),
            rand::RngCore::next_u64(&mut fresh)
        );
    }

    #[test]
    fn test_sample_is_distinct_and_sorted() {
        let rng = RefCell::new(rng());
        for _ in 0..100 {
            let sampled = sample((0..10).collect(), 4, &rng);
            assert_eq!(sampled.len(), 4);
            assert!(sampled.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_shortest_tie_break() {
        let replicas = replicas(&[1, 0, 2, 0], None);
        let ctx = RoutingContext::new(&replicas, false);
        let rng = RefCell::new(rng());
        let all = ctx.eligible();
        assert_eq!(
            shortest(&ctx, &all, TieBreak::LowestIndex, &rng),
            Some(ReplicaId::from(1))
        );
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let chosen = shortest(&ctx, &all, TieBreak::Random, &rng).unwrap();
            assert!(chosen == ReplicaId::from(1) || chosen == ReplicaId::from(3));
            seen.insert(chosen);
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(shortest(&ctx, &[], TieBreak::LowestIndex, &rng), None);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("power_of_d".parse::<PolicyKind>(), Ok(PolicyKind::PowerOfD));
        assert_eq!(PolicyKind::ShortestQueue.to_string(), "shortest_queue");
        assert!("fastest".parse::<PolicyKind>().is_err());
        let config: RoutingConfig =
            serde_json::from_str(r#"{"policy": "round_robin", "tie_break": "random"}"#).unwrap();
        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert_eq!(config.tie_break, TieBreak::Random);
        assert_eq!(config.d, None);
    }
}
