use std::cell::RefCell;

use rand::seq::SliceRandom;
use rand_chacha::ChaChaRng;

use super::{Route, RoutingContext};
use crate::ReplicaId;

/// Redundancy-`d` routing, optionally with a threshold `r`.
///
/// Samples `d` eligible replicas and sends a copy of the job to each sampled replica with at most
/// `r` resident jobs (to all of them if there is no threshold). If none qualifies, a single copy
/// goes to one of the sampled replicas chosen uniformly at random. The first copy to finish
/// disposes the job, and the remaining copies are cancelled.
pub struct RedundancyRoute {
    d: usize,
    threshold: Option<usize>,
    rng: RefCell<ChaChaRng>,
}

impl RedundancyRoute {
    /// Constructs a new router sampling `d` replicas with an optional threshold.
    #[must_use]
    pub fn new(d: usize, threshold: Option<usize>, rng: ChaChaRng) -> Self {
        Self {
            d,
            threshold,
            rng: RefCell::new(rng),
        }
    }
}

impl Route for RedundancyRoute {
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId> {
        self.choose_all(ctx).first().copied()
    }

    fn choose_all(&self, ctx: &RoutingContext<'_>) -> Vec<ReplicaId> {
        let sampled = super::sample(ctx.eligible(), self.d, &self.rng);
        let below_threshold: Vec<usize> = match self.threshold {
            Some(threshold) => sampled
                .iter()
                .copied()
                .filter(|&idx| ctx.resident(idx) <= threshold)
                .collect(),
            None => sampled.clone(),
        };
        let chosen = if below_threshold.is_empty() {
            sampled
                .choose(&mut *self.rng.borrow_mut())
                .copied()
                .into_iter()
                .collect()
        } else {
            below_threshold
        };
        chosen.into_iter().map(ReplicaId::from).collect()
    }
}
