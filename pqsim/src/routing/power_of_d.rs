use std::cell::RefCell;

use rand_chacha::ChaChaRng;

use super::{Route, RoutingContext, TieBreak};
use crate::ReplicaId;

/// Power of `d` choices: samples `d` distinct eligible replicas uniformly without replacement and
/// selects the one with the fewest resident jobs.
///
/// If `d` is at least the number of eligible replicas, no sampling takes place and the policy
/// behaves exactly like [`ShortestQueueRoute`](super::ShortestQueueRoute).
pub struct PowerOfDRoute {
    d: usize,
    tie_break: TieBreak,
    rng: RefCell<ChaChaRng>,
}

impl PowerOfDRoute {
    /// Constructs a new router sampling `d` replicas.
    #[must_use]
    pub fn new(d: usize, tie_break: TieBreak, rng: ChaChaRng) -> Self {
        Self {
            d,
            tie_break,
            rng: RefCell::new(rng),
        }
    }
}

impl Route for PowerOfDRoute {
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId> {
        let sampled = super::sample(ctx.eligible(), self.d, &self.rng);
        super::shortest(ctx, &sampled, self.tie_break, &self.rng)
    }
}
