use std::cell::RefCell;

use rand::seq::SliceRandom;
use rand_chacha::ChaChaRng;

use super::{Route, RoutingContext};
use crate::ReplicaId;

/// Routes each job to a replica drawn uniformly at random from the eligible ones.
pub struct RandomRoute {
    rng: RefCell<ChaChaRng>,
}

impl RandomRoute {
    /// Constructs a new random router drawing from `rng`.
    #[must_use]
    pub fn new(rng: ChaChaRng) -> Self {
        Self {
            rng: RefCell::new(rng),
        }
    }
}

impl Route for RandomRoute {
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId> {
        ctx.eligible()
            .choose(&mut *self.rng.borrow_mut())
            .copied()
            .map(ReplicaId::from)
    }
}
