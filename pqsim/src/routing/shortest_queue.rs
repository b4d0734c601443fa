use std::cell::RefCell;

use rand_chacha::ChaChaRng;

use super::{Route, RoutingContext, TieBreak};
use crate::ReplicaId;

/// Always selects the replica with the fewest resident jobs (join the shortest queue).
pub struct ShortestQueueRoute {
    tie_break: TieBreak,
    rng: RefCell<ChaChaRng>,
}

impl ShortestQueueRoute {
    /// Constructs a new router. `rng` is only used for [`TieBreak::Random`].
    #[must_use]
    pub fn new(tie_break: TieBreak, rng: ChaChaRng) -> Self {
        Self {
            tie_break,
            rng: RefCell::new(rng),
        }
    }
}

impl Route for ShortestQueueRoute {
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId> {
        super::shortest(ctx, &ctx.eligible(), self.tie_break, &self.rng)
    }
}
