use std::cell::Cell;

use super::{Route, RoutingContext};
use crate::ReplicaId;

/// Dispatches in a round-robin fashion, regardless of queue lengths.
///
/// Replicas are only skipped if they are not eligible, i.e., when full replicas are avoided.
#[derive(Default)]
pub struct RoundRobinRoute {
    next: Cell<usize>,
}

impl Route for RoundRobinRoute {
    fn choose(&self, ctx: &RoutingContext<'_>) -> Option<ReplicaId> {
        let num_replicas = ctx.len();
        let start = self.next.get();
        let idx = (0..num_replicas)
            .map(|offset| (start + offset) % num_replicas)
            .find(|&idx| ctx.is_eligible(idx))?;
        self.next.set((idx + 1) % num_replicas);
        Some(ReplicaId::from(idx))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::routing::test::replicas;
    use itertools::Itertools;

    #[test]
    fn test_cycles_through_replicas() {
        let replicas = replicas(&[3, 0, 1, 0, 2], None);
        let ctx = RoutingContext::new(&replicas, false);
        let router = RoundRobinRoute::default();
        let chosen = (0..12)
            .map(|_| usize::from(router.choose(&ctx).unwrap()))
            .collect_vec();
        assert_eq!(chosen, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1]);
        for window in chosen.chunks(5).filter(|c| c.len() == 5) {
            assert_eq!(window.iter().sorted().copied().collect_vec(), vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_skips_full_replicas_only_when_avoiding() {
        let replicas = replicas(&[0, 2, 0], Some(1));
        let router = RoundRobinRoute::default();
        let avoid = RoutingContext::new(&replicas, true);
        let chosen = (0..4)
            .map(|_| usize::from(router.choose(&avoid).unwrap()))
            .collect_vec();
        assert_eq!(chosen, vec![0, 2, 0, 2]);
        let router = RoundRobinRoute::default();
        let drop = RoutingContext::new(&replicas, false);
        let chosen = (0..3)
            .map(|_| usize::from(router.choose(&drop).unwrap()))
            .collect_vec();
        assert_eq!(chosen, vec![0, 1, 2]);
    }
}
