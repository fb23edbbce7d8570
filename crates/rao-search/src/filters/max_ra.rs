//! Global cap on the number of remedial actions.

use super::{Candidates, NetworkActionCombinationFilter};
use crate::leaf::ActivatedActions;

pub struct MaxRaFilter {
    max_ra: usize,
}

impl MaxRaFilter {
    pub fn new(max_ra: usize) -> Self {
        Self { max_ra }
    }
}

impl NetworkActionCombinationFilter for MaxRaFilter {
    fn name(&self) -> &'static str {
        "max_ra"
    }

    /// Keep iff `size + network ≤ max_ra`; reset iff `size + network + range > max_ra`.
    fn filter(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates {
        let network = activated.network_actions.len();
        let range = activated.range_actions.len();
        candidates
            .into_iter()
            .filter(|(combination, _)| combination.len() + network <= self.max_ra)
            .map(|(combination, reset)| {
                let reset = reset || combination.len() + network + range > self.max_ra;
                (combination, reset)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn boundary_size_is_kept() {
        let applied = action("applied", "FR");
        let a = action("a", "FR");
        let b = action("b", "FR");
        let c = action("c", "FR");
        let activated = ActivatedActions {
            network_actions: vec![applied],
            range_actions: vec![],
        };
        // max 3 with one applied: size 2 kept, size 3 dropped
        let input = candidates(&[combination(&[&a, &b]), combination(&[&a, &b, &c])]);
        let kept = MaxRaFilter::new(3).filter(input, &activated);
        assert_eq!(ids(&kept), vec![("a + b".to_string(), false)]);
    }

    #[test]
    fn activated_range_actions_force_a_reset() {
        let a = action("a", "FR");
        let activated = ActivatedActions {
            network_actions: vec![],
            range_actions: vec![pst("p1", "FR"), pst("p2", "FR")],
        };
        let kept = MaxRaFilter::new(2).filter(candidates(&[combination(&[&a])]), &activated);
        assert_eq!(ids(&kept), vec![("a".to_string(), true)]);
    }
}
