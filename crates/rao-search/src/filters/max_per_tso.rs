//! Per-operator caps on network actions and on all remedial actions.

use super::{Candidates, NetworkActionCombinationFilter};
use crate::leaf::ActivatedActions;
use crate::parameters::RaLimits;

pub struct MaxPerTsoFilter {
    limits: RaLimits,
}

impl MaxPerTsoFilter {
    /// Only the per-operator topology and remedial action caps of `limits` apply.
    pub fn new(limits: RaLimits) -> Self {
        Self { limits }
    }

    fn network_actions_of(activated: &ActivatedActions, operator: &str) -> usize {
        activated
            .network_actions
            .iter()
            .filter(|a| a.operator.as_deref() == Some(operator))
            .count()
    }

    fn range_actions_of(activated: &ActivatedActions, operator: &str) -> usize {
        activated
            .range_actions
            .iter()
            .filter(|a| a.operator.as_deref() == Some(operator))
            .count()
    }
}

impl NetworkActionCombinationFilter for MaxPerTsoFilter {
    fn name(&self) -> &'static str {
        "max_per_tso"
    }

    fn filter(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates {
        candidates
            .into_iter()
            .filter_map(|(combination, mut reset)| {
                for operator in combination.operators() {
                    let topo = Self::network_actions_of(activated, operator) + combination.count_for_operator(operator);
                    let max_ra = self.limits.max_ra_for(operator);
                    if topo > self.limits.max_topo_for(operator) || topo > max_ra {
                        return None;
                    }
                    reset |= topo.saturating_add(Self::range_actions_of(activated, operator)) > max_ra;
                }
                Some((combination, reset))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn operator_caps_drop_or_reset() {
        let fr1 = action("fr1", "FR");
        let fr2 = action("fr2", "FR");
        let be = action("be", "BE");
        let activated = ActivatedActions {
            network_actions: vec![fr1.clone()],
            range_actions: vec![pst("pst-be", "BE")],
        };
        let limits = RaLimits {
            max_topo_per_tso: [("FR".to_string(), 1)].into_iter().collect(),
            max_ra_per_tso: [("BE".to_string(), 1)].into_iter().collect(),
            ..RaLimits::unlimited()
        };
        let input = candidates(&[combination(&[&fr2]), combination(&[&be])]);
        let kept = MaxPerTsoFilter::new(limits).filter(input, &activated);
        assert_eq!(ids(&kept), vec![("be".to_string(), true)]);
    }
}
