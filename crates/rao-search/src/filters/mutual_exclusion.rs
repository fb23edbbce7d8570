//! Drops combinations that conflict with themselves or with applied actions.

use super::{Candidates, NetworkActionCombinationFilter};
use crate::leaf::ActivatedActions;
use rao_core::NetworkActionCombination;

pub struct MutualExclusionFilter;

impl MutualExclusionFilter {
    fn is_consistent(combination: &NetworkActionCombination, activated: &ActivatedActions) -> bool {
        let actions = combination.actions();
        let internal = actions
            .iter()
            .enumerate()
            .all(|(i, a)| actions[i + 1..].iter().all(|b| a.is_compatible_with(b)));
        internal
            && actions.iter().all(|a| {
                !activated.contains_network_action(&a.id)
                    && activated.network_actions.iter().all(|applied| a.is_compatible_with(applied))
            })
    }
}

impl NetworkActionCombinationFilter for MutualExclusionFilter {
    fn name(&self) -> &'static str {
        "mutual_exclusion"
    }

    fn filter(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates {
        candidates
            .into_iter()
            .filter(|(combination, _)| Self::is_consistent(combination, activated))
            .collect()
    }
}
