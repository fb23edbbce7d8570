//! Caps the number of operators whose actions are used.

use super::{Candidates, NetworkActionCombinationFilter};
use crate::leaf::ActivatedActions;

pub struct MaxTsoFilter {
    max_tso: usize,
}

impl MaxTsoFilter {
    pub fn new(max_tso: usize) -> Self {
        Self { max_tso }
    }
}

impl NetworkActionCombinationFilter for MaxTsoFilter {
    fn name(&self) -> &'static str {
        "max_tso"
    }

    /// Keep when network-action operators fit; reset range actions when their
    /// operators would push the count over the cap.
    fn filter(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates {
        let network_operators = activated.network_action_operators();
        let range_operators = activated.range_action_operators();
        candidates
            .into_iter()
            .filter_map(|(combination, reset)| {
                let mut operators = network_operators.clone();
                operators.extend(combination.operators().iter().cloned());
                if operators.len() > self.max_tso {
                    return None;
                }
                operators.extend(range_operators.iter().cloned());
                let reset = reset || operators.len() > self.max_tso;
                Some((combination, reset))
            })
            .collect()
    }
}
