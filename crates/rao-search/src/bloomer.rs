//! Generation of the candidate combinations explored from a leaf.

use crate::filters::{Candidates, FilterChain};
use crate::leaf::ActivatedActions;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{NetworkAction, NetworkActionCombination, UsageMethod};
use std::sync::Arc;
use tracing::warn;

pub struct Bloomer {
    network_actions: Vec<Arc<NetworkAction>>,
    predefined: Vec<NetworkActionCombination>,
    filters: FilterChain,
}

impl Bloomer {
    /// Predefined combinations naming an unknown action are skipped.
    pub fn new(perimeter: &OptimizationPerimeter, predefined_ids: &[Vec<String>], filters: FilterChain) -> Self {
        let network_actions: Vec<Arc<NetworkAction>> = perimeter
            .network_actions()
            .iter()
            .filter(|a| a.usage_method == UsageMethod::Available)
            .cloned()
            .collect();
        let mut predefined = Vec::new();
        for ids in predefined_ids {
            let actions: Option<Vec<Arc<NetworkAction>>> = ids
                .iter()
                .map(|id| network_actions.iter().find(|a| &a.id == id).cloned())
                .collect();
            match actions {
                Some(actions) if !actions.is_empty() => predefined.push(NetworkActionCombination::new(actions, true)),
                _ => warn!(combination = ?ids, "predefined combination refers to unavailable network actions"),
            }
        }
        Self {
            network_actions,
            predefined,
            filters,
        }
    }

    pub fn has_network_actions(&self) -> bool {
        !self.network_actions.is_empty()
    }

    /// Single actions not applied yet, plus predefined combinations none of
    /// whose actions are applied, after the filter chain.
    pub fn bloom(&self, activated: &ActivatedActions) -> Candidates {
        let mut candidates = Candidates::new();
        for action in &self.network_actions {
            if !activated.contains_network_action(&action.id) {
                candidates.insert(NetworkActionCombination::single(Arc::clone(action)), false);
            }
        }
        for combination in &self.predefined {
            if combination
                .actions()
                .iter()
                .all(|a| !activated.contains_network_action(&a.id))
            {
                candidates.entry(combination.clone()).or_insert(false);
            }
        }
        self.filters.apply(candidates, activated)
    }
}

/// Exploration rank: fewer actions first, then identifier.
pub fn rank(a: &NetworkActionCombination, b: &NetworkActionCombination) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.concatenated_id().cmp(b.concatenated_id()))
}
