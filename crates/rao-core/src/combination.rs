//! Candidate sets of network actions explored together at one tree node.

use crate::actions::NetworkAction;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An immutable set of network actions.
///
/// Identity (equality, ordering, hashing) is the concatenated identifier, so
/// combinations can key ordered maps deterministically.
#[derive(Debug, Clone)]
pub struct NetworkActionCombination {
    actions: Vec<Arc<NetworkAction>>,
    operators: BTreeSet<String>,
    concatenated_id: String,
    /// Declared by the user rather than built from a single action
    predefined: bool,
}

impl NetworkActionCombination {
    pub fn new(actions: impl IntoIterator<Item = Arc<NetworkAction>>, predefined: bool) -> Self {
        let mut actions: Vec<Arc<NetworkAction>> = actions.into_iter().collect();
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions.dedup_by(|a, b| a.id == b.id);
        let operators = actions.iter().filter_map(|a| a.operator.clone()).collect();
        let concatenated_id = actions
            .iter()
            .map(|a| a.id.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        Self {
            actions,
            operators,
            concatenated_id,
            predefined,
        }
    }

    pub fn single(action: Arc<NetworkAction>) -> Self {
        Self::new([action], false)
    }

    pub fn actions(&self) -> &[Arc<NetworkAction>] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn operators(&self) -> &BTreeSet<String> {
        &self.operators
    }

    pub fn concatenated_id(&self) -> &str {
        &self.concatenated_id
    }

    pub fn is_predefined(&self) -> bool {
        self.predefined
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.actions.iter().any(|a| a.id == action_id)
    }

    /// Number of actions of the combination owned by `operator`.
    pub fn count_for_operator(&self, operator: &str) -> usize {
        self.actions
            .iter()
            .filter(|a| a.operator.as_deref() == Some(operator))
            .count()
    }
}

impl PartialEq for NetworkActionCombination {
    fn eq(&self, other: &Self) -> bool {
        self.concatenated_id == other.concatenated_id
    }
}

impl Eq for NetworkActionCombination {}

impl Hash for NetworkActionCombination {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.concatenated_id.hash(state);
    }
}

impl PartialOrd for NetworkActionCombination {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkActionCombination {
    fn cmp(&self, other: &Self) -> Ordering {
        self.concatenated_id.cmp(&other.concatenated_id)
    }
}

impl fmt::Display for NetworkActionCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.concatenated_id)
    }
}
