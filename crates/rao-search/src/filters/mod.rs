//! Filters applied to the candidate combinations of one depth.
//!
//! Each filter maps `combination → reset range actions` to a subset of it,
//! possibly raising the reset flag. Flags are only ever OR-ed, so running the
//! chain twice gives the same result as running it once.

mod max_per_tso;
mod max_ra;
mod max_tso;
mod mutual_exclusion;

pub use self::max_per_tso::MaxPerTsoFilter;
pub use self::max_ra::MaxRaFilter;
pub use self::max_tso::MaxTsoFilter;
pub use self::mutual_exclusion::MutualExclusionFilter;

use crate::leaf::ActivatedActions;
use crate::logging::TECHNICAL;
use crate::parameters::RaLimits;
use rao_core::NetworkActionCombination;
use std::collections::BTreeMap;
use tracing::debug;

/// Candidate combinations with their "reset range actions" flag.
pub type Candidates = BTreeMap<NetworkActionCombination, bool>;

pub trait NetworkActionCombinationFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn filter(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates;
}

pub struct FilterChain {
    filters: Vec<Box<dyn NetworkActionCombinationFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn NetworkActionCombinationFilter>>) -> Self {
        Self { filters }
    }

    /// Mutual exclusion, then operator count, per-operator caps and the global cap.
    pub fn for_limits(limits: &RaLimits) -> Self {
        let mut filters: Vec<Box<dyn NetworkActionCombinationFilter>> = vec![Box::new(MutualExclusionFilter)];
        if limits.max_tso != usize::MAX {
            filters.push(Box::new(MaxTsoFilter::new(limits.max_tso)));
        }
        if !limits.max_topo_per_tso.is_empty() || !limits.max_ra_per_tso.is_empty() {
            filters.push(Box::new(MaxPerTsoFilter::new(limits.clone())));
        }
        if limits.max_ra != usize::MAX {
            filters.push(Box::new(MaxRaFilter::new(limits.max_ra)));
        }
        Self::new(filters)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn apply(&self, candidates: Candidates, activated: &ActivatedActions) -> Candidates {
        self.filters.iter().fold(candidates, |candidates, filter| {
            let before = candidates.len();
            let kept = filter.filter(candidates, activated);
            if kept.len() < before {
                debug!(
                    target: TECHNICAL,
                    filter = filter.name(),
                    removed = before - kept.len(),
                    remaining = kept.len(),
                    "combinations filtered out"
                );
            }
            kept
        })
    }
}
