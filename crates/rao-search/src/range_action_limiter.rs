//! Restriction of the range actions a leaf may use to the remaining budget.
//!
//! Network actions already activated in the leaf consume the budget first.
//! Range actions are then kept greedily: those already activated, then by
//! decreasing absolute sensitivity on the most limiting element, then by id.

use crate::parameters::RaLimits;
use rao_core::{
    NetworkAction, RangeAction, RangeActionCategory, RangeActionSetpoints, SensitivityHandled, SensitivityResult,
    Side,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Range actions kept for optimization and those frozen.
#[derive(Debug, Clone, Default)]
pub struct LimitedRangeActions {
    pub kept: Vec<RangeAction>,
    pub excluded: Vec<String>,
}

pub struct RangeActionLimiter<'a> {
    limits: &'a RaLimits,
}

impl<'a> RangeActionLimiter<'a> {
    pub fn new(limits: &'a RaLimits) -> Self {
        Self { limits }
    }

    /// Select the range actions a leaf may move.
    ///
    /// `activated` are the ids whose setpoint already differs from the
    /// pre-perimeter one, `most_limiting` the element ranking the others.
    pub fn limit(
        &self,
        range_actions: &[RangeAction],
        network_actions: &[Arc<NetworkAction>],
        activated: &BTreeSet<String>,
        most_limiting: Option<&str>,
        sensitivities: &SensitivityResult,
    ) -> LimitedRangeActions {
        if self.limits.is_unlimited() {
            return LimitedRangeActions {
                kept: range_actions.to_vec(),
                excluded: Vec::new(),
            };
        }

        let mut ordered: Vec<&RangeAction> = range_actions.iter().collect();
        let score = |ra: &RangeAction| {
            most_limiting.map_or(0.0, |cnec| {
                Side::BOTH
                    .iter()
                    .map(|side| sensitivities.sensitivity(cnec, *side, &ra.id).abs())
                    .filter(|s| !s.is_nan())
                    .fold(0.0, f64::max)
            })
        };
        ordered.sort_by(|a, b| {
            activated
                .contains(&b.id)
                .cmp(&activated.contains(&a.id))
                .then_with(|| score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut budget = self.limits.max_ra.saturating_sub(network_actions.len());
        let mut operators: BTreeSet<String> = network_actions.iter().filter_map(|a| a.operator.clone()).collect();
        let mut per_operator: BTreeMap<String, usize> = BTreeMap::new();
        for operator in network_actions.iter().filter_map(|a| a.operator.as_ref()) {
            *per_operator.entry(operator.clone()).or_default() += 1;
        }
        let mut pst_per_operator: BTreeMap<String, usize> = BTreeMap::new();

        let mut result = LimitedRangeActions::default();
        for ra in ordered {
            if budget == 0 || !self.fits_operator_limits(ra, &operators, &per_operator, &pst_per_operator) {
                result.excluded.push(ra.id.clone());
                continue;
            }
            budget -= 1;
            if let Some(operator) = &ra.operator {
                operators.insert(operator.clone());
                *per_operator.entry(operator.clone()).or_default() += 1;
                if ra.category() == RangeActionCategory::Pst {
                    *pst_per_operator.entry(operator.clone()).or_default() += 1;
                }
            }
            result.kept.push(ra.clone());
        }
        result.kept.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }

    fn fits_operator_limits(
        &self,
        ra: &RangeAction,
        operators: &BTreeSet<String>,
        per_operator: &BTreeMap<String, usize>,
        pst_per_operator: &BTreeMap<String, usize>,
    ) -> bool {
        let Some(operator) = &ra.operator else {
            return true;
        };
        if !operators.contains(operator) && operators.len() >= self.limits.max_tso {
            return false;
        }
        if per_operator.get(operator).copied().unwrap_or(0) >= self.limits.max_ra_for(operator) {
            return false;
        }
        ra.category() != RangeActionCategory::Pst
            || pst_per_operator.get(operator).copied().unwrap_or(0) < self.limits.max_pst_for(operator)
    }
}

/// Ids of the range actions of `setpoints` moved away from `reference`.
pub fn activated_range_actions(setpoints: &RangeActionSetpoints, reference: &RangeActionSetpoints) -> BTreeSet<String> {
    setpoints
        .activated_against(reference)
        .into_iter()
        .map(str::to_string)
        .collect()
}
