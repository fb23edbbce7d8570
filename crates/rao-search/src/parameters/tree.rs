use super::{CurativeStopCriterion, PreventiveStopCriterion, RaRangeShrinking, RaoParameters};
use rao_core::{RaoError, RaoResult};
use serde::{Deserialize, Serialize};

/// When the tree stops exploring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCriterion {
    /// Explore until no depth improves the best leaf
    MinObjective,
    /// Stop as soon as a leaf cost is at or below the target
    AtTargetObjectiveValue(f64),
}

/// Which target-meeting sibling wins when several run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTieBreak {
    /// The first leaf to finish below target wins; later siblings are skipped
    #[default]
    FirstFinished,
    /// The winner is the fewest-action, then lexically first, qualifying leaf
    Deterministic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParameters {
    stop_criterion: StopCriterion,
    maximum_search_depth: usize,
    leaves_in_parallel: usize,
    ra_range_shrinking: bool,
    target_tie_break: TargetTieBreak,
}

impl TreeParameters {
    pub fn new(
        stop_criterion: StopCriterion,
        maximum_search_depth: usize,
        leaves_in_parallel: usize,
        ra_range_shrinking: bool,
    ) -> RaoResult<Self> {
        if leaves_in_parallel == 0 {
            return Err(RaoError::Config("leaves_in_parallel must be at least 1".into()));
        }
        if let StopCriterion::AtTargetObjectiveValue(target) = stop_criterion {
            if target.is_nan() {
                return Err(RaoError::Config("target objective value must be a number".into()));
            }
        }
        Ok(Self {
            stop_criterion,
            maximum_search_depth,
            leaves_in_parallel,
            ra_range_shrinking,
            target_tie_break: TargetTieBreak::default(),
        })
    }

    pub fn with_target_tie_break(mut self, tie_break: TargetTieBreak) -> Self {
        self.target_tie_break = tie_break;
        self
    }

    pub fn for_preventive_perimeter(params: &RaoParameters) -> RaoResult<Self> {
        let stop_criterion = match params.objective_function.preventive_stop_criterion {
            PreventiveStopCriterion::MinObjective => StopCriterion::MinObjective,
            PreventiveStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
        };
        let shrinking = matches!(
            params.range_actions.ra_range_shrinking,
            RaRangeShrinking::Enabled | RaRangeShrinking::EnabledInFirstPraoAndCrao
        );
        Ok(Self::new(
            stop_criterion,
            params.topo_optimization.max_search_tree_depth,
            params.multithreading.preventive_leaves_in_parallel,
            shrinking,
        )?
        .with_target_tie_break(params.objective_function.target_tie_break))
    }

    /// Automatons only need to secure the network; no range shrinking.
    pub fn for_automaton_perimeter(params: &RaoParameters) -> RaoResult<Self> {
        Ok(Self::new(
            StopCriterion::AtTargetObjectiveValue(0.0),
            params.topo_optimization.max_search_tree_depth,
            params.multithreading.auto_leaves_in_parallel,
            false,
        )?
        .with_target_tie_break(params.objective_function.target_tie_break))
    }

    /// `preventive_optimized_cost` is the cost reached by the preventive optimization.
    pub fn for_curative_perimeter(params: &RaoParameters, preventive_optimized_cost: f64) -> RaoResult<Self> {
        let improvement = params.objective_function.curative_min_obj_improvement;
        let stop_criterion = match params.objective_function.curative_stop_criterion {
            CurativeStopCriterion::MinObjective => StopCriterion::MinObjective,
            CurativeStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
            CurativeStopCriterion::PreventiveObjective => {
                StopCriterion::AtTargetObjectiveValue(preventive_optimized_cost - improvement)
            }
            CurativeStopCriterion::PreventiveObjectiveAndSecure => {
                StopCriterion::AtTargetObjectiveValue(preventive_optimized_cost.min(0.0) - improvement)
            }
        };
        let shrinking = matches!(
            params.range_actions.ra_range_shrinking,
            RaRangeShrinking::Enabled | RaRangeShrinking::EnabledInFirstPraoAndCrao
        );
        Ok(Self::new(
            stop_criterion,
            params.topo_optimization.max_search_tree_depth,
            params.multithreading.curative_leaves_in_parallel,
            shrinking,
        )?
        .with_target_tie_break(params.objective_function.target_tie_break))
    }

    pub fn for_second_preventive_perimeter(params: &RaoParameters) -> RaoResult<Self> {
        let stop_criterion = match params.objective_function.preventive_stop_criterion {
            PreventiveStopCriterion::MinObjective => StopCriterion::MinObjective,
            PreventiveStopCriterion::Secure => match params.objective_function.curative_stop_criterion {
                // curative already aims below the preventive cost: keep improving
                CurativeStopCriterion::PreventiveObjective
                | CurativeStopCriterion::PreventiveObjectiveAndSecure => StopCriterion::MinObjective,
                _ => StopCriterion::AtTargetObjectiveValue(0.0),
            },
        };
        Ok(Self::new(
            stop_criterion,
            params.topo_optimization.max_search_tree_depth,
            params.multithreading.preventive_leaves_in_parallel,
            params.range_actions.ra_range_shrinking == RaRangeShrinking::Enabled,
        )?
        .with_target_tie_break(params.objective_function.target_tie_break))
    }

    pub fn stop_criterion(&self) -> StopCriterion {
        self.stop_criterion
    }

    pub fn target_objective_value(&self) -> Option<f64> {
        match self.stop_criterion {
            StopCriterion::AtTargetObjectiveValue(target) => Some(target),
            StopCriterion::MinObjective => None,
        }
    }

    pub fn maximum_search_depth(&self) -> usize {
        self.maximum_search_depth
    }

    pub fn leaves_in_parallel(&self) -> usize {
        self.leaves_in_parallel
    }

    pub fn ra_range_shrinking(&self) -> bool {
        self.ra_range_shrinking
    }

    pub fn target_tie_break(&self) -> TargetTieBreak {
        self.target_tie_break
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preventive_secure_targets_zero() {
        let mut params = RaoParameters::default();
        params.objective_function.preventive_stop_criterion = PreventiveStopCriterion::Secure;
        params.range_actions.ra_range_shrinking = RaRangeShrinking::EnabledInFirstPraoAndCrao;
        let tree = TreeParameters::for_preventive_perimeter(&params).unwrap();
        assert_eq!(tree.target_objective_value(), Some(0.0));
        assert!(tree.ra_range_shrinking());

        let second = TreeParameters::for_second_preventive_perimeter(&params).unwrap();
        assert!(!second.ra_range_shrinking());
    }

    #[test]
    fn curative_target_follows_preventive_cost() {
        let mut params = RaoParameters::default();
        params.objective_function.curative_stop_criterion = CurativeStopCriterion::PreventiveObjective;
        params.objective_function.curative_min_obj_improvement = 5.0;
        params.multithreading.curative_leaves_in_parallel = 4;
        let tree = TreeParameters::for_curative_perimeter(&params, 30.0).unwrap();
        assert_eq!(tree.target_objective_value(), Some(25.0));
        assert_eq!(tree.leaves_in_parallel(), 4);

        params.objective_function.curative_stop_criterion = CurativeStopCriterion::PreventiveObjectiveAndSecure;
        let tree = TreeParameters::for_curative_perimeter(&params, 30.0).unwrap();
        assert_eq!(tree.target_objective_value(), Some(-5.0));
    }

    #[test]
    fn automaton_never_shrinks() {
        let mut params = RaoParameters::default();
        params.range_actions.ra_range_shrinking = RaRangeShrinking::Enabled;
        params.multithreading.auto_leaves_in_parallel = 2;
        let tree = TreeParameters::for_automaton_perimeter(&params).unwrap();
        assert!(!tree.ra_range_shrinking());
        assert_eq!(tree.leaves_in_parallel(), 2);
        assert_eq!(tree.stop_criterion(), StopCriterion::AtTargetObjectiveValue(0.0));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(matches!(
            TreeParameters::new(StopCriterion::MinObjective, 1, 0, false),
            Err(RaoError::Config(_))
        ));
    }
}
