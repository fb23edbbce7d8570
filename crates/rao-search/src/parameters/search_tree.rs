use super::{
    LoopFlowParameters, MnecParameters, ObjectiveFunctionType, PstModel, RaoParameters, RelativeMarginsParameters,
    TreeParameters,
};
use crate::linear_problem::LpSolverKind;
use rao_core::{PerCategory, RaoResult, Unit};
use std::collections::{BTreeMap, BTreeSet};

/// Usage limits applied to one perimeter. `usize::MAX` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaLimits {
    pub max_ra: usize,
    pub max_tso: usize,
    pub max_topo_per_tso: BTreeMap<String, usize>,
    pub max_pst_per_tso: BTreeMap<String, usize>,
    pub max_ra_per_tso: BTreeMap<String, usize>,
}

impl Default for RaLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl RaLimits {
    pub fn unlimited() -> Self {
        Self {
            max_ra: usize::MAX,
            max_tso: usize::MAX,
            max_topo_per_tso: BTreeMap::new(),
            max_pst_per_tso: BTreeMap::new(),
            max_ra_per_tso: BTreeMap::new(),
        }
    }

    pub fn curative(params: &RaoParameters) -> Self {
        let limits = &params.ra_limits;
        Self {
            max_ra: limits.max_curative_ra.unwrap_or(usize::MAX),
            max_tso: limits.max_curative_tso.unwrap_or(usize::MAX),
            max_topo_per_tso: limits.max_curative_topo_per_tso.clone(),
            max_pst_per_tso: limits.max_curative_pst_per_tso.clone(),
            max_ra_per_tso: limits.max_curative_ra_per_tso.clone(),
        }
    }

    pub fn max_topo_for(&self, tso: &str) -> usize {
        self.max_topo_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn max_pst_for(&self, tso: &str) -> usize {
        self.max_pst_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn max_ra_for(&self, tso: &str) -> usize {
        self.max_ra_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_ra == usize::MAX
            && self.max_tso == usize::MAX
            && self.max_topo_per_tso.is_empty()
            && self.max_pst_per_tso.is_empty()
            && self.max_ra_per_tso.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkActionParameters {
    pub predefined_combinations: Vec<Vec<String>>,
    pub absolute_min_impact_threshold: f64,
    pub relative_min_impact_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearOptimizerParameters {
    pub max_iterations: usize,
    pub pst_model: PstModel,
    pub solver: LpSolverKind,
    pub penalty_costs: PerCategory<f64>,
    pub sensitivity_thresholds: PerCategory<f64>,
    pub ra_range_shrinking: bool,
}

/// Everything one search tree needs, resolved for a given perimeter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTreeParameters {
    pub objective_function: ObjectiveFunctionType,
    pub unit: Unit,
    pub tree: TreeParameters,
    pub network_actions: NetworkActionParameters,
    pub ra_limits: RaLimits,
    pub linear_optimizer: LinearOptimizerParameters,
    pub mnec: MnecParameters,
    pub relative_margins: RelativeMarginsParameters,
    pub loop_flow: Option<LoopFlowParameters>,
    pub operators_not_to_optimize: BTreeSet<String>,
    pub unoptimized_violation_cost: f64,
    pub sensitivity_failure_overcost: f64,
}

impl SearchTreeParameters {
    pub fn new(params: &RaoParameters, tree: TreeParameters, ra_limits: RaLimits) -> Self {
        let ra = &params.range_actions;
        Self {
            objective_function: params.objective_function.objective_type,
            unit: params.objective_function.unit,
            network_actions: NetworkActionParameters {
                predefined_combinations: params.topo_optimization.predefined_combinations.clone(),
                absolute_min_impact_threshold: params.topo_optimization.absolute_min_impact_threshold,
                relative_min_impact_threshold: params.topo_optimization.relative_min_impact_threshold,
            },
            ra_limits,
            linear_optimizer: LinearOptimizerParameters {
                max_iterations: ra.max_mip_iterations,
                pst_model: ra.pst_model,
                solver: ra.solver,
                penalty_costs: ra.penalty_costs(),
                sensitivity_thresholds: ra.sensitivity_thresholds(),
                ra_range_shrinking: tree.ra_range_shrinking(),
            },
            tree,
            mnec: params.mnec.clone(),
            relative_margins: params.relative_margins.clone(),
            loop_flow: params.loop_flow.clone(),
            operators_not_to_optimize: params.not_optimized.operators_not_to_optimize.clone(),
            unoptimized_violation_cost: params.not_optimized.margin_decrease_violation_cost,
            sensitivity_failure_overcost: params.sensitivity_failure_overcost,
        }
    }

    pub fn preventive(params: &RaoParameters) -> RaoResult<Self> {
        Ok(Self::new(
            params,
            TreeParameters::for_preventive_perimeter(params)?,
            RaLimits::unlimited(),
        ))
    }

    pub fn automaton(params: &RaoParameters) -> RaoResult<Self> {
        Ok(Self::new(
            params,
            TreeParameters::for_automaton_perimeter(params)?,
            RaLimits::unlimited(),
        ))
    }

    pub fn curative(params: &RaoParameters, preventive_optimized_cost: f64) -> RaoResult<Self> {
        Ok(Self::new(
            params,
            TreeParameters::for_curative_perimeter(params, preventive_optimized_cost)?,
            RaLimits::curative(params),
        ))
    }

    pub fn second_preventive(params: &RaoParameters) -> RaoResult<Self> {
        Ok(Self::new(
            params,
            TreeParameters::for_second_preventive_perimeter(params)?,
            RaLimits::unlimited(),
        ))
    }

    pub fn relative_ptdf_lower_bound(&self) -> Option<f64> {
        self.objective_function
            .relative_positive_margins()
            .then_some(self.relative_margins.ptdf_sum_lower_bound)
    }
}
