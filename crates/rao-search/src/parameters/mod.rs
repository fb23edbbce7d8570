//! RAO parameters and their loading.
//!
//! [`RaoParameters`] mirrors the user-facing configuration file (TOML or
//! JSON). Every field has a default, so a file only needs to list what it
//! changes. The search tree consumes the narrower [`SearchTreeParameters`],
//! built per perimeter from a [`RaoParameters`].

mod search_tree;
mod tree;

pub use search_tree::{LinearOptimizerParameters, NetworkActionParameters, RaLimits, SearchTreeParameters};
pub use tree::{StopCriterion, TargetTieBreak, TreeParameters};

use crate::linear_problem::LpSolverKind;
use rao_core::{PerCategory, RaoError, RaoResult, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveFunctionType {
    #[default]
    MaxMinMargin,
    MaxMinRelativeMargin,
}

impl ObjectiveFunctionType {
    pub fn relative_positive_margins(&self) -> bool {
        matches!(self, ObjectiveFunctionType::MaxMinRelativeMargin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreventiveStopCriterion {
    #[default]
    MinObjective,
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurativeStopCriterion {
    #[default]
    MinObjective,
    Secure,
    /// Stop once the curative cost is no worse than the preventive one
    PreventiveObjective,
    PreventiveObjectiveAndSecure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveFunctionParameters {
    #[serde(rename = "type")]
    pub objective_type: ObjectiveFunctionType,
    pub unit: Unit,
    pub preventive_stop_criterion: PreventiveStopCriterion,
    pub curative_stop_criterion: CurativeStopCriterion,
    /// Improvement required of curative perimeters over the preventive cost
    pub curative_min_obj_improvement: f64,
    pub target_tie_break: TargetTieBreak,
}

impl Default for ObjectiveFunctionParameters {
    fn default() -> Self {
        Self {
            objective_type: ObjectiveFunctionType::MaxMinMargin,
            unit: Unit::Megawatt,
            preventive_stop_criterion: PreventiveStopCriterion::MinObjective,
            curative_stop_criterion: CurativeStopCriterion::MinObjective,
            curative_min_obj_improvement: 0.0,
            target_tie_break: TargetTieBreak::FirstFinished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PstModel {
    /// PST angles are continuous in the linear problem and rounded afterwards
    #[default]
    Continuous,
    /// Solve once more around the rounded tap before rounding
    ApproximatedIntegers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaRangeShrinking {
    #[default]
    Disabled,
    Enabled,
    /// Shrink in the first preventive and curative optimizations only
    EnabledInFirstPraoAndCrao,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionsOptimizationParameters {
    pub max_mip_iterations: usize,
    pub pst_penalty_cost: f64,
    pub hvdc_penalty_cost: f64,
    pub injection_penalty_cost: f64,
    pub pst_sensitivity_threshold: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_sensitivity_threshold: f64,
    pub pst_model: PstModel,
    pub ra_range_shrinking: RaRangeShrinking,
    pub solver: LpSolverKind,
}

impl Default for RangeActionsOptimizationParameters {
    fn default() -> Self {
        Self {
            max_mip_iterations: 10,
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            pst_sensitivity_threshold: 1e-6,
            hvdc_sensitivity_threshold: 1e-6,
            injection_sensitivity_threshold: 1e-6,
            pst_model: PstModel::Continuous,
            ra_range_shrinking: RaRangeShrinking::Disabled,
            solver: LpSolverKind::default(),
        }
    }
}

impl RangeActionsOptimizationParameters {
    pub fn penalty_costs(&self) -> PerCategory<f64> {
        PerCategory {
            pst: self.pst_penalty_cost,
            hvdc: self.hvdc_penalty_cost,
            injection: self.injection_penalty_cost,
        }
    }

    pub fn sensitivity_thresholds(&self) -> PerCategory<f64> {
        PerCategory {
            pst: self.pst_sensitivity_threshold,
            hvdc: self.hvdc_sensitivity_threshold,
            injection: self.injection_sensitivity_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoOptimizationParameters {
    pub max_search_tree_depth: usize,
    pub relative_min_impact_threshold: f64,
    pub absolute_min_impact_threshold: f64,
    /// Network action ids that should also be tried together
    pub predefined_combinations: Vec<Vec<String>>,
}

impl Default for TopoOptimizationParameters {
    fn default() -> Self {
        Self {
            max_search_tree_depth: 2,
            relative_min_impact_threshold: 0.0,
            absolute_min_impact_threshold: 0.0,
            predefined_combinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultithreadingParameters {
    pub preventive_leaves_in_parallel: usize,
    pub auto_leaves_in_parallel: usize,
    pub curative_leaves_in_parallel: usize,
}

impl Default for MultithreadingParameters {
    fn default() -> Self {
        Self {
            preventive_leaves_in_parallel: 1,
            auto_leaves_in_parallel: 1,
            curative_leaves_in_parallel: 1,
        }
    }
}

/// Curative usage limits; preventive perimeters are unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaLimitsParameters {
    pub max_curative_ra: Option<usize>,
    pub max_curative_tso: Option<usize>,
    pub max_curative_topo_per_tso: BTreeMap<String, usize>,
    pub max_curative_pst_per_tso: BTreeMap<String, usize>,
    pub max_curative_ra_per_tso: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    /// MW an MNEC margin may lose before it is penalised
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    /// MW subtracted from MNEC bounds in the linear problem
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtdfApproximation {
    #[default]
    FixedPtdf,
    UpdatePtdfWithTopo,
    UpdatePtdfWithTopoAndPst,
}

impl PtdfApproximation {
    pub fn should_update_ptdf_with_topological_change(&self) -> bool {
        !matches!(self, PtdfApproximation::FixedPtdf)
    }

    pub fn should_update_ptdf_with_pst_change(&self) -> bool {
        matches!(self, PtdfApproximation::UpdatePtdfWithTopoAndPst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginsParameters {
    pub ptdf_sum_lower_bound: f64,
    pub ptdf_approximation: PtdfApproximation,
    /// Weight of the absolute minimum margin while it is negative
    pub negative_margin_objective_coefficient: f64,
}

impl Default for RelativeMarginsParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
            ptdf_approximation: PtdfApproximation::FixedPtdf,
            negative_margin_objective_coefficient: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    /// MW a loop flow may grow over its initial value
    pub acceptable_increase: f64,
    pub ptdf_approximation: PtdfApproximation,
    pub constraint_adjustment_coefficient: f64,
    pub violation_cost: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            acceptable_increase: 0.0,
            ptdf_approximation: PtdfApproximation::FixedPtdf,
            constraint_adjustment_coefficient: 0.0,
            violation_cost: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotOptimizedCnecsParameters {
    /// Operators whose elements only count when their margin decreases
    pub operators_not_to_optimize: BTreeSet<String>,
    /// Cost per MW of margin lost on such an element; 0 disables the penalty
    pub margin_decrease_violation_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaoParameters {
    pub objective_function: ObjectiveFunctionParameters,
    pub range_actions: RangeActionsOptimizationParameters,
    pub topo_optimization: TopoOptimizationParameters,
    pub multithreading: MultithreadingParameters,
    pub ra_limits: RaLimitsParameters,
    pub mnec: MnecParameters,
    pub relative_margins: RelativeMarginsParameters,
    /// Loop-flow constraints are only modelled when this section is present
    pub loop_flow: Option<LoopFlowParameters>,
    pub not_optimized: NotOptimizedCnecsParameters,
    /// Cost added once when a sensitivity computation fails for some state
    pub sensitivity_failure_overcost: f64,
}

impl Default for RaoParameters {
    fn default() -> Self {
        Self {
            objective_function: ObjectiveFunctionParameters::default(),
            range_actions: RangeActionsOptimizationParameters::default(),
            topo_optimization: TopoOptimizationParameters::default(),
            multithreading: MultithreadingParameters::default(),
            ra_limits: RaLimitsParameters::default(),
            mnec: MnecParameters::default(),
            relative_margins: RelativeMarginsParameters::default(),
            loop_flow: None,
            not_optimized: NotOptimizedCnecsParameters::default(),
            sensitivity_failure_overcost: 10000.0,
        }
    }
}

impl RaoParameters {
    pub fn from_toml_str(content: &str) -> RaoResult<Self> {
        let params: RaoParameters =
            toml::from_str(content).map_err(|e| RaoError::Config(format!("invalid TOML parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_str(content: &str) -> RaoResult<Self> {
        let params: RaoParameters = serde_json::from_str(content)
            .map_err(|e| RaoError::Config(format!("invalid JSON parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load(path: impl AsRef<Path>) -> RaoResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn to_toml_string(&self) -> RaoResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> RaoResult<()> {
        let ra = &self.range_actions;
        if ra.max_mip_iterations == 0 {
            return Err(RaoError::Config("max_mip_iterations must be at least 1".into()));
        }
        for (name, value) in [
            ("pst_penalty_cost", ra.pst_penalty_cost),
            ("hvdc_penalty_cost", ra.hvdc_penalty_cost),
            ("injection_penalty_cost", ra.injection_penalty_cost),
            ("pst_sensitivity_threshold", ra.pst_sensitivity_threshold),
            ("hvdc_sensitivity_threshold", ra.hvdc_sensitivity_threshold),
            ("injection_sensitivity_threshold", ra.injection_sensitivity_threshold),
            ("mnec.acceptable_margin_decrease", self.mnec.acceptable_margin_decrease),
            ("mnec.violation_cost", self.mnec.violation_cost),
            ("sensitivity_failure_overcost", self.sensitivity_failure_overcost),
            (
                "not_optimized.margin_decrease_violation_cost",
                self.not_optimized.margin_decrease_violation_cost,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RaoError::Config(format!("{} must be a non-negative number, got {}", name, value)));
            }
        }
        let threads = &self.multithreading;
        if threads.preventive_leaves_in_parallel == 0
            || threads.auto_leaves_in_parallel == 0
            || threads.curative_leaves_in_parallel == 0
        {
            return Err(RaoError::Config("leaves_in_parallel must be at least 1".into()));
        }
        if self.relative_margins.ptdf_sum_lower_bound <= 0.0 {
            return Err(RaoError::Config("ptdf_sum_lower_bound must be strictly positive".into()));
        }
        if let Some(loop_flow) = &self.loop_flow {
            if loop_flow.violation_cost < 0.0 || loop_flow.acceptable_increase < 0.0 {
                return Err(RaoError::Config("loop-flow costs and tolerances must be non-negative".into()));
            }
        }
        Ok(())
    }
}
