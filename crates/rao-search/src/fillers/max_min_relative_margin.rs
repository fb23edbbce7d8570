//! Minimum relative margin.
//!
//! Positive margins are divided by the absolute PTDF zonal sum of each
//! element, negative ones stay absolute. A binary `P` tells whether the
//! minimum margin is positive:
//!
//! ```text
//! MM ≤ 0                         P·maxNegRam − MM ≤ maxNegRam
//! MR ≥ 0                         MR − P·maxPosRelRam ≤ 0
//! MR·k·r + P·k·r·maxNegRelRam + F ≤ f_max + k·r·maxNegRelRam
//! MR·k·r + P·k·r·maxNegRelRam − F ≤ −f_min + k·r·maxNegRelRam
//! minimise  −MR − w·MM + penalties
//! ```
//!
//! where `r = max(ptdf_sum, lower_bound)` and `w` keeps negative margins
//! dominant over relative ones. Solvers without integer support relax `P`;
//! setpoints stay optimal but the value of `MR` is then only a bound.

use super::max_min_margin::unit_to_megawatt;
use super::{FillerInput, FillerSetup, MaxMinMarginFiller, ProblemFiller};
use crate::linear_problem::names::{self, MarginExtension};
use crate::linear_problem::{ConstraintId, LinearProblem};
use crate::parameters::PtdfApproximation;
use rao_core::{largest_cnec_threshold, FlowCnec, FlowResult, RaoResult, Side, Unit};
use std::collections::BTreeMap;

pub struct MaxMinRelativeMarginFiller {
    absolute: MaxMinMarginFiller,
    reference_flows: FlowResult,
    ptdf_approximation: PtdfApproximation,
    ptdf_sum_lower_bound: f64,
    negative_margin_coefficient: f64,
    max_positive_relative_ram: f64,
    max_negative_relative_ram: f64,
    max_negative_ram: f64,
    /// Upper bound last written on each relative margin constraint
    written_bounds: BTreeMap<ConstraintId, f64>,
}

impl MaxMinRelativeMarginFiller {
    pub fn new(setup: &FillerSetup<'_>) -> Self {
        let absolute = MaxMinMarginFiller::new(setup);
        let relative = &setup.parameters.relative_margins;
        let highest_threshold = largest_cnec_threshold(absolute.optimized_cnecs(), Unit::Megawatt);
        let max_positive_relative_ram = highest_threshold / relative.ptdf_sum_lower_bound;
        Self {
            absolute,
            reference_flows: FlowResult::new(),
            ptdf_approximation: relative.ptdf_approximation,
            ptdf_sum_lower_bound: relative.ptdf_sum_lower_bound,
            negative_margin_coefficient: relative.negative_margin_objective_coefficient,
            max_positive_relative_ram,
            max_negative_relative_ram: 5.0 * max_positive_relative_ram,
            max_negative_ram: 5.0 * highest_threshold,
            written_bounds: BTreeMap::new(),
        }
    }

    fn relative_coefficient(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.reference_flows
            .ptdf_zonal_sum(cnec, side)
            .max(self.ptdf_sum_lower_bound)
    }

    fn add_sign_variable(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        let min_margin = problem.variable(names::MIN_MARGIN)?;
        let (lb, _) = problem.variable_bounds(min_margin);
        problem.set_variable_bounds(min_margin, lb, 0.0);

        let sign = problem.add_integer_variable(names::MIN_RELATIVE_MARGIN_SIGN, 0.0, 1.0)?;
        let definition = problem.add_constraint(
            names::MIN_RELATIVE_MARGIN_SIGN_DEFINITION,
            f64::NEG_INFINITY,
            self.max_negative_ram,
        )?;
        problem.set_coefficient(definition, sign, self.max_negative_ram);
        problem.set_coefficient(definition, min_margin, -1.0);
        Ok(())
    }

    fn add_relative_margin_variable(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        let ub = if self.absolute.optimized_cnecs().is_empty() {
            0.0
        } else {
            f64::INFINITY
        };
        let relative = problem.add_variable(names::MIN_RELATIVE_MARGIN, 0.0, ub)?;
        let sign = problem.variable(names::MIN_RELATIVE_MARGIN_SIGN)?;
        let zero = problem.add_constraint(names::MIN_RELATIVE_MARGIN_SET_TO_ZERO, f64::NEG_INFINITY, 0.0)?;
        problem.set_coefficient(zero, relative, 1.0);
        problem.set_coefficient(zero, sign, -self.max_positive_relative_ram);
        Ok(())
    }

    fn add_relative_margin_constraints(&mut self, problem: &mut LinearProblem) -> RaoResult<()> {
        for cnec in self.absolute.optimized_cnecs() {
            for side in cnec.monitored_sides() {
                if let Some(lb) = cnec.lower_bound(side, Unit::Megawatt) {
                    problem.add_constraint(
                        names::min_relative_margin_constraint(&cnec.id, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        -lb,
                    )?;
                }
                if let Some(ub) = cnec.upper_bound(side, Unit::Megawatt) {
                    problem.add_constraint(
                        names::min_relative_margin_constraint(&cnec.id, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        ub,
                    )?;
                }
            }
        }
        self.update_relative_margin_constraints(problem)
    }

    /// Refresh coefficients and bounds from the reference PTDF sums.
    ///
    /// Offsets added to a bound by later fillers since it was last written
    /// (the unoptimized cnec relaxation) are carried over.
    fn update_relative_margin_constraints(&mut self, problem: &mut LinearProblem) -> RaoResult<()> {
        let relative = problem.variable(names::MIN_RELATIVE_MARGIN)?;
        let sign = problem.variable(names::MIN_RELATIVE_MARGIN_SIGN)?;
        let unit = self.absolute.unit();
        for cnec in self.absolute.optimized_cnecs() {
            for side in cnec.monitored_sides() {
                let flow = problem.variable(&names::flow(&cnec.id, side))?;
                let kr = unit_to_megawatt(cnec, side, unit) * self.relative_coefficient(cnec, side);
                let slack = kr * self.max_negative_relative_ram;
                let limits = [
                    (MarginExtension::BelowThreshold, cnec.lower_bound(side, Unit::Megawatt).map(|lb| -lb), -1.0),
                    (MarginExtension::AboveThreshold, cnec.upper_bound(side, Unit::Megawatt), 1.0),
                ];
                for (extension, bound, flow_coefficient) in limits {
                    let Some(bound) = bound else { continue };
                    let c = problem
                        .constraint(&names::min_relative_margin_constraint(&cnec.id, side, extension))?;
                    problem.set_coefficient(c, relative, kr);
                    problem.set_coefficient(c, sign, slack);
                    problem.set_coefficient(c, flow, flow_coefficient);
                    let offset = self
                        .written_bounds
                        .get(&c)
                        .map_or(0.0, |written| problem.constraint_bounds(c).1 - written);
                    problem.set_constraint_bounds(c, f64::NEG_INFINITY, bound + slack + offset);
                    self.written_bounds.insert(c, bound + slack);
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn name(&self) -> &'static str {
        "max_min_relative_margin"
    }

    fn fill(&mut self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        self.absolute.fill(problem, input)?;
        self.reference_flows = input.flows.clone();
        self.add_sign_variable(problem)?;
        self.add_relative_margin_variable(problem)?;
        self.add_relative_margin_constraints(problem)?;

        let min_margin = problem.variable(names::MIN_MARGIN)?;
        let relative = problem.variable(names::MIN_RELATIVE_MARGIN)?;
        problem.set_objective_coefficient(min_margin, -self.negative_margin_coefficient);
        problem.set_objective_coefficient(relative, -1.0);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        problem: &mut LinearProblem,
        input: &FillerInput<'_>,
    ) -> RaoResult<()> {
        if self.ptdf_approximation.should_update_ptdf_with_pst_change() {
            self.reference_flows = input.flows.clone();
            self.update_relative_margin_constraints(problem)?;
        }
        Ok(())
    }
}
