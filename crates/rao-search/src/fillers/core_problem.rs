//! Setpoint, absolute-variation and flow variables.
//!
//! ```text
//! min_adm(ra) ≤ S(ra) ≤ max_adm(ra)
//! AV(ra) ≥ S(ra) − S0(ra)      AV(ra) ≥ S0(ra) − S(ra)
//! F(c, side) − Σ_ra sens(c, side, ra)·S(ra) = f_ref(c, side) − Σ_ra sens(c, side, ra)·S_ref(ra)
//! ```
//!
//! `S0` is the pre-perimeter setpoint and `S_ref` the setpoint at which the
//! sensitivities were computed. Flows are always in MW.

use super::{FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::{names, LinearProblem};
use crate::parameters::PstModel;
use rao_core::{
    Boundable, FlowCnec, PerCategory, RangeAction, RangeActionSetpoints, RaoError, RaoResult, SensitivityHandled,
    Unit,
};
use tracing::trace;

/// Ranges shrink by this ratio at every relinearisation.
const RANGE_SHRINK_RATE: f64 = 0.667;

pub struct CoreProblemFiller {
    cnecs: Vec<FlowCnec>,
    range_actions: Vec<RangeAction>,
    pre_perimeter_setpoints: RangeActionSetpoints,
    sensitivity_thresholds: PerCategory<f64>,
    range_shrinking: bool,
    pst_model: PstModel,
}

impl CoreProblemFiller {
    pub fn new(setup: &FillerSetup<'_>) -> Self {
        let lin = &setup.parameters.linear_optimizer;
        Self {
            cnecs: setup.cnecs.to_vec(),
            range_actions: setup.range_actions.to_vec(),
            pre_perimeter_setpoints: setup.pre_perimeter_setpoints.clone(),
            sensitivity_thresholds: lin.sensitivity_thresholds,
            range_shrinking: lin.ra_range_shrinking,
            pst_model: lin.pst_model,
        }
    }

    fn pre_perimeter_setpoint(&self, ra: &RangeAction, input: &FillerInput<'_>) -> RaoResult<f64> {
        self.pre_perimeter_setpoints
            .get(&ra.id)
            .or_else(|| input.setpoints.get(&ra.id))
            .ok_or_else(|| RaoError::Contract(format!("no pre-perimeter setpoint for range action {}", ra.id)))
    }

    fn admissible_range(&self, ra: &RangeAction, input: &FillerInput<'_>) -> RaoResult<(f64, f64)> {
        let previous = self.pre_perimeter_setpoint(ra, input)?;
        Ok((ra.min_admissible_setpoint(previous), ra.max_admissible_setpoint(previous)))
    }

    fn add_range_action_variables(&self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        for ra in &self.range_actions {
            let previous = self.pre_perimeter_setpoint(ra, input)?;
            let (lb, ub) = self.admissible_range(ra, input)?;
            let setpoint = problem.add_variable(names::setpoint(&ra.id), lb, ub)?;
            let variation = problem.add_variable(names::absolute_variation(&ra.id), 0.0, f64::INFINITY)?;

            // AV − S ≥ −S0
            let positive = problem.add_constraint(
                names::absolute_variation_constraint(&ra.id, true),
                -previous,
                f64::INFINITY,
            )?;
            problem.set_coefficient(positive, variation, 1.0);
            problem.set_coefficient(positive, setpoint, -1.0);

            // AV + S ≥ S0
            let negative = problem.add_constraint(
                names::absolute_variation_constraint(&ra.id, false),
                previous,
                f64::INFINITY,
            )?;
            problem.set_coefficient(negative, variation, 1.0);
            problem.set_coefficient(negative, setpoint, 1.0);
        }
        Ok(())
    }

    fn add_flow_variables(&self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        for cnec in &self.cnecs {
            for side in cnec.monitored_sides() {
                problem.add_variable(names::flow(&cnec.id, side), f64::NEG_INFINITY, f64::INFINITY)?;
                problem.add_constraint(names::flow_constraint(&cnec.id, side), 0.0, 0.0)?;
            }
        }
        self.update_flow_constraints(problem, input)
    }

    fn update_flow_constraints(&self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        for cnec in &self.cnecs {
            for side in cnec.monitored_sides() {
                let flow = problem.variable(&names::flow(&cnec.id, side))?;
                let constraint = problem.constraint(&names::flow_constraint(&cnec.id, side))?;
                let reference_flow = input.flows.flow(cnec, side, Unit::Megawatt);
                if reference_flow.is_nan() {
                    return Err(RaoError::Contract(format!("no reference flow for {} on side {}", cnec.id, side)));
                }
                let mut rhs = reference_flow;
                problem.set_coefficient(constraint, flow, 1.0);
                for ra in &self.range_actions {
                    let setpoint = problem.variable(&names::setpoint(&ra.id))?;
                    let sensitivity = input.sensitivities.sensitivity(&cnec.id, side, &ra.id);
                    let reference_setpoint = input.setpoints.get(&ra.id).unwrap_or(0.0);
                    if ra.is_significant(sensitivity, &self.sensitivity_thresholds) {
                        problem.set_coefficient(constraint, setpoint, -sensitivity);
                        rhs -= sensitivity * reference_setpoint;
                    } else {
                        problem.set_coefficient(constraint, setpoint, 0.0);
                    }
                }
                problem.set_constraint_bounds(constraint, rhs, rhs);
            }
        }
        Ok(())
    }

    /// Restrict each setpoint around the current one, more at every iteration.
    fn update_range_shrinking(&self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        let exponent = i32::try_from(input.iteration).unwrap_or(i32::MAX);
        for ra in &self.range_actions {
            let (lb, ub) = self.admissible_range(ra, input)?;
            let current = input.setpoints.get(&ra.id).unwrap_or(lb);
            let half_width = (ub - lb) * RANGE_SHRINK_RATE.powi(exponent);
            let name = names::range_shrink(&ra.id);
            let constraint = match problem.find_constraint(&name) {
                Some(c) => c,
                None => {
                    let c = problem.add_constraint(name, f64::NEG_INFINITY, f64::INFINITY)?;
                    let setpoint = problem.variable(&names::setpoint(&ra.id))?;
                    problem.set_coefficient(c, setpoint, 1.0);
                    c
                }
            };
            trace!(range_action = %ra.id, iteration = input.iteration, half_width, "shrinking range");
            problem.set_constraint_bounds(constraint, current - half_width, current + half_width);
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(&mut self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        self.add_range_action_variables(problem, input)?;
        self.add_flow_variables(problem, input)
    }

    fn update_between_sensi_iteration(
        &mut self,
        problem: &mut LinearProblem,
        input: &FillerInput<'_>,
    ) -> RaoResult<()> {
        // undo tap narrowing of the previous solve iteration
        for ra in &self.range_actions {
            let setpoint = problem.variable(&names::setpoint(&ra.id))?;
            let (lb, ub) = self.admissible_range(ra, input)?;
            problem.set_variable_bounds(setpoint, lb, ub);
        }
        self.update_flow_constraints(problem, input)?;
        if self.range_shrinking && input.iteration >= 1 {
            self.update_range_shrinking(problem, input)?;
        }
        Ok(())
    }

    /// With approximated integers, pin each PST between the taps next to its rounded setpoint.
    fn update_between_solve_iteration(
        &mut self,
        problem: &mut LinearProblem,
        setpoints: &RangeActionSetpoints,
    ) -> RaoResult<()> {
        if self.pst_model != PstModel::ApproximatedIntegers {
            return Ok(());
        }
        for ra in &self.range_actions {
            let (Some(table), Some(current)) = (ra.tap_table(), setpoints.get(&ra.id)) else {
                continue;
            };
            let Some(tap) = table.closest_tap(current) else {
                continue;
            };
            let variable = problem.variable(&names::setpoint(&ra.id))?;
            let (lb, ub) = problem.variable_bounds(variable);
            let angles: Vec<f64> = [tap - 1, tap, tap + 1]
                .into_iter()
                .filter_map(|t| table.angle(t))
                .filter(|a| *a >= lb - 1e-9 && *a <= ub + 1e-9)
                .collect();
            let low = angles.iter().copied().fold(f64::INFINITY, f64::min);
            let high = angles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if low <= high {
                problem.set_variable_bounds(variable, low, high);
            }
        }
        Ok(())
    }
}
