//! Loop-flow constraints.
//!
//! The loop flow is the flow minus its commercial part `CF`. With
//! `UB = max(threshold, |lf_init| + acceptable_increase) − adjustment`:
//!
//! ```text
//! F − V ≤ UB + CF        F + V ≥ −UB + CF        V ≥ 0
//! ```
//!
//! `CF` is recomputed between iterations only when the PTDF approximation
//! follows PST changes.

use super::{FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::names::{self, MarginExtension};
use crate::linear_problem::LinearProblem;
use crate::parameters::LoopFlowParameters;
use rao_core::{FlowCnec, FlowResult, RaoResult, Side, Unit};

pub struct LoopFlowFiller {
    cnecs: Vec<FlowCnec>,
    initial_flows: FlowResult,
    parameters: LoopFlowParameters,
}

impl LoopFlowFiller {
    pub fn new(setup: &FillerSetup<'_>, parameters: LoopFlowParameters) -> Self {
        Self {
            cnecs: setup
                .cnecs
                .iter()
                .filter(|c| c.loop_flow_threshold.is_some())
                .cloned()
                .collect(),
            initial_flows: setup.initial_flows.clone(),
            parameters,
        }
    }

    fn loop_flow_upper_bound(&self, cnec: &FlowCnec, side: Side, threshold: f64) -> f64 {
        let initial = self.initial_flows.loop_flow(cnec, side, Unit::Megawatt);
        let initial = if initial.is_nan() { 0.0 } else { initial.abs() };
        threshold.max(initial + self.parameters.acceptable_increase) - self.parameters.constraint_adjustment_coefficient
    }

    fn set_bounds(&self, problem: &mut LinearProblem, flows: &FlowResult) -> RaoResult<()> {
        for cnec in &self.cnecs {
            let Some(threshold) = cnec.loop_flow_threshold else { continue };
            for side in cnec.monitored_sides() {
                let ub = self.loop_flow_upper_bound(cnec, side, threshold);
                let commercial = flows.commercial_flow(cnec, side, Unit::Megawatt);
                let above = problem.constraint(&names::loop_flow_constraint(
                    &cnec.id,
                    side,
                    MarginExtension::AboveThreshold,
                ))?;
                problem.set_constraint_bounds(above, f64::NEG_INFINITY, ub + commercial);
                let below = problem.constraint(&names::loop_flow_constraint(
                    &cnec.id,
                    side,
                    MarginExtension::BelowThreshold,
                ))?;
                problem.set_constraint_bounds(below, -ub + commercial, f64::INFINITY);
            }
        }
        Ok(())
    }
}

impl ProblemFiller for LoopFlowFiller {
    fn name(&self) -> &'static str {
        "loop_flow"
    }

    fn fill(&mut self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()> {
        for cnec in &self.cnecs {
            let sides = cnec.monitored_sides();
            for side in &sides {
                let flow = problem.variable(&names::flow(&cnec.id, *side))?;
                let violation =
                    problem.add_variable(names::loop_flow_violation(&cnec.id, *side), 0.0, f64::INFINITY)?;
                let above = problem.add_constraint(
                    names::loop_flow_constraint(&cnec.id, *side, MarginExtension::AboveThreshold),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                problem.set_coefficient(above, flow, 1.0);
                problem.set_coefficient(above, violation, -1.0);
                let below = problem.add_constraint(
                    names::loop_flow_constraint(&cnec.id, *side, MarginExtension::BelowThreshold),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                problem.set_coefficient(below, flow, 1.0);
                problem.set_coefficient(below, violation, 1.0);
                problem.set_objective_coefficient(violation, self.parameters.violation_cost / sides.len() as f64);
            }
        }
        self.set_bounds(problem, input.flows)
    }

    fn update_between_sensi_iteration(
        &mut self,
        problem: &mut LinearProblem,
        input: &FillerInput<'_>,
    ) -> RaoResult<()> {
        if self.parameters.ptdf_approximation.should_update_ptdf_with_pst_change() {
            self.set_bounds(problem, input.flows)?;
        }
        Ok(())
    }
}
