//! Monitored elements may not degrade beyond a tolerance.
//!
//! With `d` the acceptable margin decrease and `a` the adjustment coefficient:
//!
//! ```text
//! F − V ≤ max(f_max, f_init + d) − a
//! F + V ≥ min(f_min, f_init − d) + a
//! V ≥ 0, cost = violation_cost · k / #sides
//! ```

use super::{FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::names::{self, MarginExtension};
use crate::linear_problem::LinearProblem;
use rao_core::{FlowCnec, FlowResult, RaoResult, Unit};
use tracing::debug;

pub struct MnecFiller {
    mnecs: Vec<FlowCnec>,
    initial_flows: FlowResult,
    unit: Unit,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
    constraint_adjustment: f64,
}

impl MnecFiller {
    pub fn new(setup: &FillerSetup<'_>) -> Self {
        let mnec = &setup.parameters.mnec;
        Self {
            mnecs: setup.cnecs.iter().filter(|c| c.monitored).cloned().collect(),
            initial_flows: setup.initial_flows.clone(),
            unit: setup.parameters.unit,
            acceptable_margin_decrease: mnec.acceptable_margin_decrease,
            violation_cost: mnec.violation_cost,
            constraint_adjustment: mnec.constraint_adjustment_coefficient,
        }
    }
}

impl ProblemFiller for MnecFiller {
    fn name(&self) -> &'static str {
        "mnec"
    }

    fn fill(&mut self, problem: &mut LinearProblem, _input: &FillerInput<'_>) -> RaoResult<()> {
        for mnec in &self.mnecs {
            let sides = mnec.monitored_sides();
            for side in &sides {
                let side = *side;
                let initial = self.initial_flows.flow(mnec, side, Unit::Megawatt);
                if initial.is_nan() {
                    debug!(cnec = %mnec.id, "no initial flow, MNEC side skipped");
                    continue;
                }
                let flow = problem.variable(&names::flow(&mnec.id, side))?;
                let violation = problem.add_variable(names::mnec_violation(&mnec.id, side), 0.0, f64::INFINITY)?;

                if let Some(ub) = mnec.upper_bound(side, Unit::Megawatt) {
                    let bound = ub.max(initial + self.acceptable_margin_decrease) - self.constraint_adjustment;
                    let c = problem.add_constraint(
                        names::mnec_flow_constraint(&mnec.id, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        bound,
                    )?;
                    problem.set_coefficient(c, flow, 1.0);
                    problem.set_coefficient(c, violation, -1.0);
                }
                if let Some(lb) = mnec.lower_bound(side, Unit::Megawatt) {
                    let bound = lb.min(initial - self.acceptable_margin_decrease) + self.constraint_adjustment;
                    let c = problem.add_constraint(
                        names::mnec_flow_constraint(&mnec.id, side, MarginExtension::BelowThreshold),
                        bound,
                        f64::INFINITY,
                    )?;
                    problem.set_coefficient(c, flow, 1.0);
                    problem.set_coefficient(c, violation, 1.0);
                }

                let cost = self.violation_cost * mnec.unit_multiplier(side, self.unit) / sides.len() as f64;
                problem.set_objective_coefficient(violation, cost);
            }
        }
        Ok(())
    }

    fn update_between_sensi_iteration(
        &mut self,
        _problem: &mut LinearProblem,
        _input: &FillerInput<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }
}
