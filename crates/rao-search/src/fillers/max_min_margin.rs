//! Minimum-margin variable and objective.
//!
//! For every optimized element and monitored side, with `k` converting the
//! objective unit into MW:
//!
//! ```text
//! MM·k ≤ F − f_min        MM·k ≤ f_max − F
//! minimise  −MM + Σ_ra (penalty(ra) + noise(ra))·AV(ra)
//! ```

use super::{FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::names::{self, MarginExtension};
use crate::linear_problem::LinearProblem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rao_core::{FlowCnec, PerCategory, RangeAction, RaoResult, SensitivityHandled, Side, Unit};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Upper bound of the random penalty added to each range action.
const MAX_TIE_BREAKING_NOISE: f64 = 0.001;

pub struct MaxMinMarginFiller {
    optimized_cnecs: Vec<FlowCnec>,
    range_actions: Vec<RangeAction>,
    unit: Unit,
    penalty_costs: PerCategory<f64>,
    network_name: String,
}

impl MaxMinMarginFiller {
    pub fn new(setup: &FillerSetup<'_>) -> Self {
        Self {
            optimized_cnecs: setup.cnecs.iter().filter(|c| c.optimized).cloned().collect(),
            range_actions: setup.range_actions.to_vec(),
            unit: setup.parameters.unit,
            penalty_costs: setup.parameters.linear_optimizer.penalty_costs,
            network_name: setup.network_name.to_string(),
        }
    }

    pub(crate) fn optimized_cnecs(&self) -> &[FlowCnec] {
        &self.optimized_cnecs
    }

    pub(crate) fn unit(&self) -> Unit {
        self.unit
    }

    fn add_minimum_margin_variable(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        if self.optimized_cnecs.is_empty() {
            // nothing to optimize: keep the problem bounded
            problem.add_variable(names::MIN_MARGIN, 0.0, 0.0)?;
        } else {
            problem.add_variable(names::MIN_MARGIN, f64::NEG_INFINITY, f64::INFINITY)?;
        }
        Ok(())
    }

    fn add_minimum_margin_constraints(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        let min_margin = problem.variable(names::MIN_MARGIN)?;
        for cnec in &self.optimized_cnecs {
            for side in cnec.monitored_sides() {
                let flow = problem.variable(&names::flow(&cnec.id, side))?;
                let k = unit_to_megawatt(cnec, side, self.unit);

                if let Some(lb) = cnec.lower_bound(side, Unit::Megawatt) {
                    // MM·k − F ≤ −f_min
                    let c = problem.add_constraint(
                        names::min_margin_constraint(&cnec.id, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        -lb,
                    )?;
                    problem.set_coefficient(c, min_margin, k);
                    problem.set_coefficient(c, flow, -1.0);
                }
                if let Some(ub) = cnec.upper_bound(side, Unit::Megawatt) {
                    // MM·k + F ≤ f_max
                    let c = problem.add_constraint(
                        names::min_margin_constraint(&cnec.id, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        ub,
                    )?;
                    problem.set_coefficient(c, min_margin, k);
                    problem.set_coefficient(c, flow, 1.0);
                }
            }
        }
        Ok(())
    }

    fn fill_objective(&self, problem: &mut LinearProblem) -> RaoResult<()> {
        let min_margin = problem.variable(names::MIN_MARGIN)?;
        problem.set_objective_coefficient(min_margin, -1.0);
        for ra in &self.range_actions {
            let variation = problem.variable(&names::absolute_variation(&ra.id))?;
            let cost = self.penalty_costs.get(ra.category()) + tie_breaking_noise(&self.network_name, &ra.id);
            problem.set_objective_coefficient(variation, cost);
        }
        Ok(())
    }
}

/// Multiplier turning a value in `unit` into MW on `side` of `cnec`.
pub(crate) fn unit_to_megawatt(cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
    1.0 / cnec.unit_multiplier(side, unit)
}

/// Small penalty, reproducible for a given network and range action, that
/// separates otherwise equivalent range actions.
pub(crate) fn tie_breaking_noise(network_name: &str, range_action_id: &str) -> f64 {
    let mut hasher = DefaultHasher::new();
    network_name.hash(&mut hasher);
    range_action_id.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());
    rng.gen::<f64>() * MAX_TIE_BREAKING_NOISE
}

impl ProblemFiller for MaxMinMarginFiller {
    fn name(&self) -> &'static str {
        "max_min_margin"
    }

    fn fill(&mut self, problem: &mut LinearProblem, _input: &FillerInput<'_>) -> RaoResult<()> {
        self.add_minimum_margin_variable(problem)?;
        self.add_minimum_margin_constraints(problem)?;
        self.fill_objective(problem)
    }

    fn update_between_sensi_iteration(
        &mut self,
        _problem: &mut LinearProblem,
        _input: &FillerInput<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }
}
