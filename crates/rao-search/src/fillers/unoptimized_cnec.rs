//! Elements of some operators only count when their margin decreases.
//!
//! A binary `B` per element side tells whether the element is optimized. When
//! `B = 0` the element keeps at least its pre-perimeter margin, and its
//! minimum-margin constraints are relaxed by `bigM`:
//!
//! ```text
//! (f_max − F) ≥ m_pre − bigM·B          (F − f_min) ≥ m_pre − bigM·B
//! MM·k + F + bigM·B ≤ f_max + bigM      (same for the lower limit)
//! ```
//!
//! `bigM` is twice the largest threshold among the elements of the problem.
//! Must run after the margin filler; the relative margin constraints are
//! relaxed the same way when present.

use super::{FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::names::{self, MarginExtension};
use crate::linear_problem::{ConstraintId, LinearProblem, VariableId};
use rao_core::{largest_cnec_threshold, FlowCnec, FlowResult, RaoResult, Unit};

pub struct UnoptimizedCnecFiller {
    cnecs: Vec<FlowCnec>,
    pre_perimeter_flows: FlowResult,
    big_m: f64,
}

impl UnoptimizedCnecFiller {
    pub fn new(setup: &FillerSetup<'_>) -> Self {
        let operators = &setup.parameters.operators_not_to_optimize;
        Self {
            cnecs: setup
                .cnecs
                .iter()
                .filter(|c| c.optimized && c.operator.as_ref().is_some_and(|op| operators.contains(op)))
                .cloned()
                .collect(),
            pre_perimeter_flows: setup.pre_perimeter_flows.clone(),
            big_m: 2.0 * largest_cnec_threshold(setup.cnecs, Unit::Megawatt),
        }
    }

    fn relax(&self, problem: &mut LinearProblem, constraint: ConstraintId, binary: VariableId) {
        let (lb, ub) = problem.constraint_bounds(constraint);
        problem.set_coefficient(constraint, binary, self.big_m);
        problem.set_constraint_bounds(constraint, lb, ub + self.big_m);
    }
}

impl ProblemFiller for UnoptimizedCnecFiller {
    fn name(&self) -> &'static str {
        "unoptimized_cnec"
    }

    fn fill(&mut self, problem: &mut LinearProblem, _input: &FillerInput<'_>) -> RaoResult<()> {
        for cnec in &self.cnecs {
            for side in cnec.monitored_sides() {
                let flow = problem.variable(&names::flow(&cnec.id, side))?;
                let binary = problem.add_integer_variable(names::optimize_cnec(&cnec.id, side), 0.0, 1.0)?;
                let pre_margin = cnec.compute_margin(
                    self.pre_perimeter_flows.flow(cnec, side, Unit::Megawatt),
                    side,
                    Unit::Megawatt,
                );

                let limits = [
                    (MarginExtension::BelowThreshold, cnec.lower_bound(side, Unit::Megawatt)),
                    (MarginExtension::AboveThreshold, cnec.upper_bound(side, Unit::Megawatt)),
                ];
                for (extension, limit) in limits {
                    let Some(limit) = limit else { continue };
                    // −F + bigM·B ≥ m_pre − f_max   or   F + bigM·B ≥ m_pre + f_min
                    let (flow_coefficient, lower) = match extension {
                        MarginExtension::AboveThreshold => (-1.0, pre_margin - limit),
                        MarginExtension::BelowThreshold => (1.0, pre_margin + limit),
                    };
                    if lower.is_finite() {
                        let c = problem.add_constraint(
                            names::dont_optimize_cnec_constraint(&cnec.id, side, extension),
                            lower,
                            f64::INFINITY,
                        )?;
                        problem.set_coefficient(c, flow, flow_coefficient);
                        problem.set_coefficient(c, binary, self.big_m);
                    }

                    let min_margin = problem.constraint(&names::min_margin_constraint(&cnec.id, side, extension))?;
                    self.relax(problem, min_margin, binary);
                    if let Some(relative) =
                        problem.find_constraint(&names::min_relative_margin_constraint(&cnec.id, side, extension))
                    {
                        self.relax(problem, relative, binary);
                    }
                }
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

#[cfg(test)]
mod tests {
    use super::super::test_support::{params, snapshot};
    use super::super::{CoreProblemFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller};
    use super::*;
    use crate::parameters::{ObjectiveFunctionType, PtdfApproximation};
    use rao_core::{RangeActionSetpoints, Side};

    #[test]
    fn relaxes_margin_constraints_of_unoptimized_operators() {
        let cnecs = vec![
            FlowCnec::new("fr", "preventive").with_symmetric_limit(100.0).with_operator("FR"),
            FlowCnec::new("be", "preventive").with_symmetric_limit(300.0).with_operator("BE"),
        ];
        let setpoints = RangeActionSetpoints::new();
        let (flows, sens) = snapshot(&cnecs, &[60.0, 0.0], &[]);
        let mut params = params();
        params.operators_not_to_optimize.insert("FR".into());
        let setup = FillerSetup {
            network_name: "net",
            cnecs: &cnecs,
            range_actions: &[],
            pre_perimeter_setpoints: &setpoints,
            pre_perimeter_flows: &flows,
            initial_flows: &flows,
            parameters: &params,
        };
        let mut problem = LinearProblem::new("root");
        let input = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &setpoints, iteration: 0 };
        CoreProblemFiller::new(&setup).fill(&mut problem, &input).unwrap();
        MaxMinMarginFiller::new(&setup).fill(&mut problem, &input).unwrap();
        UnoptimizedCnecFiller::new(&setup).fill(&mut problem, &input).unwrap();

        let b = problem.variable(&names::optimize_cnec("fr", Side::Left)).unwrap();
        let mm = problem
            .constraint(&names::min_margin_constraint("fr", Side::Left, MarginExtension::AboveThreshold))
            .unwrap();
        assert_eq!(problem.coefficient(mm, b), 600.0);
        assert_eq!(problem.constraint_bounds(mm).1, 700.0);

        // pre-perimeter margin 40 on the upper limit: −F + 600·B ≥ 40 − 100
        let keep = problem
            .constraint(&names::dont_optimize_cnec_constraint("fr", Side::Left, MarginExtension::AboveThreshold))
            .unwrap();
        assert_eq!(problem.constraint_bounds(keep).0, -60.0);
        assert!(problem.find_variable(&names::optimize_cnec("be", Side::Left)).is_none());
    }

    #[test]
    fn relative_relaxation_survives_ptdf_update() {
        let cnecs = vec![
            FlowCnec::new("fr", "preventive").with_symmetric_limit(100.0).with_operator("FR"),
            FlowCnec::new("be", "preventive").with_symmetric_limit(300.0).with_operator("BE"),
        ];
        let setpoints = RangeActionSetpoints::new();
        let (mut flows, sens) = snapshot(&cnecs, &[60.0, 0.0], &[]);
        flows.set_ptdf_zonal_sum("fr", Side::Left, 0.5);
        flows.set_ptdf_zonal_sum("be", Side::Left, 1.0);
        let mut params = params();
        params.objective_function = ObjectiveFunctionType::MaxMinRelativeMargin;
        params.relative_margins.ptdf_approximation = PtdfApproximation::UpdatePtdfWithTopoAndPst;
        params.operators_not_to_optimize.insert("FR".into());
        let setup = FillerSetup {
            network_name: "net",
            cnecs: &cnecs,
            range_actions: &[],
            pre_perimeter_setpoints: &setpoints,
            pre_perimeter_flows: &flows,
            initial_flows: &flows,
            parameters: &params,
        };
        let mut problem = LinearProblem::new("root");
        let input = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &setpoints, iteration: 0 };
        let mut relative = MaxMinRelativeMarginFiller::new(&setup);
        let mut unoptimized = UnoptimizedCnecFiller::new(&setup);
        CoreProblemFiller::new(&setup).fill(&mut problem, &input).unwrap();
        relative.fill(&mut problem, &input).unwrap();
        unoptimized.fill(&mut problem, &input).unwrap();

        let b = problem.variable(&names::optimize_cnec("fr", Side::Left)).unwrap();
        let sign = problem.variable(names::MIN_RELATIVE_MARGIN_SIGN).unwrap();
        let row = problem
            .constraint(&names::min_relative_margin_constraint("fr", Side::Left, MarginExtension::AboveThreshold))
            .unwrap();
        let relaxation = |problem: &LinearProblem| {
            problem.constraint_bounds(row).1 - 100.0 - problem.coefficient(row, sign)
        };
        assert!((relaxation(&problem) - 600.0).abs() < 1e-6);
        let ub_before = problem.constraint_bounds(row).1;

        let mut updated = flows.clone();
        updated.set_ptdf_zonal_sum("fr", Side::Left, 0.8);
        let input = FillerInput { flows: &updated, sensitivities: &sens, setpoints: &setpoints, iteration: 1 };
        relative.update_between_sensi_iteration(&mut problem, &input).unwrap();
        unoptimized.update_between_sensi_iteration(&mut problem, &input).unwrap();

        assert!(problem.constraint_bounds(row).1 > ub_before);
        assert_eq!(problem.coefficient(row, b), 600.0);
        assert!((relaxation(&problem) - 600.0).abs() < 1e-6);
    }
}
