//! Range actions of a group share one setpoint: `S(ra) − G(group) = 0`.

use super::{FillerInput, ProblemFiller};
use crate::linear_problem::names;
use crate::linear_problem::LinearProblem;
use rao_core::{RangeAction, RaoResult};
use std::collections::BTreeMap;

pub struct RangeActionGroupFiller {
    groups: BTreeMap<String, Vec<String>>,
}

impl RangeActionGroupFiller {
    pub fn new(range_actions: &[RangeAction]) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ra in range_actions {
            if let Some(group) = &ra.group_id {
                groups.entry(group.clone()).or_default().push(ra.id.clone());
            }
        }
        Self { groups }
    }
}

impl ProblemFiller for RangeActionGroupFiller {
    fn name(&self) -> &'static str {
        "range_action_group"
    }

    fn fill(&mut self, problem: &mut LinearProblem, _input: &FillerInput<'_>) -> RaoResult<()> {
        for (group, members) in &self.groups {
            let group_setpoint =
                problem.add_variable(names::group_setpoint(group), f64::NEG_INFINITY, f64::INFINITY)?;
            for member in members {
                let setpoint = problem.variable(&names::setpoint(member))?;
                let c = problem.add_constraint(names::group_member_constraint(member, group), 0.0, 0.0)?;
                problem.set_coefficient(c, setpoint, 1.0);
                problem.set_coefficient(c, group_setpoint, -1.0);
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
    use super::super::{CoreProblemFiller, FillerSetup, MaxMinMarginFiller};
    use super::*;
    use crate::linear_problem::GoodLpBackend;
    use rao_core::{FlowCnec, RangeActionSetpoints};

    #[test]
    fn grouped_setpoints_move_together() {
        let cnecs = vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)];
        let ras = vec![
            RangeAction::hvdc("a", "dc-a", -50.0, 50.0).with_group("pair"),
            RangeAction::hvdc("b", "dc-b", -50.0, 50.0).with_group("pair"),
        ];
        let setpoints: RangeActionSetpoints =
            [("a".to_string(), 0.0), ("b".to_string(), 0.0)].into_iter().collect();
        // only `a` acts on the line, `b` is dragged along
        let (flows, sens) = snapshot(&cnecs, &[120.0], &[("line", "a", -1.0)]);
        let params = params();
        let setup = FillerSetup {
            network_name: "net",
            cnecs: &cnecs,
            range_actions: &ras,
            pre_perimeter_setpoints: &setpoints,
            pre_perimeter_flows: &flows,
            initial_flows: &flows,
            parameters: &params,
        };
        let mut problem = LinearProblem::new("root");
        let input = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &setpoints, iteration: 0 };
        CoreProblemFiller::new(&setup).fill(&mut problem, &input).unwrap();
        RangeActionGroupFiller::new(&ras).fill(&mut problem, &input).unwrap();
        MaxMinMarginFiller::new(&setup).fill(&mut problem, &input).unwrap();
        problem.solve(&GoodLpBackend::default());

        let a = problem.solution_value(problem.variable("setpoint_a").unwrap()).unwrap();
        let b = problem.solution_value(problem.variable("setpoint_b").unwrap()).unwrap();
        assert!((a - b).abs() < 1e-4);
        assert!(a > 49.0);
    }
}
