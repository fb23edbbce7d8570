//! Problem fillers: each adds one family of variables and constraints.
//!
//! Fillers run in a fixed order, and later fillers look up variables created by
//! earlier ones through [`crate::linear_problem::names`]. A filler that needs
//! a variable nobody created fails with [`rao_core::RaoError::Contract`].

mod core_problem;
mod loop_flow;
mod max_min_margin;
mod max_min_relative_margin;
mod mnec;
mod range_action_group;
mod unoptimized_cnec;

pub use self::core_problem::CoreProblemFiller;
pub use self::loop_flow::LoopFlowFiller;
pub use self::max_min_margin::MaxMinMarginFiller;
pub use self::max_min_relative_margin::MaxMinRelativeMarginFiller;
pub use self::mnec::MnecFiller;
pub use self::range_action_group::RangeActionGroupFiller;
pub use self::unoptimized_cnec::UnoptimizedCnecFiller;

use crate::linear_problem::LinearProblem;
use crate::parameters::{ObjectiveFunctionType, SearchTreeParameters};
use rao_core::{FlowCnec, FlowResult, RangeAction, RangeActionSetpoints, RaoResult, SensitivityResult};

/// Snapshot the linear problem is (re)built around.
#[derive(Debug, Clone, Copy)]
pub struct FillerInput<'a> {
    pub flows: &'a FlowResult,
    pub sensitivities: &'a SensitivityResult,
    /// Setpoints at which `flows` and `sensitivities` were computed
    pub setpoints: &'a RangeActionSetpoints,
    /// 0 when filling, then the index of the iteration about to be solved
    pub iteration: usize,
}

pub trait ProblemFiller: Send {
    fn name(&self) -> &'static str;

    fn fill(&mut self, problem: &mut LinearProblem, input: &FillerInput<'_>) -> RaoResult<()>;

    /// Refresh coefficients after a new sensitivity computation.
    fn update_between_sensi_iteration(&mut self, problem: &mut LinearProblem, input: &FillerInput<'_>)
        -> RaoResult<()>;

    /// Adjust the problem between two solves on the same linearisation.
    fn update_between_solve_iteration(
        &mut self,
        _problem: &mut LinearProblem,
        _setpoints: &RangeActionSetpoints,
    ) -> RaoResult<()> {
        Ok(())
    }
}

/// Data shared by all fillers of one linear optimization.
#[derive(Debug, Clone, Copy)]
pub struct FillerSetup<'a> {
    pub network_name: &'a str,
    /// Elements in states whose sensitivity computation succeeded
    pub cnecs: &'a [FlowCnec],
    pub range_actions: &'a [RangeAction],
    pub pre_perimeter_setpoints: &'a RangeActionSetpoints,
    pub pre_perimeter_flows: &'a FlowResult,
    pub initial_flows: &'a FlowResult,
    pub parameters: &'a SearchTreeParameters,
}

/// Build the filler chain in execution order.
pub fn build_fillers(setup: &FillerSetup<'_>) -> Vec<Box<dyn ProblemFiller>> {
    let params = setup.parameters;
    let mut fillers: Vec<Box<dyn ProblemFiller>> = vec![Box::new(CoreProblemFiller::new(setup))];

    if setup.range_actions.iter().any(|ra| ra.group_id.is_some()) {
        fillers.push(Box::new(RangeActionGroupFiller::new(setup.range_actions)));
    }

    match params.objective_function {
        ObjectiveFunctionType::MaxMinMargin => fillers.push(Box::new(MaxMinMarginFiller::new(setup))),
        ObjectiveFunctionType::MaxMinRelativeMargin => {
            fillers.push(Box::new(MaxMinRelativeMarginFiller::new(setup)))
        }
    }

    if setup.cnecs.iter().any(|c| c.monitored) {
        fillers.push(Box::new(MnecFiller::new(setup)));
    }

    if let Some(loop_flow) = &params.loop_flow {
        if setup.cnecs.iter().any(|c| c.loop_flow_threshold.is_some()) {
            fillers.push(Box::new(LoopFlowFiller::new(setup, loop_flow.clone())));
        }
    }

    let has_unoptimized = setup.cnecs.iter().any(|c| {
        c.optimized
            && c.operator
                .as_ref()
                .is_some_and(|op| params.operators_not_to_optimize.contains(op))
    });
    if has_unoptimized {
        fillers.push(Box::new(UnoptimizedCnecFiller::new(setup)));
    }

    fillers
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn chain_order_follows_available_data() {
        let cnecs = vec![
            FlowCnec::new("line", "preventive").with_symmetric_limit(100.0).with_operator("FR"),
            FlowCnec::new("mnec", "preventive").with_symmetric_limit(100.0).monitored(false),
        ];
        let ras = vec![RangeAction::hvdc("a", "dc", -1.0, 1.0).with_group("g")];
        let (flows, _) = snapshot(&cnecs, &[50.0, 20.0], &[]);
        let setpoints = RangeActionSetpoints::new();
        let mut params = params();
        params.operators_not_to_optimize.insert("FR".into());
        let setup = FillerSetup {
            network_name: "net",
            cnecs: &cnecs,
            range_actions: &ras,
            pre_perimeter_setpoints: &setpoints,
            pre_perimeter_flows: &flows,
            initial_flows: &flows,
            parameters: &params,
        };
        let names: Vec<&str> = build_fillers(&setup).iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["core", "range_action_group", "max_min_margin", "mnec", "unoptimized_cnec"]);
    }
}
