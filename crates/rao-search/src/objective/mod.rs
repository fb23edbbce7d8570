//! Objective function: one functional cost plus named virtual costs.
//!
//! The total cost of a situation is `functional + Σ virtual`. Lower is better.

mod evaluators;
mod margin;

pub use evaluators::{
    CostEvaluator, CostlyElement, LoopFlowViolationCostEvaluator, MinMarginEvaluator, MnecViolationCostEvaluator,
    SensitivityFailureOvercostEvaluator, UnoptimizedCnecViolationEvaluator,
};
pub use margin::{
    BasicMarginEvaluator, BasicRelativeMarginEvaluator, MarginEvaluator, MarginEvaluatorWithUnoptimizedCnecs,
};

use crate::parameters::SearchTreeParameters;
use rao_core::{FlowCnec, FlowResult, SensitivityResult};
use std::collections::BTreeMap;
use std::fmt;

/// Costs of one evaluated situation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveFunctionResult {
    functional_cost: f64,
    virtual_costs: BTreeMap<String, f64>,
    most_limiting_elements: Vec<CostlyElement>,
    costly_elements: BTreeMap<String, Vec<CostlyElement>>,
}

impl ObjectiveFunctionResult {
    /// Cost of a situation that could not be computed.
    pub fn infinite() -> Self {
        Self {
            functional_cost: f64::INFINITY,
            virtual_costs: BTreeMap::new(),
            most_limiting_elements: Vec::new(),
            costly_elements: BTreeMap::new(),
        }
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.functional_cost
    }

    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    /// Zero for an evaluator that is not part of the objective.
    pub fn virtual_cost_of(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }

    pub fn virtual_cost_names(&self) -> impl Iterator<Item = &str> {
        self.virtual_costs.keys().map(String::as_str)
    }

    /// At most `n` elements, smallest margin first.
    pub fn most_limiting_elements(&self, n: usize) -> &[CostlyElement] {
        &self.most_limiting_elements[..n.min(self.most_limiting_elements.len())]
    }

    /// At most `n` elements of one virtual cost, largest violation first.
    pub fn costly_elements(&self, name: &str, n: usize) -> &[CostlyElement] {
        match self.costly_elements.get(name) {
            Some(elements) => &elements[..n.min(elements.len())],
            None => &[],
        }
    }
}

impl fmt::Display for ObjectiveFunctionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cost {:.2} (functional: {:.2}, virtual: {:.2})",
            self.cost(),
            self.functional_cost,
            self.virtual_cost()
        )
    }
}

pub struct ObjectiveFunction {
    functional: Box<dyn CostEvaluator>,
    virtual_costs: Vec<Box<dyn CostEvaluator>>,
}

impl ObjectiveFunction {
    pub fn new(functional: Box<dyn CostEvaluator>, virtual_costs: Vec<Box<dyn CostEvaluator>>) -> Self {
        Self {
            functional,
            virtual_costs,
        }
    }

    /// Objective of one perimeter.
    ///
    /// `pre_perimeter_flows` anchors the unoptimized-element comparison,
    /// `initial_flows` the MNEC and loop-flow tolerances.
    pub fn build(
        cnecs: &[FlowCnec],
        pre_perimeter_flows: &FlowResult,
        initial_flows: &FlowResult,
        parameters: &SearchTreeParameters,
    ) -> Self {
        let mut margin_evaluator: Box<dyn MarginEvaluator> = match parameters.relative_ptdf_lower_bound() {
            Some(lb) => Box::new(BasicRelativeMarginEvaluator::new(lb)),
            None => Box::new(BasicMarginEvaluator),
        };
        if !parameters.operators_not_to_optimize.is_empty() {
            margin_evaluator = Box::new(MarginEvaluatorWithUnoptimizedCnecs::new(
                margin_evaluator,
                parameters.operators_not_to_optimize.clone(),
                pre_perimeter_flows.clone(),
            ));
        }
        let optimized: Vec<FlowCnec> = cnecs.iter().filter(|c| c.optimized).cloned().collect();
        let functional = MinMarginEvaluator::new(optimized, parameters.unit, margin_evaluator);

        let mut virtual_costs: Vec<Box<dyn CostEvaluator>> = Vec::new();
        let mnecs: Vec<FlowCnec> = cnecs.iter().filter(|c| c.monitored).cloned().collect();
        if !mnecs.is_empty() {
            virtual_costs.push(Box::new(MnecViolationCostEvaluator::new(
                mnecs,
                initial_flows.clone(),
                parameters.mnec.acceptable_margin_decrease,
                parameters.mnec.violation_cost,
            )));
        }
        if let Some(loop_flow) = &parameters.loop_flow {
            let constrained: Vec<FlowCnec> =
                cnecs.iter().filter(|c| c.loop_flow_threshold.is_some()).cloned().collect();
            if !constrained.is_empty() {
                virtual_costs.push(Box::new(LoopFlowViolationCostEvaluator::new(
                    constrained,
                    initial_flows.clone(),
                    loop_flow.acceptable_increase,
                    loop_flow.violation_cost,
                )));
            }
        }
        virtual_costs.push(Box::new(SensitivityFailureOvercostEvaluator::new(
            cnecs,
            parameters.sensitivity_failure_overcost,
        )));
        if parameters.unoptimized_violation_cost > 0.0 && !parameters.operators_not_to_optimize.is_empty() {
            let operators = &parameters.operators_not_to_optimize;
            let unoptimized: Vec<FlowCnec> = cnecs
                .iter()
                .filter(|c| c.optimized && c.operator.as_ref().is_some_and(|op| operators.contains(op)))
                .cloned()
                .collect();
            if !unoptimized.is_empty() {
                virtual_costs.push(Box::new(UnoptimizedCnecViolationEvaluator::new(
                    unoptimized,
                    pre_perimeter_flows.clone(),
                    parameters.unit,
                    parameters.unoptimized_violation_cost,
                )));
            }
        }
        Self::new(Box::new(functional), virtual_costs)
    }

    pub fn functional_name(&self) -> &str {
        self.functional.name()
    }

    pub fn virtual_cost_names(&self) -> Vec<&str> {
        self.virtual_costs.iter().map(|e| e.name()).collect()
    }

    pub fn evaluate(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> ObjectiveFunctionResult {
        let most_limiting_elements = self.functional.costly_elements(flows, sensitivities);
        let functional_cost = self.functional.compute_cost(flows, sensitivities);
        let mut virtual_costs = BTreeMap::new();
        let mut costly_elements = BTreeMap::new();
        for evaluator in &self.virtual_costs {
            virtual_costs.insert(evaluator.name().to_string(), evaluator.compute_cost(flows, sensitivities));
            costly_elements.insert(evaluator.name().to_string(), evaluator.costly_elements(flows, sensitivities));
        }
        ObjectiveFunctionResult {
            functional_cost,
            virtual_costs,
            most_limiting_elements,
            costly_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::RaoParameters;
    use rao_core::{ComputationStatus, Side};

    fn flows(values: &[(&str, f64)]) -> FlowResult {
        let mut f = FlowResult::new();
        for (id, v) in values {
            f.set_flow(id, Side::Left, *v);
        }
        f
    }

    #[test]
    fn cost_adds_functional_and_virtual_parts() {
        let cnecs = vec![
            FlowCnec::new("line", "preventive").with_symmetric_limit(100.0),
            FlowCnec::new("mnec", "preventive").with_symmetric_limit(100.0).monitored(false),
        ];
        let params = SearchTreeParameters::preventive(&RaoParameters::default()).unwrap();
        let initial = flows(&[("line", 90.0), ("mnec", 100.0)]);
        let objective = ObjectiveFunction::build(&cnecs, &initial, &initial, &params);
        assert_eq!(objective.functional_name(), "min_margin");
        assert_eq!(objective.virtual_cost_names(), vec!["mnec_violation", "sensitivity_failure"]);

        // mnec margin −60 against an allowed −50: 10 MW at cost 10
        let result = objective.evaluate(&flows(&[("line", 80.0), ("mnec", 160.0)]), &SensitivityResult::new());
        assert!((result.functional_cost() + 20.0).abs() < 1e-9);
        assert!((result.virtual_cost_of("mnec_violation") - 100.0).abs() < 1e-9);
        assert!((result.cost() - 80.0).abs() < 1e-9);
        assert_eq!(result.most_limiting_elements(5).len(), 1);
        assert_eq!(result.costly_elements("mnec_violation", 1)[0].cnec_id, "mnec");
    }

    #[test]
    fn failed_state_is_penalised() {
        let cnecs = vec![
            FlowCnec::new("a", "preventive").with_symmetric_limit(100.0),
            FlowCnec::new("b", "co1").with_symmetric_limit(100.0),
        ];
        let params = SearchTreeParameters::preventive(&RaoParameters::default()).unwrap();
        let f = flows(&[("a", 50.0), ("b", 99.0)]);
        let objective = ObjectiveFunction::build(&cnecs, &f, &f, &params);
        let mut sens = SensitivityResult::new();
        sens.set_state_status("co1", ComputationStatus::Failure);
        let result = objective.evaluate(&f, &sens);
        // "b" is skipped, "a" limits
        assert!((result.functional_cost() + 50.0).abs() < 1e-9);
        assert_eq!(result.virtual_cost_of("sensitivity_failure"), 10000.0);
    }

    #[test]
    fn infinite_result_never_wins() {
        let infinite = ObjectiveFunctionResult::infinite();
        assert!(infinite.cost().is_infinite());
        assert!(infinite.most_limiting_elements(3).is_empty());
    }
}
