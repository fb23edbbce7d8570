//! Cost evaluators: the functional cost and the virtual (penalty) costs.

use super::margin::MarginEvaluator;
use rao_core::{
    largest_cnec_threshold, ComputationStatus, FlowCnec, FlowResult, SensitivityResult, Unit,
};
use std::collections::BTreeSet;

/// One element contributing to a cost, with its margin or violation.
#[derive(Debug, Clone, PartialEq)]
pub struct CostlyElement {
    pub cnec_id: String,
    pub value: f64,
}

pub trait CostEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn compute_cost(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> f64;

    /// Elements driving the cost, most costly first.
    fn costly_elements(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> Vec<CostlyElement>;
}

fn computed<'a>(
    cnecs: &'a [FlowCnec],
    sensitivities: &'a SensitivityResult,
) -> impl Iterator<Item = &'a FlowCnec> + 'a {
    cnecs
        .iter()
        .filter(move |c| sensitivities.status_for_state(&c.state) != ComputationStatus::Failure)
}

/// Sort by decreasing violation, then id.
fn sort_violations(mut elements: Vec<CostlyElement>) -> Vec<CostlyElement> {
    elements.retain(|e| e.value > 0.0);
    elements.sort_by(|a, b| {
        b.value.total_cmp(&a.value).then_with(|| a.cnec_id.cmp(&b.cnec_id))
    });
    elements
}

/// Functional cost: the opposite of the smallest margin.
pub struct MinMarginEvaluator {
    cnecs: Vec<FlowCnec>,
    unit: Unit,
    margin_evaluator: Box<dyn MarginEvaluator>,
    highest_threshold: f64,
}

impl MinMarginEvaluator {
    pub fn new(cnecs: Vec<FlowCnec>, unit: Unit, margin_evaluator: Box<dyn MarginEvaluator>) -> Self {
        let highest_threshold = largest_cnec_threshold(&cnecs, unit);
        Self {
            cnecs,
            unit,
            margin_evaluator,
            highest_threshold,
        }
    }
}

impl CostEvaluator for MinMarginEvaluator {
    fn name(&self) -> &str {
        "min_margin"
    }

    fn compute_cost(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> f64 {
        match self.costly_elements(flows, sensitivities).first() {
            Some(limiting) if limiting.value < f64::MAX / 2.0 => -limiting.value,
            _ => -self.highest_threshold,
        }
    }

    /// Elements sorted by increasing margin, ties by id.
    fn costly_elements(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> Vec<CostlyElement> {
        let mut elements: Vec<CostlyElement> = computed(&self.cnecs, sensitivities)
            .map(|c| CostlyElement {
                cnec_id: c.id.clone(),
                value: self.margin_evaluator.margin(flows, c, self.unit),
            })
            .filter(|e| !e.value.is_nan())
            .collect();
        elements.sort_by(|a, b| {
            a.value.total_cmp(&b.value).then_with(|| a.cnec_id.cmp(&b.cnec_id))
        });
        elements
    }
}

/// Penalises MNEC margins falling beyond the accepted decrease.
pub struct MnecViolationCostEvaluator {
    mnecs: Vec<FlowCnec>,
    initial_flows: FlowResult,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
}

impl MnecViolationCostEvaluator {
    pub fn new(mnecs: Vec<FlowCnec>, initial_flows: FlowResult, acceptable_margin_decrease: f64, violation_cost: f64) -> Self {
        Self {
            mnecs,
            initial_flows,
            acceptable_margin_decrease,
            violation_cost,
        }
    }

    /// MW beyond the allowed margin decrease.
    fn violation(&self, flows: &FlowResult, mnec: &FlowCnec) -> f64 {
        let initial = self.initial_flows.margin(mnec, Unit::Megawatt);
        let current = flows.margin(mnec, Unit::Megawatt);
        (initial - self.acceptable_margin_decrease).min(0.0) - current
    }
}

impl CostEvaluator for MnecViolationCostEvaluator {
    fn name(&self) -> &str {
        "mnec_violation"
    }

    fn compute_cost(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> f64 {
        let total: f64 = computed(&self.mnecs, sensitivities)
            .map(|m| self.violation(flows, m).max(0.0))
            .filter(|v| v.is_finite())
            .sum();
        self.violation_cost * total
    }

    fn costly_elements(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> Vec<CostlyElement> {
        sort_violations(
            computed(&self.mnecs, sensitivities)
                .map(|m| CostlyElement {
                    cnec_id: m.id.clone(),
                    value: self.violation(flows, m),
                })
                .filter(|e| e.value.is_finite())
                .collect(),
        )
    }
}

/// Penalises loop flows above their allowed value.
pub struct LoopFlowViolationCostEvaluator {
    cnecs: Vec<FlowCnec>,
    initial_flows: FlowResult,
    acceptable_increase: f64,
    violation_cost: f64,
}

impl LoopFlowViolationCostEvaluator {
    pub fn new(cnecs: Vec<FlowCnec>, initial_flows: FlowResult, acceptable_increase: f64, violation_cost: f64) -> Self {
        Self {
            cnecs,
            initial_flows,
            acceptable_increase,
            violation_cost,
        }
    }

    /// Largest excess over the sides, in MW.
    fn excess(&self, flows: &FlowResult, cnec: &FlowCnec) -> f64 {
        let Some(threshold) = cnec.loop_flow_threshold else {
            return 0.0;
        };
        cnec.monitored_sides()
            .into_iter()
            .map(|side| {
                let initial = self.initial_flows.loop_flow(cnec, side, Unit::Megawatt).abs();
                let allowed = if initial.is_nan() {
                    threshold
                } else {
                    threshold.max(initial + self.acceptable_increase)
                };
                let current = flows.loop_flow(cnec, side, Unit::Megawatt).abs();
                if current.is_nan() {
                    0.0
                } else {
                    (current - allowed).max(0.0)
                }
            })
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for LoopFlowViolationCostEvaluator {
    fn name(&self) -> &str {
        "loop_flow_violation"
    }

    fn compute_cost(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> f64 {
        let total: f64 = computed(&self.cnecs, sensitivities).map(|c| self.excess(flows, c)).sum();
        self.violation_cost * total
    }

    fn costly_elements(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> Vec<CostlyElement> {
        sort_violations(
            computed(&self.cnecs, sensitivities)
                .map(|c| CostlyElement {
                    cnec_id: c.id.clone(),
                    value: self.excess(flows, c),
                })
                .collect(),
        )
    }
}

/// Fixed overcost when some state could not be computed.
pub struct SensitivityFailureOvercostEvaluator {
    states: BTreeSet<String>,
    overcost: f64,
}

impl SensitivityFailureOvercostEvaluator {
    pub fn new(cnecs: &[FlowCnec], overcost: f64) -> Self {
        Self {
            states: cnecs.iter().map(|c| c.state.clone()).collect(),
            overcost,
        }
    }
}

impl CostEvaluator for SensitivityFailureOvercostEvaluator {
    fn name(&self) -> &str {
        "sensitivity_failure"
    }

    fn compute_cost(&self, _flows: &FlowResult, sensitivities: &SensitivityResult) -> f64 {
        let failed = self
            .states
            .iter()
            .any(|s| sensitivities.status_for_state(s) == ComputationStatus::Failure);
        if failed {
            self.overcost
        } else {
            0.0
        }
    }

    fn costly_elements(&self, _flows: &FlowResult, _sensitivities: &SensitivityResult) -> Vec<CostlyElement> {
        Vec::new()
    }
}

/// Penalises negative margins of unoptimized elements that got worse.
pub struct UnoptimizedCnecViolationEvaluator {
    cnecs: Vec<FlowCnec>,
    pre_perimeter_flows: FlowResult,
    unit: Unit,
    violation_cost: f64,
}

impl UnoptimizedCnecViolationEvaluator {
    pub fn new(cnecs: Vec<FlowCnec>, pre_perimeter_flows: FlowResult, unit: Unit, violation_cost: f64) -> Self {
        Self {
            cnecs,
            pre_perimeter_flows,
            unit,
            violation_cost,
        }
    }

    fn decrease(&self, flows: &FlowResult, cnec: &FlowCnec) -> f64 {
        let current = flows.margin(cnec, self.unit);
        if current >= 0.0 || !current.is_finite() {
            return 0.0;
        }
        let previous = self.pre_perimeter_flows.margin(cnec, self.unit);
        if previous.is_finite() {
            (previous - current).max(0.0)
        } else {
            0.0
        }
    }
}

impl CostEvaluator for UnoptimizedCnecViolationEvaluator {
    fn name(&self) -> &str {
        "unoptimized_margin_decrease"
    }

    fn compute_cost(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> f64 {
        let total: f64 = computed(&self.cnecs, sensitivities).map(|c| self.decrease(flows, c)).sum();
        self.violation_cost * total
    }

    fn costly_elements(&self, flows: &FlowResult, sensitivities: &SensitivityResult) -> Vec<CostlyElement> {
        sort_violations(
            computed(&self.cnecs, sensitivities)
                .map(|c| CostlyElement {
                    cnec_id: c.id.clone(),
                    value: self.decrease(flows, c),
                })
                .collect(),
        )
    }
}
