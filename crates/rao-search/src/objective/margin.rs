//! How the margin of one element is measured.

use rao_core::{FlowCnec, FlowResult, Unit};
use std::collections::BTreeSet;

pub trait MarginEvaluator: Send + Sync {
    fn margin(&self, flows: &FlowResult, cnec: &FlowCnec, unit: Unit) -> f64;
}

/// Distance to the closest limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMarginEvaluator;

impl MarginEvaluator for BasicMarginEvaluator {
    fn margin(&self, flows: &FlowResult, cnec: &FlowCnec, unit: Unit) -> f64 {
        flows.margin(cnec, unit)
    }
}

/// Positive margins divided by the PTDF zonal sum.
#[derive(Debug, Clone, Copy)]
pub struct BasicRelativeMarginEvaluator {
    ptdf_sum_lower_bound: f64,
}

impl BasicRelativeMarginEvaluator {
    pub fn new(ptdf_sum_lower_bound: f64) -> Self {
        Self { ptdf_sum_lower_bound }
    }
}

impl MarginEvaluator for BasicRelativeMarginEvaluator {
    fn margin(&self, flows: &FlowResult, cnec: &FlowCnec, unit: Unit) -> f64 {
        flows.relative_margin(cnec, unit, self.ptdf_sum_lower_bound)
    }
}

/// Elements of some operators count only if their margin decreased.
///
/// Such an element reports an infinite margin unless it lost more than a
/// small fraction of its pre-perimeter margin.
pub struct MarginEvaluatorWithUnoptimizedCnecs {
    inner: Box<dyn MarginEvaluator>,
    operators_not_to_optimize: BTreeSet<String>,
    pre_perimeter_flows: FlowResult,
}

/// Relative decrease under which a margin is considered unchanged.
const MARGIN_DECREASE_TOLERANCE: f64 = 1e-4;

impl MarginEvaluatorWithUnoptimizedCnecs {
    pub fn new(
        inner: Box<dyn MarginEvaluator>,
        operators_not_to_optimize: BTreeSet<String>,
        pre_perimeter_flows: FlowResult,
    ) -> Self {
        Self {
            inner,
            operators_not_to_optimize,
            pre_perimeter_flows,
        }
    }

    fn is_unoptimized(&self, cnec: &FlowCnec) -> bool {
        cnec.operator
            .as_ref()
            .is_some_and(|op| self.operators_not_to_optimize.contains(op))
    }
}

impl MarginEvaluator for MarginEvaluatorWithUnoptimizedCnecs {
    fn margin(&self, flows: &FlowResult, cnec: &FlowCnec, unit: Unit) -> f64 {
        let new_margin = self.inner.margin(flows, cnec, unit);
        if !self.is_unoptimized(cnec) {
            return new_margin;
        }
        let previous = self.inner.margin(&self.pre_perimeter_flows, cnec, unit);
        if new_margin > previous - MARGIN_DECREASE_TOLERANCE * previous.abs() {
            f64::INFINITY
        } else {
            new_margin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::Side;

    fn flows(flow: f64) -> FlowResult {
        let mut f = FlowResult::new();
        f.set_flow("line", Side::Left, flow);
        f
    }

    #[test]
    fn unoptimized_element_counts_only_when_worse() {
        let cnec = FlowCnec::new("line", "preventive").with_symmetric_limit(100.0).with_operator("FR");
        let evaluator = MarginEvaluatorWithUnoptimizedCnecs::new(
            Box::new(BasicMarginEvaluator),
            ["FR".to_string()].into_iter().collect(),
            flows(120.0),
        );
        // pre-perimeter margin −20
        assert!(evaluator.margin(&flows(110.0), &cnec, Unit::Megawatt).is_infinite());
        assert!((evaluator.margin(&flows(130.0), &cnec, Unit::Megawatt) + 30.0).abs() < 1e-12);

        let other = FlowCnec::new("line", "preventive").with_symmetric_limit(100.0).with_operator("BE");
        assert!((evaluator.margin(&flows(110.0), &other, Unit::Megawatt) + 10.0).abs() < 1e-12);
    }
}
