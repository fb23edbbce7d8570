//! Builders shared by the integration suites.
#![allow(dead_code)]

use rao_core::synthetic::{LinearNetwork, LinearSensitivityProvider};
use rao_core::{FlowCnec, NetworkAction, PstTapTable, RangeAction};
use rao_search::leaf::LeafContext;
use rao_search::{
    GoodLpBackend, ObjectiveFunction, OptimizationPerimeter, PrePerimeterResult, RaoParameters, SearchTree,
    SearchTreeParameters, SolverBackend,
};
use std::sync::Arc;

pub const LINE: &str = "line";

/// One preventive element with a ±100 MW limit.
pub fn perimeter(network_actions: Vec<NetworkAction>, range_actions: Vec<RangeAction>) -> OptimizationPerimeter {
    OptimizationPerimeter::new(
        "preventive",
        vec![FlowCnec::new(LINE, "preventive").with_symmetric_limit(100.0)],
        network_actions,
        range_actions,
    )
    .expect("valid perimeter")
}

/// PST with taps −5..=5, one degree per tap.
pub fn pst(id: &str) -> RangeAction {
    RangeAction::pst(id, id, PstTapTable::linear(-5, 5, 1.0))
}

pub fn build_tree(
    network: LinearNetwork,
    perimeter: OptimizationPerimeter,
    params: SearchTreeParameters,
) -> SearchTree<LinearNetwork, LinearSensitivityProvider> {
    let provider = Arc::new(LinearSensitivityProvider::new());
    let pre = PrePerimeterResult::compute(&network, &perimeter, provider.as_ref()).expect("pre-perimeter computation");
    SearchTree::new(network, perimeter, pre, provider, params).expect("valid search tree")
}

pub fn preventive(params: &RaoParameters) -> SearchTreeParameters {
    SearchTreeParameters::preventive(params).expect("valid parameters")
}

/// Owned inputs of a [`LeafContext`], for driving leaves by hand.
pub struct LeafFixture {
    pub network: LinearNetwork,
    pub perimeter: OptimizationPerimeter,
    pub pre_perimeter: PrePerimeterResult,
    pub objective: ObjectiveFunction,
    pub provider: LinearSensitivityProvider,
    pub params: SearchTreeParameters,
    pub backend: Box<dyn SolverBackend>,
}

impl LeafFixture {
    pub fn new(network: LinearNetwork, perimeter: OptimizationPerimeter) -> Self {
        let provider = LinearSensitivityProvider::new();
        let pre_perimeter = PrePerimeterResult::compute(&network, &perimeter, &provider).expect("pre-perimeter computation");
        let params = preventive(&RaoParameters::default());
        let objective = ObjectiveFunction::build(
            perimeter.flow_cnecs(),
            &pre_perimeter.flows,
            &pre_perimeter.initial_flows,
            &params,
        );
        Self {
            network,
            perimeter,
            pre_perimeter,
            objective,
            provider,
            params,
            backend: Box::new(GoodLpBackend::default()),
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn SolverBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn ctx(&self) -> LeafContext<'_, LinearSensitivityProvider> {
        LeafContext {
            perimeter: &self.perimeter,
            pre_perimeter: &self.pre_perimeter,
            objective: &self.objective,
            provider: &self.provider,
            parameters: &self.params,
            backend: self.backend.as_ref(),
        }
    }
}

pub fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}
