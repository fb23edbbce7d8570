//! Search tree behaviour on the synthetic linear network.

mod common;

use common::{assert_close, build_tree, perimeter, preventive, pst, LeafFixture, LINE};
use rao_core::synthetic::{ActionEffect, LinearNetwork};
use rao_core::{NetworkAction, NetworkActionCombination, Unit};
use rao_search::linear_problem::{LinearProblem, LinearSolution};
use rao_search::parameters::PreventiveStopCriterion;
use rao_search::{
    GoodLpBackend, Leaf, LeafStatus, LinearProblemStatus, RaoParameters, SolverBackend, TargetTieBreak,
};
use std::sync::Arc;

/// Rejects the linear problem of one leaf, solves the others.
struct RejectingBackend {
    rejected: &'static str,
    inner: GoodLpBackend,
}

impl SolverBackend for RejectingBackend {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn solve(&self, problem: &LinearProblem) -> LinearSolution {
        if problem.name() == self.rejected {
            LinearSolution::failed(LinearProblemStatus::Infeasible)
        } else {
            self.inner.solve(problem)
        }
    }
}

/// Element at its limit, a PST relieving it, and an action that loads the
/// element while halving the PST effect.
fn worsening_network() -> LinearNetwork {
    LinearNetwork::new("worsening")
        .with_flow(LINE, 100.0)
        .with_sensitivity(LINE, "pst", -1.0)
        .with_range_action("pst", 0.0)
        .with_action_effect(
            "worsen",
            ActionEffect {
                flow_shift: [(LINE.to_string(), 20.0)].into_iter().collect(),
                sensitivity_override: [((LINE.to_string(), "pst".to_string()), -0.5)].into_iter().collect(),
                ..ActionEffect::default()
            },
        )
}

#[test]
fn worsening_combination_keeps_setpoint_at_bound() {
    let fixture = LeafFixture::new(
        worsening_network(),
        perimeter(vec![NetworkAction::new("worsen")], vec![pst("pst")]),
    );
    let mut root = Leaf::root(&fixture.network, &[], &fixture.pre_perimeter);
    root.evaluate(fixture.ctx());
    assert_close(root.cost(), 0.0, "root margin at zero");
    root.optimize(fixture.ctx());
    let root = Arc::new(root);

    let worsen = NetworkActionCombination::single(Arc::clone(&fixture.perimeter.network_actions()[0]));
    let mut child = Leaf::child(&root, &fixture.network, worsen, false, fixture.ctx());
    child.evaluate(fixture.ctx());
    child.optimize(fixture.ctx());

    assert_eq!(child.status(), LeafStatus::Optimized);
    assert_eq!(child.setpoints().get("pst"), Some(5.0));
    let cnec = &fixture.perimeter.flow_cnecs()[0];
    let margin = child.flows().map(|f| f.margin(cnec, Unit::Megawatt)).unwrap_or(f64::NAN);
    // 100 + 20 − 0.5 × 5
    assert_close(margin, -17.5, "margin after worsening action");
    assert!(margin < 0.0);
    assert!(child.cost().is_finite());
    assert_close(child.cost(), -margin, "cost is the negated minimum margin");
}

#[test]
fn worsening_combination_is_not_selected() {
    let tree = build_tree(
        worsening_network(),
        perimeter(vec![NetworkAction::new("worsen")], vec![pst("pst")]),
        preventive(&RaoParameters::default()),
    );
    let result = tree.run();
    assert!(result.best_leaf.is_root());
    assert_close(result.cost(), -5.0, "root with PST at its last tap");
    assert_eq!(result.setpoints().get("pst"), Some(5.0));
}

fn target_network() -> LinearNetwork {
    LinearNetwork::new("target")
        .with_flow(LINE, 110.0)
        .with_flow_shift("exact", &[(LINE, -10.0)])
        .with_flow_shift("partial", &[(LINE, -4.0)])
}

fn secure_params(tie_break: TargetTieBreak) -> RaoParameters {
    let mut params = RaoParameters::default();
    params.objective_function.preventive_stop_criterion = PreventiveStopCriterion::Secure;
    params.objective_function.target_tie_break = tie_break;
    params.topo_optimization.max_search_tree_depth = 3;
    params
}

#[test]
fn target_reached_stops_at_that_depth() {
    let tree = build_tree(
        target_network(),
        perimeter(vec![NetworkAction::new("exact"), NetworkAction::new("partial")], vec![]),
        preventive(&secure_params(TargetTieBreak::FirstFinished)),
    );
    let result = tree.run();
    assert!(result.stop_criterion_reached);
    assert_eq!(result.depth, 1);
    assert_eq!(result.best_leaf.identifier(), "exact");
    assert_eq!(result.cost(), 0.0);
}

#[test]
fn deterministic_tie_break_explores_the_whole_depth() {
    let tree = build_tree(
        target_network(),
        perimeter(vec![NetworkAction::new("exact"), NetworkAction::new("partial")], vec![]),
        preventive(&secure_params(TargetTieBreak::Deterministic)),
    );
    let result = tree.run();
    assert!(result.stop_criterion_reached);
    assert_eq!(result.depth, 1);
    assert_eq!(result.best_leaf.identifier(), "exact");
}

fn infeasible_network() -> LinearNetwork {
    LinearNetwork::new("infeasible")
        .with_flow(LINE, 120.0)
        .with_sensitivity(LINE, "pst", -1.0)
        .with_range_action("pst", 0.0)
        .with_flow_shift("bad", &[(LINE, -30.0)])
        .with_flow_shift("good", &[(LINE, -10.0)])
}

fn infeasible_perimeter() -> rao_search::OptimizationPerimeter {
    perimeter(vec![NetworkAction::new("bad"), NetworkAction::new("good")], vec![pst("pst")])
}

#[test]
fn infeasible_leaf_costs_infinity() {
    let fixture = LeafFixture::new(infeasible_network(), infeasible_perimeter()).with_backend(Box::new(
        RejectingBackend {
            rejected: "bad",
            inner: GoodLpBackend::default(),
        },
    ));
    let root = Arc::new(Leaf::root(&fixture.network, &[], &fixture.pre_perimeter));
    let bad = NetworkActionCombination::single(Arc::clone(&fixture.perimeter.network_actions()[0]));
    let mut leaf = Leaf::child(&root, &fixture.network, bad, false, fixture.ctx());
    leaf.evaluate(fixture.ctx());
    assert_eq!(leaf.status(), LeafStatus::Evaluated);
    leaf.optimize(fixture.ctx());
    assert_eq!(leaf.status(), LeafStatus::Error);
    assert_eq!(leaf.linear_problem_status(), Some(LinearProblemStatus::Infeasible));
    assert!(leaf.cost().is_infinite() && leaf.cost() > 0.0);
}

#[test]
fn infeasible_sibling_is_skipped() {
    let mut params = RaoParameters::default();
    params.topo_optimization.max_search_tree_depth = 1;
    let tree = build_tree(infeasible_network(), infeasible_perimeter(), preventive(&params)).with_solver_backend(
        Arc::new(RejectingBackend {
            rejected: "bad",
            inner: GoodLpBackend::default(),
        }),
    );
    let result = tree.run();
    assert_eq!(result.best_leaf.identifier(), "good");
    // 120 − 10 − 5
    assert_close(result.cost(), 5.0, "sibling with feasible problem");
}

#[test]
fn infeasible_only_child_keeps_the_parent() {
    let mut params = RaoParameters::default();
    params.topo_optimization.max_search_tree_depth = 1;
    let tree = build_tree(
        infeasible_network(),
        perimeter(vec![NetworkAction::new("bad")], vec![pst("pst")]),
        preventive(&params),
    )
    .with_solver_backend(Arc::new(RejectingBackend {
        rejected: "bad",
        inner: GoodLpBackend::default(),
    }));
    let result = tree.run();
    assert!(result.best_leaf.is_root());
    assert_close(result.cost(), 15.0, "root with PST at its last tap");
}

#[test]
fn failed_sensitivity_never_aborts_the_tree() {
    let network = LinearNetwork::new("failing")
        .with_flow(LINE, 120.0)
        .with_flow_shift("good", &[(LINE, -10.0)])
        .with_action_effect(
            "broken",
            ActionEffect {
                fails_computation: true,
                ..ActionEffect::default()
            },
        );
    let mut params = RaoParameters::default();
    params.topo_optimization.max_search_tree_depth = 1;
    let tree = build_tree(
        network,
        perimeter(vec![NetworkAction::new("broken"), NetworkAction::new("good")], vec![]),
        preventive(&params),
    );
    let result = tree.run();
    assert_eq!(result.best_leaf.identifier(), "good");
    assert_close(result.cost(), 10.0, "flow 110 on a 100 MW limit");
}

#[test]
fn parallel_exploration_matches_sequential() {
    let network = || {
        LinearNetwork::new("parallel")
            .with_flow(LINE, 150.0)
            .with_sensitivity(LINE, "pst", -2.0)
            .with_range_action("pst", 0.0)
            .with_flow_shift("a", &[(LINE, -12.0)])
            .with_flow_shift("b", &[(LINE, -20.0)])
            .with_flow_shift("c", &[(LINE, -20.0)])
            .with_flow_shift("d", &[(LINE, 5.0)])
    };
    let actions = || ["a", "b", "c", "d"].into_iter().map(NetworkAction::new).collect::<Vec<_>>();

    let mut sequential = RaoParameters::default();
    sequential.topo_optimization.max_search_tree_depth = 2;
    let mut parallel = sequential.clone();
    parallel.multithreading.preventive_leaves_in_parallel = 4;

    let first = build_tree(network(), perimeter(actions(), vec![pst("pst")]), preventive(&sequential)).run();
    let second = build_tree(network(), perimeter(actions(), vec![pst("pst")]), preventive(&parallel)).run();
    assert_eq!(first.best_leaf.identifier(), second.best_leaf.identifier());
    // b and c tie; the identifier decides
    assert_eq!(first.best_leaf.identifier(), "b + c");
    assert_close(first.cost(), second.cost(), "same cost");
    // 150 − 40 − 2 × 5
    assert_close(first.cost(), 0.0, "best cost");
}

#[test]
fn optimized_cost_never_exceeds_evaluated_cost() {
    let network = LinearNetwork::new("monotonic")
        .with_flow(LINE, 130.0)
        .with_sensitivity(LINE, "pst", -3.0)
        .with_curvature(LINE, "pst", 0.1)
        .with_range_action("pst", 0.0)
        .with_flow_shift("a", &[(LINE, -10.0)])
        .with_flow_shift("b", &[(LINE, 15.0)]);
    let fixture = LeafFixture::new(
        network,
        perimeter(vec![NetworkAction::new("a"), NetworkAction::new("b")], vec![pst("pst")]),
    );
    let root = Arc::new(Leaf::root(&fixture.network, &[], &fixture.pre_perimeter));
    for action in fixture.perimeter.network_actions() {
        let combination = NetworkActionCombination::single(Arc::clone(action));
        let mut leaf = Leaf::child(&root, &fixture.network, combination, false, fixture.ctx());
        leaf.evaluate(fixture.ctx());
        let evaluated = leaf.cost();
        leaf.optimize(fixture.ctx());
        assert!(
            leaf.cost() <= evaluated + 1e-9,
            "{}: optimized {} worse than evaluated {}",
            leaf.identifier(),
            leaf.cost(),
            evaluated
        );
    }
}
