//! Combination filters and usage limits.

mod common;

use common::{build_tree, perimeter, pst, LINE};
use rao_core::synthetic::LinearNetwork;
use rao_core::{ElementaryAction, NetworkAction, NetworkActionCombination, SwitchState};
use rao_search::bloomer::Bloomer;
use rao_search::filters::{Candidates, FilterChain, MaxRaFilter, NetworkActionCombinationFilter};
use rao_search::parameters::RaLimits;
use rao_search::{ActivatedActions, RaoParameters, SearchTreeParameters};
use std::collections::BTreeSet;
use std::sync::Arc;

fn action(id: &str) -> Arc<NetworkAction> {
    Arc::new(NetworkAction::new(id).with_operator("FR"))
}

fn combination(actions: &[&Arc<NetworkAction>]) -> NetworkActionCombination {
    NetworkActionCombination::new(actions.iter().map(|a| Arc::clone(a)), actions.len() > 1)
}

fn ids(candidates: &Candidates) -> BTreeSet<String> {
    candidates.keys().map(|c| c.concatenated_id().to_string()).collect()
}

fn holding(actions: &[&Arc<NetworkAction>]) -> ActivatedActions {
    ActivatedActions {
        network_actions: actions.iter().map(|a| Arc::clone(a)).collect(),
        range_actions: vec![],
    }
}

#[test]
fn union_over_the_cap_is_dropped() {
    let (a, b, c, d) = (action("a"), action("b"), action("c"), action("d"));
    let candidates: Candidates = [
        combination(&[&b]),
        combination(&[&c, &d]),
        combination(&[&b, &c, &d]),
    ]
    .into_iter()
    .map(|c| (c, false))
    .collect();
    // parent holds "a": 1 + 1 and 1 + 2 fit a cap of 3, 1 + 3 does not
    let kept = MaxRaFilter::new(3).filter(candidates, &holding(&[&a]));
    let expected: BTreeSet<String> = ["b", "c + d"].into_iter().map(String::from).collect();
    assert_eq!(ids(&kept), expected);
}

#[test]
fn cap_boundary_is_inclusive() {
    let (applied, x, y, z) = (action("applied"), action("x"), action("y"), action("z"));
    let activated = holding(&[&applied]);
    let max_ra = 3;
    let at_cap = combination(&[&x, &y]);
    let over_cap = combination(&[&x, &y, &z]);
    assert_eq!(at_cap.len(), max_ra - activated.network_actions.len());
    let candidates: Candidates = [(at_cap, false), (over_cap, false)].into_iter().collect();
    let kept = MaxRaFilter::new(max_ra).filter(candidates, &activated);
    assert_eq!(ids(&kept), ["x + y".to_string()].into_iter().collect());
}

#[test]
fn reset_flag_accounts_for_range_actions() {
    let (applied, x) = (action("applied"), action("x"));
    let activated = ActivatedActions {
        network_actions: vec![Arc::clone(&applied)],
        range_actions: vec![pst("pst").with_operator("FR")],
    };
    let candidates: Candidates = [(combination(&[&x]), false)].into_iter().collect();
    let kept = MaxRaFilter::new(2).filter(candidates, &activated);
    assert_eq!(kept.values().copied().collect::<Vec<_>>(), vec![true]);
}

#[test]
fn filter_chain_is_idempotent() {
    let open = Arc::new(
        NetworkAction::new("open")
            .with_operator("FR")
            .with_elementary_action(ElementaryAction::Topology {
                element: "breaker".into(),
                state: SwitchState::Open,
            }),
    );
    let close = Arc::new(
        NetworkAction::new("close")
            .with_operator("BE")
            .with_elementary_action(ElementaryAction::Topology {
                element: "breaker".into(),
                state: SwitchState::Close,
            }),
    );
    let (a, b, c) = (action("a"), action("b"), Arc::new(NetworkAction::new("c").with_operator("NL")));
    let mut limits = RaLimits {
        max_ra: 3,
        max_tso: 2,
        ..RaLimits::unlimited()
    };
    limits.max_topo_per_tso.insert("FR".into(), 2);
    let chain = FilterChain::for_limits(&limits);
    let activated = holding(&[&a]);
    let candidates: Candidates = [
        combination(&[&open, &close]),
        combination(&[&b]),
        combination(&[&b, &c]),
        combination(&[&c, &close]),
        combination(&[&open, &b, &c]),
    ]
    .into_iter()
    .map(|c| (c, false))
    .collect();

    let once = chain.apply(candidates, &activated);
    let twice = chain.apply(once.clone(), &activated);
    assert_eq!(once, twice);
    assert!(!ids(&once).contains("close + open"), "conflicting actions are dropped");
    assert!(!ids(&once).contains("b + c + open"), "cap of 3 with one applied");
}

#[test]
fn bloomer_applies_the_chain() {
    let perimeter = perimeter(
        vec![NetworkAction::new("a"), NetworkAction::new("b"), NetworkAction::new("c")],
        vec![],
    );
    let predefined = vec![vec!["b".to_string(), "c".to_string()], vec!["a".to_string(), "b".to_string()]];
    let limits = RaLimits {
        max_ra: 2,
        ..RaLimits::unlimited()
    };
    let bloomer = Bloomer::new(&perimeter, &predefined, FilterChain::for_limits(&limits));
    let activated = ActivatedActions {
        network_actions: vec![Arc::clone(&perimeter.network_actions()[0])],
        range_actions: vec![],
    };
    let candidates = bloomer.bloom(&activated);
    let expected: BTreeSet<String> = ["b", "c"].into_iter().map(String::from).collect();
    assert_eq!(ids(&candidates), expected);
}

#[test]
fn curative_cap_limits_the_search_depth() {
    let network = LinearNetwork::new("capped")
        .with_flow(LINE, 150.0)
        .with_flow_shift("a", &[(LINE, -10.0)])
        .with_flow_shift("b", &[(LINE, -20.0)])
        .with_flow_shift("c", &[(LINE, -30.0)]);
    let mut params = RaoParameters::default();
    params.topo_optimization.max_search_tree_depth = 3;
    params.ra_limits.max_curative_ra = Some(2);
    let tree = build_tree(
        network,
        perimeter(
            vec![NetworkAction::new("a"), NetworkAction::new("b"), NetworkAction::new("c")],
            vec![],
        ),
        SearchTreeParameters::curative(&params, f64::INFINITY).expect("valid parameters"),
    );
    let result = tree.run();
    assert_eq!(result.network_actions().len(), 2);
    assert_eq!(result.best_leaf.identifier(), "b + c");
    // no third action fits the cap
    assert_eq!(result.depth, 2);
}
