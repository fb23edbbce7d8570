//! One node of the search tree: a set of network actions and its optimization.
//!
//! A leaf owns its own copy of the network. It is built with its network
//! actions and starting setpoints applied, evaluated once (one sensitivity
//! computation), then optimized by the iterating linear optimizer.
//!
//! ```text
//! Created ──evaluate──► Evaluated ──optimize──► Optimized
//!    │                      │
//!    └──────────────────────┴──(failure)──► Error
//! ```

use crate::linear_optimizer::{IteratingLinearOptimizer, LinearOptimizationResult, LinearOptimizerInput};
use crate::linear_problem::{LinearProblemStatus, SolverBackend};
use crate::logging::TECHNICAL;
use crate::objective::{CostlyElement, ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::{ObjectiveFunctionType, SearchTreeParameters};
use crate::perimeter::{apply_setpoints, OptimizationPerimeter, PrePerimeterResult};
use crate::range_action_limiter::{activated_range_actions, RangeActionLimiter};
use rao_core::{
    Appliable, ComputationStatus, FlowResult, NetworkAction, NetworkActionCombination, NetworkState, RangeAction,
    RangeActionSetpoints, RaoResult, SensitivityProvider,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Created,
    Evaluated,
    Optimized,
    Error,
}

impl fmt::Display for LeafStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafStatus::Created => write!(f, "Created"),
            LeafStatus::Evaluated => write!(f, "Evaluated"),
            LeafStatus::Optimized => write!(f, "Optimized"),
            LeafStatus::Error => write!(f, "Error"),
        }
    }
}

/// Actions a leaf has activated, as seen by the combination filters.
#[derive(Debug, Clone, Default)]
pub struct ActivatedActions {
    pub network_actions: Vec<Arc<NetworkAction>>,
    pub range_actions: Vec<RangeAction>,
}

impl ActivatedActions {
    pub fn contains_network_action(&self, id: &str) -> bool {
        self.network_actions.iter().any(|a| a.id == id)
    }

    pub fn network_action_operators(&self) -> BTreeSet<String> {
        self.network_actions.iter().filter_map(|a| a.operator.clone()).collect()
    }

    pub fn range_action_operators(&self) -> BTreeSet<String> {
        self.range_actions.iter().filter_map(|a| a.operator.clone()).collect()
    }
}

/// Everything a leaf borrows from its tree.
pub struct LeafContext<'a, P: ?Sized> {
    pub perimeter: &'a OptimizationPerimeter,
    pub pre_perimeter: &'a PrePerimeterResult,
    pub objective: &'a ObjectiveFunction,
    pub provider: &'a P,
    pub parameters: &'a SearchTreeParameters,
    pub backend: &'a dyn SolverBackend,
}

impl<P: ?Sized> Clone for LeafContext<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized> Copy for LeafContext<'_, P> {}

pub struct Leaf<N> {
    parent: Option<Arc<Leaf<N>>>,
    network: N,
    /// All network actions applied, sorted by id
    network_actions: Vec<Arc<NetworkAction>>,
    /// Combination added by this leaf over its parent
    combination: Option<NetworkActionCombination>,
    starting_setpoints: RangeActionSetpoints,
    status: LeafStatus,
    evaluation: Option<LinearOptimizationResult>,
    optimization: Option<LinearOptimizationResult>,
}

impl<N: NetworkState> Leaf<N> {
    /// Root leaf: the base network plus `forced` network actions.
    pub fn root(base_network: &N, forced: &[Arc<NetworkAction>], pre_perimeter: &PrePerimeterResult) -> Self {
        let mut leaf = Self::created(None, base_network.clone(), forced.to_vec(), None, pre_perimeter.setpoints.clone());
        if let Err(e) = leaf.apply_network_actions() {
            leaf.fail(&format!("cannot apply forced network actions: {}", e));
        }
        leaf
    }

    /// Child of `parent` adding `combination`.
    ///
    /// With `reset_range_actions` the child starts from the pre-perimeter
    /// setpoints instead of the optimized setpoints of its parent.
    pub fn child<P: ?Sized>(
        parent: &Arc<Leaf<N>>,
        base_network: &N,
        combination: NetworkActionCombination,
        reset_range_actions: bool,
        ctx: LeafContext<'_, P>,
    ) -> Self {
        let mut network_actions = parent.network_actions.clone();
        network_actions.extend(combination.actions().iter().cloned());
        let starting_setpoints = if reset_range_actions {
            ctx.pre_perimeter.setpoints.clone()
        } else {
            parent.setpoints().clone()
        };
        let mut leaf = Self::created(
            Some(Arc::clone(parent)),
            base_network.clone(),
            network_actions,
            Some(combination),
            starting_setpoints,
        );
        let prepared = leaf
            .apply_network_actions()
            .and_then(|_| apply_setpoints(&mut leaf.network, ctx.perimeter.range_actions(), &leaf.starting_setpoints));
        if let Err(e) = prepared {
            leaf.fail(&format!("cannot prepare network: {}", e));
        }
        leaf
    }

    fn created(
        parent: Option<Arc<Leaf<N>>>,
        network: N,
        mut network_actions: Vec<Arc<NetworkAction>>,
        combination: Option<NetworkActionCombination>,
        starting_setpoints: RangeActionSetpoints,
    ) -> Self {
        network_actions.sort_by(|a, b| a.id.cmp(&b.id));
        network_actions.dedup_by(|a, b| a.id == b.id);
        Self {
            parent,
            network,
            network_actions,
            combination,
            starting_setpoints,
            status: LeafStatus::Created,
            evaluation: None,
            optimization: None,
        }
    }

    fn apply_network_actions(&mut self) -> RaoResult<()> {
        for action in &self.network_actions {
            action.apply(&mut self.network)?;
        }
        Ok(())
    }

    fn fail(&mut self, reason: &str) {
        error!(target: TECHNICAL, leaf = %self.identifier(), "{}", reason);
        self.status = LeafStatus::Error;
    }

    /// Run one sensitivity computation and evaluate the objective.
    pub fn evaluate<P>(&mut self, ctx: LeafContext<'_, P>)
    where
        P: SensitivityProvider<N> + ?Sized,
    {
        if self.status != LeafStatus::Created {
            return;
        }
        match self.compute_snapshot(ctx, self.starting_setpoints.clone()) {
            Some(snapshot) => {
                self.evaluation = Some(snapshot);
                self.status = LeafStatus::Evaluated;
            }
            None => self.fail("sensitivity computation failed"),
        }
    }

    fn compute_snapshot<P>(&self, ctx: LeafContext<'_, P>, setpoints: RangeActionSetpoints) -> Option<LinearOptimizationResult>
    where
        P: SensitivityProvider<N> + ?Sized,
    {
        let perimeter = ctx.perimeter;
        let computation = ctx.provider.compute(&self.network, perimeter.flow_cnecs(), perimeter.range_actions());
        if computation.sensitivities.status() == ComputationStatus::Failure {
            return None;
        }
        let flows = keep_topological_approximations(computation.flows, ctx);
        let objective = ctx.objective.evaluate(&flows, &computation.sensitivities);
        Some(LinearOptimizationResult::unoptimized(
            setpoints,
            flows,
            computation.sensitivities,
            objective,
        ))
    }

    /// Optimize the range actions of an evaluated leaf.
    pub fn optimize<P>(&mut self, ctx: LeafContext<'_, P>)
    where
        P: SensitivityProvider<N> + ?Sized,
    {
        if self.status != LeafStatus::Evaluated {
            return;
        }
        let Some(mut start) = self.evaluation.clone() else {
            self.fail("leaf optimized before evaluation");
            return;
        };
        let perimeter = ctx.perimeter;
        if perimeter.range_actions().is_empty() {
            self.optimization = Some(start);
            self.status = LeafStatus::Optimized;
            return;
        }

        let pre_setpoints = &ctx.pre_perimeter.setpoints;
        let activated = activated_range_actions(&self.starting_setpoints, pre_setpoints);
        let most_limiting = start.objective.most_limiting_elements(1).first().map(|e| e.cnec_id.clone());
        let limited = RangeActionLimiter::new(&ctx.parameters.ra_limits).limit(
            perimeter.range_actions(),
            &self.network_actions,
            &activated,
            most_limiting.as_deref(),
            &start.sensitivities,
        );

        // frozen range actions go back to their pre-perimeter setpoint
        let mut frozen = false;
        for id in &limited.excluded {
            if let (Some(previous), Some(current)) = (pre_setpoints.get(id), start.setpoints.get(id)) {
                if (previous - current).abs() >= rao_core::SETPOINT_TOLERANCE {
                    start.setpoints.set(id, previous);
                    frozen = true;
                }
            }
        }
        if frozen {
            debug!(target: TECHNICAL, leaf = %self.identifier(), excluded = ?limited.excluded, "freezing range actions");
            if let Err(e) = apply_setpoints(&mut self.network, perimeter.range_actions(), &start.setpoints) {
                self.fail(&format!("cannot freeze range actions: {}", e));
                return;
            }
            match self.compute_snapshot(ctx, start.setpoints.clone()) {
                Some(snapshot) => start = snapshot,
                None => {
                    self.fail("sensitivity computation failed");
                    return;
                }
            }
        }

        let problem_name = self.identifier();
        let optimizer = IteratingLinearOptimizer::new(LinearOptimizerInput {
            problem_name: &problem_name,
            cnecs: perimeter.flow_cnecs(),
            range_actions: &limited.kept,
            pre_perimeter: ctx.pre_perimeter,
            objective: ctx.objective,
            parameters: ctx.parameters,
            backend: ctx.backend,
        });
        let all_setpoints = start.setpoints.clone();
        match optimizer.optimize(&mut self.network, ctx.provider, start) {
            Ok(mut result) => {
                if matches!(
                    result.status,
                    LinearProblemStatus::Infeasible | LinearProblemStatus::Unbounded | LinearProblemStatus::Abnormal
                ) {
                    result.objective = ObjectiveFunctionResult::infinite();
                    self.optimization = Some(result);
                    self.fail("linear optimization failed");
                    return;
                }
                let mut setpoints = all_setpoints;
                for (id, value) in result.setpoints.iter() {
                    setpoints.set(id, value);
                }
                result.setpoints = setpoints;
                self.optimization = Some(result);
                self.status = LeafStatus::Optimized;
            }
            Err(e) => self.fail(&format!("linear optimization error: {}", e)),
        }
    }

    /// "root", or the ids of the applied network actions.
    pub fn identifier(&self) -> String {
        if self.network_actions.is_empty() {
            "root".to_string()
        } else {
            self.network_actions
                .iter()
                .map(|a| a.id.as_str())
                .collect::<Vec<_>>()
                .join(" + ")
        }
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn parent(&self) -> Option<&Arc<Leaf<N>>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        &self.network_actions
    }

    pub fn combination(&self) -> Option<&NetworkActionCombination> {
        self.combination.as_ref()
    }

    /// Latest result: the optimization if it ran, else the evaluation.
    pub fn result(&self) -> Option<&LinearOptimizationResult> {
        self.optimization.as_ref().or(self.evaluation.as_ref())
    }

    /// Snapshot of the leaf before its range actions were optimized.
    pub fn evaluation(&self) -> Option<&LinearOptimizationResult> {
        self.evaluation.as_ref()
    }

    pub fn linear_problem_status(&self) -> Option<LinearProblemStatus> {
        self.optimization.as_ref().map(|r| r.status)
    }

    /// `+∞` for a failed or unevaluated leaf.
    pub fn cost(&self) -> f64 {
        match (self.status, self.result()) {
            (LeafStatus::Error, _) | (_, None) => f64::INFINITY,
            (_, Some(result)) => result.cost(),
        }
    }

    pub fn functional_cost(&self) -> f64 {
        match (self.status, self.result()) {
            (LeafStatus::Error, _) | (_, None) => f64::INFINITY,
            (_, Some(result)) => result.objective.functional_cost(),
        }
    }

    pub fn virtual_cost(&self) -> f64 {
        match (self.status, self.result()) {
            (LeafStatus::Error, _) | (_, None) => 0.0,
            (_, Some(result)) => result.objective.virtual_cost(),
        }
    }

    pub fn virtual_cost_of(&self, name: &str) -> f64 {
        self.result().map_or(0.0, |r| r.objective.virtual_cost_of(name))
    }

    pub fn most_limiting_elements(&self, n: usize) -> &[CostlyElement] {
        match self.result() {
            Some(result) => result.objective.most_limiting_elements(n),
            None => &[],
        }
    }

    pub fn setpoints(&self) -> &RangeActionSetpoints {
        self.result().map_or(&self.starting_setpoints, |r| &r.setpoints)
    }

    pub fn flows(&self) -> Option<&FlowResult> {
        self.result().map(|r| &r.flows)
    }

    /// Network actions plus range actions moved away from `reference`.
    pub fn activated_actions(&self, perimeter: &OptimizationPerimeter, reference: &RangeActionSetpoints) -> ActivatedActions {
        let moved = activated_range_actions(self.setpoints(), reference);
        ActivatedActions {
            network_actions: self.network_actions.clone(),
            range_actions: perimeter
                .range_actions()
                .iter()
                .filter(|ra| moved.contains(&ra.id))
                .cloned()
                .collect(),
        }
    }

    /// Number of network actions plus moved range actions.
    pub fn activated_count(&self, reference: &RangeActionSetpoints) -> usize {
        self.network_actions.len() + activated_range_actions(self.setpoints(), reference).len()
    }
}

fn keep_topological_approximations<P: ?Sized>(flows: FlowResult, ctx: LeafContext<'_, P>) -> FlowResult {
    let params = ctx.parameters;
    let reference = &ctx.pre_perimeter.flows;
    let mut flows = flows;
    if let Some(loop_flow) = &params.loop_flow {
        if !loop_flow.ptdf_approximation.should_update_ptdf_with_topological_change() {
            flows = flows.with_commercial_flows_from(reference);
        }
    }
    if params.objective_function == ObjectiveFunctionType::MaxMinRelativeMargin
        && !params.relative_margins.ptdf_approximation.should_update_ptdf_with_topological_change()
    {
        flows = flows.with_ptdf_zonal_sums_from(reference);
    }
    flows
}

impl<N: NetworkState> fmt::Display for Leaf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.network_actions.is_empty() {
            write!(f, "Root leaf")?;
        } else {
            let names: Vec<&str> = self.network_actions.iter().map(|a| a.name.as_str()).collect();
            write!(f, "Network action(s): {}", names.join(", "))?;
        }
        if self.status != LeafStatus::Created {
            write!(
                f,
                ", Cost: {:.2} (Functional: {:.2}, Virtual: {:.2})",
                self.cost(),
                self.functional_cost(),
                self.virtual_cost()
            )?;
        }
        write!(f, ", Status: {}", self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_problem::GoodLpBackend;
    use crate::parameters::RaoParameters;
    use rao_core::synthetic::{ActionEffect, LinearNetwork, LinearSensitivityProvider};
    use rao_core::{FlowCnec, PstTapTable};

    struct Fixture {
        network: LinearNetwork,
        perimeter: OptimizationPerimeter,
        pre_perimeter: PrePerimeterResult,
        objective: ObjectiveFunction,
        provider: LinearSensitivityProvider,
        params: SearchTreeParameters,
        backend: GoodLpBackend,
    }

    impl Fixture {
        fn new(network: LinearNetwork) -> Self {
            let perimeter = OptimizationPerimeter::new(
                "preventive",
                vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)],
                vec![NetworkAction::new("open"), NetworkAction::new("broken")],
                vec![RangeAction::pst("pst", "pst", PstTapTable::linear(-5, 5, 1.0))],
            )
            .unwrap();
            let provider = LinearSensitivityProvider::new();
            let pre_perimeter = PrePerimeterResult::compute(&network, &perimeter, &provider).unwrap();
            let params = SearchTreeParameters::preventive(&RaoParameters::default()).unwrap();
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
                backend: GoodLpBackend::default(),
            }
        }

        fn ctx(&self) -> LeafContext<'_, LinearSensitivityProvider> {
            LeafContext {
                perimeter: &self.perimeter,
                pre_perimeter: &self.pre_perimeter,
                objective: &self.objective,
                provider: &self.provider,
                parameters: &self.params,
                backend: &self.backend,
            }
        }
    }

    fn network() -> LinearNetwork {
        LinearNetwork::new("net")
            .with_flow("line", 110.0)
            .with_sensitivity("line", "pst", -1.0)
            .with_range_action("pst", 0.0)
            .with_flow_shift("open", &[("line", -30.0)])
            .with_action_effect(
                "broken",
                ActionEffect {
                    fails_computation: true,
                    ..ActionEffect::default()
                },
            )
    }

    #[test]
    fn root_leaf_lifecycle() {
        let fixture = Fixture::new(network());
        let mut root = Leaf::root(&fixture.network, &[], &fixture.pre_perimeter);
        assert_eq!(root.status(), LeafStatus::Created);
        assert_eq!(root.to_string(), "Root leaf, Status: Created");

        root.evaluate(fixture.ctx());
        assert_eq!(root.status(), LeafStatus::Evaluated);
        assert!((root.cost() - 10.0).abs() < 1e-9);

        root.optimize(fixture.ctx());
        assert_eq!(root.status(), LeafStatus::Optimized);
        // pst at its last tap: 110 − 5
        assert!((root.cost() - 5.0).abs() < 1e-6, "cost {}", root.cost());
        assert_eq!(root.setpoints().get("pst"), Some(5.0));
        assert_eq!(
            root.to_string(),
            "Root leaf, Cost: 5.00 (Functional: 5.00, Virtual: 0.00), Status: Optimized"
        );
    }

    #[test]
    fn child_inherits_or_resets_setpoints() {
        let fixture = Fixture::new(network());
        let mut root = Leaf::root(&fixture.network, &[], &fixture.pre_perimeter);
        root.evaluate(fixture.ctx());
        root.optimize(fixture.ctx());
        let root = Arc::new(root);
        let open = NetworkActionCombination::single(Arc::clone(&fixture.perimeter.network_actions()[0]));
        assert_eq!(open.concatenated_id(), "open");

        let inherited = Leaf::child(&root, &fixture.network, open.clone(), false, fixture.ctx());
        assert_eq!(inherited.setpoints().get("pst"), Some(5.0));
        let reset = Leaf::child(&root, &fixture.network, open, true, fixture.ctx());
        assert_eq!(reset.setpoints().get("pst"), Some(0.0));
        assert_eq!(reset.identifier(), "open");
        assert!(reset.network().applied_network_actions().contains("open"));
    }

    #[test]
    fn failed_sensitivity_marks_leaf_as_error() {
        let fixture = Fixture::new(network());
        let root = Arc::new(Leaf::root(&fixture.network, &[], &fixture.pre_perimeter));
        let broken = NetworkActionCombination::single(Arc::clone(&fixture.perimeter.network_actions()[1]));
        let mut leaf = Leaf::child(&root, &fixture.network, broken, false, fixture.ctx());
        leaf.evaluate(fixture.ctx());
        assert_eq!(leaf.status(), LeafStatus::Error);
        assert!(leaf.cost().is_infinite());
        leaf.optimize(fixture.ctx());
        assert_eq!(leaf.status(), LeafStatus::Error);
        assert!(leaf.to_string().starts_with("Network action(s): broken"));
    }
}
