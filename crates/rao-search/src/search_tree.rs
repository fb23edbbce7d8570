//! Depth-by-depth exploration of network action combinations.
//!
//! The root leaf holds the forced network actions. At each depth the bloomer
//! proposes the combinations that can be added to the best leaf so far, one
//! child is built per combination and the children are evaluated and optimized
//! on a rayon pool of `leaves_in_parallel` threads.
//!
//! ```text
//! depth 0        root
//!                 │ bloom + filters
//! depth 1   ┌─────┼─────┐
//!           a     b    a + c        best of depth 1 ──► parent of depth 2
//! ```
//!
//! The search stops when the maximum depth is reached, when no candidate is
//! left, when a depth brings no improvement or when the stop criterion is
//! met. Failing leaves cost `+∞` and never abort the search.

use crate::bloomer::{self, Bloomer};
use crate::filters::FilterChain;
use crate::leaf::{Leaf, LeafContext, LeafStatus};
use crate::linear_problem::{GoodLpBackend, SolverBackend};
use crate::logging::{log_most_limiting_elements, log_optimization_summary, log_range_actions, BUSINESS, TECHNICAL};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::{SearchTreeParameters, StopCriterion, TargetTieBreak};
use crate::perimeter::{OptimizationPerimeter, PrePerimeterResult};
use rao_core::{
    NetworkAction, NetworkActionCombination, NetworkState, RangeActionSetpoints, RaoError, RaoResult,
    SensitivityProvider, UsageMethod,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use web_time::Instant;

/// Below this virtual cost a perimeter without optimized element is secure.
const VIRTUAL_COST_TOLERANCE: f64 = 1e-6;
const LIMITING_ELEMENTS_LOGGED: usize = 5;

/// Outcome of [`SearchTree::run`].
pub struct SearchTreeResult<N> {
    pub best_leaf: Arc<Leaf<N>>,
    /// Objective of the perimeter before any remedial action
    pub pre_optimization: ObjectiveFunctionResult,
    /// Deepest depth explored, 0 when only the root was built
    pub depth: usize,
    pub stop_criterion_reached: bool,
}

impl<N: NetworkState> SearchTreeResult<N> {
    pub fn cost(&self) -> f64 {
        self.best_leaf.cost()
    }

    pub fn setpoints(&self) -> &RangeActionSetpoints {
        self.best_leaf.setpoints()
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        self.best_leaf.network_actions()
    }
}

struct DepthState<N> {
    optimal: Arc<Leaf<N>>,
    fulfilled: bool,
}

pub struct SearchTree<N, P: ?Sized> {
    network: N,
    perimeter: OptimizationPerimeter,
    pre_perimeter: PrePerimeterResult,
    provider: Arc<P>,
    parameters: SearchTreeParameters,
    objective: ObjectiveFunction,
    backend: Arc<dyn SolverBackend>,
    bloomer: Bloomer,
}

impl<N, P> SearchTree<N, P>
where
    N: NetworkState,
    P: SensitivityProvider<N> + ?Sized,
{
    pub fn new(
        network: N,
        mut perimeter: OptimizationPerimeter,
        pre_perimeter: PrePerimeterResult,
        provider: Arc<P>,
        parameters: SearchTreeParameters,
    ) -> RaoResult<Self> {
        if perimeter.flow_cnecs().is_empty() {
            return Err(RaoError::Config(format!(
                "perimeter {} has no flow cnec to optimize or monitor",
                perimeter.main_state()
            )));
        }
        perimeter.remove_range_actions_with_wrong_initial_setpoint(&pre_perimeter.setpoints);
        let objective = ObjectiveFunction::build(
            perimeter.flow_cnecs(),
            &pre_perimeter.flows,
            &pre_perimeter.initial_flows,
            &parameters,
        );
        let bloomer = Bloomer::new(
            &perimeter,
            &parameters.network_actions.predefined_combinations,
            FilterChain::for_limits(&parameters.ra_limits),
        );
        let backend: Arc<dyn SolverBackend> = Arc::new(GoodLpBackend::new(parameters.linear_optimizer.solver));
        Ok(Self {
            network,
            perimeter,
            pre_perimeter,
            provider,
            parameters,
            objective,
            backend,
            bloomer,
        })
    }

    /// Replace the linear solver used by every leaf.
    pub fn with_solver_backend(mut self, backend: Arc<dyn SolverBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn perimeter(&self) -> &OptimizationPerimeter {
        &self.perimeter
    }

    pub fn objective(&self) -> &ObjectiveFunction {
        &self.objective
    }

    fn context(&self) -> LeafContext<'_, P> {
        LeafContext {
            perimeter: &self.perimeter,
            pre_perimeter: &self.pre_perimeter,
            objective: &self.objective,
            provider: self.provider.as_ref(),
            parameters: &self.parameters,
            backend: self.backend.as_ref(),
        }
    }

    /// Explore the tree and return its best leaf.
    pub fn run(&self) -> SearchTreeResult<N> {
        let started = Instant::now();
        let ctx = self.context();
        let perimeter = self.perimeter.main_state().to_string();
        let pre_optimization = self
            .objective
            .evaluate(&self.pre_perimeter.flows, &self.pre_perimeter.sensitivities);

        let forced: Vec<Arc<NetworkAction>> = self
            .perimeter
            .network_actions()
            .iter()
            .filter(|a| a.usage_method == UsageMethod::Forced)
            .cloned()
            .collect();
        let mut root = Leaf::root(&self.network, &forced, &self.pre_perimeter);
        root.evaluate(ctx);
        info!(target: BUSINESS, "Evaluated {}", root);
        if root.status() == LeafStatus::Error {
            warn!(target: BUSINESS, perimeter = %perimeter, "root leaf could not be evaluated");
            return self.finish(Arc::new(root), pre_optimization, 0, false);
        }
        if self.stop_criterion_reached(&root) {
            info!(target: BUSINESS, "Stop criterion reached on the root leaf before optimization");
            return self.finish(Arc::new(root), pre_optimization, 0, true);
        }
        root.optimize(ctx);
        info!(target: BUSINESS, "Optimized {}", root);
        self.log_limiting_elements("root", &root);

        let mut optimal = Arc::new(root);
        let mut fulfilled = self.stop_criterion_reached(&optimal);
        let mut depth = 0;
        while !fulfilled && depth < self.parameters.tree.maximum_search_depth() {
            if !self.bloomer.has_network_actions() {
                info!(target: BUSINESS, "No network action available");
                break;
            }
            let activated = optimal.activated_actions(&self.perimeter, &self.pre_perimeter.setpoints);
            let mut candidates: Vec<(NetworkActionCombination, bool)> =
                self.bloomer.bloom(&activated).into_iter().collect();
            if candidates.is_empty() {
                info!(target: BUSINESS, "No more network action combination to explore");
                break;
            }
            candidates.sort_by(|(a, _), (b, _)| bloomer::rank(a, b));
            depth += 1;
            info!(
                target: BUSINESS,
                "Search depth {} [start]: {} leaves to evaluate",
                depth,
                candidates.len()
            );

            let depth_started = Instant::now();
            let state = self.explore_depth(&optimal, candidates);
            debug!(
                target: TECHNICAL,
                depth,
                elapsed_ms = depth_started.elapsed().as_millis() as u64,
                "depth explored"
            );
            if Arc::ptr_eq(&state.optimal, &optimal) {
                info!(target: BUSINESS, "Search depth {} [end]: no leaf improves the cost", depth);
                break;
            }
            optimal = state.optimal;
            info!(target: BUSINESS, "Search depth {} [end]: best leaf: {}", depth, optimal);
            self.log_limiting_elements(&format!("depth {}", depth), &optimal);
            fulfilled = state.fulfilled || self.stop_criterion_reached(&optimal);
        }

        info!(
            target: TECHNICAL,
            elapsed_ms = started.elapsed().as_millis() as u64,
            depth,
            "search tree finished"
        );
        self.finish(optimal, pre_optimization, depth, fulfilled)
    }

    fn explore_depth(
        &self,
        previous: &Arc<Leaf<N>>,
        candidates: Vec<(NetworkActionCombination, bool)>,
    ) -> DepthState<N> {
        let state = Mutex::new(DepthState {
            optimal: Arc::clone(previous),
            fulfilled: false,
        });
        let threads = self.parameters.tree.leaves_in_parallel().min(candidates.len()).max(1);
        let explore = |(combination, reset): &(NetworkActionCombination, bool)| {
            self.explore_leaf(previous, combination, *reset, &state)
        };
        match ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| candidates.par_iter().for_each(explore)),
            Err(e) => {
                warn!(target: TECHNICAL, error = %e, "cannot build thread pool, evaluating leaves sequentially");
                candidates.iter().for_each(explore);
            }
        }
        state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn explore_leaf(
        &self,
        previous: &Arc<Leaf<N>>,
        combination: &NetworkActionCombination,
        reset: bool,
        state: &Mutex<DepthState<N>>,
    ) {
        let first_finished = self.parameters.tree.target_tie_break() == TargetTieBreak::FirstFinished;
        if first_finished && state.lock().unwrap_or_else(PoisonError::into_inner).fulfilled {
            debug!(target: TECHNICAL, combination = %combination.concatenated_id(), "stop criterion reached, leaf skipped");
            return;
        }

        let ctx = self.context();
        let mut leaf = Leaf::child(previous, &self.network, combination.clone(), reset, ctx);
        leaf.evaluate(ctx);
        if leaf.status() == LeafStatus::Evaluated && !self.stop_criterion_reached(&leaf) {
            leaf.optimize(ctx);
        }
        info!(target: BUSINESS, "Evaluated {}", leaf);

        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if first_finished && state.fulfilled {
            debug!(target: TECHNICAL, leaf = %leaf.identifier(), "stop criterion reached meanwhile, result discarded");
            return;
        }
        if leaf.status() == LeafStatus::Error {
            return;
        }
        if self.improved_enough(previous.cost(), leaf.cost())
            && compare_leaves(&leaf, &state.optimal, &self.pre_perimeter.setpoints) == Ordering::Less
        {
            state.fulfilled |= self.stop_criterion_reached(&leaf);
            state.optimal = Arc::new(leaf);
        }
    }

    /// Whether `new` beats `previous` by the minimum impact thresholds.
    ///
    /// A leaf reaching the stop criterion only has to be strictly better.
    fn improved_enough(&self, previous: f64, new: f64) -> bool {
        if !new.is_finite() {
            return false;
        }
        if previous > new && self.cost_reaches_stop_criterion(new) {
            return true;
        }
        let thresholds = &self.parameters.network_actions;
        let absolute = thresholds.absolute_min_impact_threshold.max(0.0);
        let relative = thresholds.relative_min_impact_threshold.max(0.0);
        previous - absolute > new && (1.0 - previous.signum() * relative) * previous > new
    }

    fn cost_reaches_stop_criterion(&self, cost: f64) -> bool {
        match self.parameters.tree.stop_criterion() {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue(target) => cost <= target,
        }
    }

    fn stop_criterion_reached(&self, leaf: &Leaf<N>) -> bool {
        if leaf.status() == LeafStatus::Error {
            return false;
        }
        if self.perimeter.optimized_cnecs().next().is_none() && leaf.virtual_cost() < VIRTUAL_COST_TOLERANCE {
            return true;
        }
        self.cost_reaches_stop_criterion(leaf.cost())
    }

    fn log_limiting_elements(&self, prefix: &str, leaf: &Leaf<N>) {
        if let Some(result) = leaf.result() {
            log_most_limiting_elements(prefix, &result.objective, self.parameters.unit, LIMITING_ELEMENTS_LOGGED);
        }
    }

    fn finish(
        &self,
        best_leaf: Arc<Leaf<N>>,
        pre_optimization: ObjectiveFunctionResult,
        depth: usize,
        stop_criterion_reached: bool,
    ) -> SearchTreeResult<N> {
        log_range_actions(
            "best leaf",
            self.perimeter.range_actions(),
            best_leaf.setpoints(),
            &self.pre_perimeter.setpoints,
        );
        self.log_limiting_elements("best leaf", &best_leaf);
        log_optimization_summary(
            self.perimeter.main_state(),
            self.objective.functional_name(),
            &pre_optimization,
            &best_leaf,
        );
        SearchTreeResult {
            best_leaf,
            pre_optimization,
            depth,
            stop_criterion_reached,
        }
    }
}

/// Lower cost first, then fewer activated actions, then identifier.
///
/// Total order: the best leaf does not depend on evaluation order.
fn compare_leaves<N: NetworkState>(a: &Leaf<N>, b: &Leaf<N>, reference: &RangeActionSetpoints) -> Ordering {
    a.cost()
        .total_cmp(&b.cost())
        .then_with(|| a.activated_count(reference).cmp(&b.activated_count(reference)))
        .then_with(|| a.identifier().cmp(&b.identifier()))
}
