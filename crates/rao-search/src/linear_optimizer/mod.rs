//! Iterating linear optimization of the range actions of one leaf.
//!
//! The linear problem is a linearisation of the flows around one sensitivity
//! computation. Each iteration solves it, rounds the setpoints, applies them on
//! the network and recomputes sensitivities, until the setpoints stop moving
//! or the iteration budget is spent:
//!
//! ```text
//! fill ─► solve ─► round ─► unchanged? ──yes──► best
//!           ▲                  │ no
//!           │                  ▼
//!        update ◄── evaluate ◄── apply + sensitivities
//! ```
//!
//! A result that does not improve the cost is never kept: the leaf always ends
//! on the best situation seen, which is at worst the starting one.

mod rounding;

pub use rounding::SetpointRounder;

use crate::fillers::{build_fillers, FillerInput, FillerSetup, ProblemFiller};
use crate::linear_problem::{names, LinearProblem, LinearProblemStatus, SolverBackend};
use crate::logging::TECHNICAL;
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::{ObjectiveFunctionType, PstModel, SearchTreeParameters};
use crate::perimeter::{apply_setpoints, PrePerimeterResult};
use rao_core::{
    ComputationStatus, FlowCnec, FlowResult, NetworkState, RangeAction, RangeActionSetpoints, RaoResult,
    SensitivityProvider, SensitivityResult,
};
use tracing::{debug, warn};
use web_time::Instant;

/// Situation reached by the linear optimization.
#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub status: LinearProblemStatus,
    /// Iterations run, 0 when no problem was solved
    pub iterations: usize,
    pub setpoints: RangeActionSetpoints,
    pub flows: FlowResult,
    pub sensitivities: SensitivityResult,
    pub objective: ObjectiveFunctionResult,
}

impl LinearOptimizationResult {
    /// A situation that has not been optimized yet.
    pub fn unoptimized(
        setpoints: RangeActionSetpoints,
        flows: FlowResult,
        sensitivities: SensitivityResult,
        objective: ObjectiveFunctionResult,
    ) -> Self {
        Self {
            status: LinearProblemStatus::Optimal,
            iterations: 0,
            setpoints,
            flows,
            sensitivities,
            objective,
        }
    }

    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    fn with_status(mut self, status: LinearProblemStatus, iterations: usize) -> Self {
        self.status = status;
        self.iterations = iterations;
        self
    }
}

/// Inputs shared by every iteration of one leaf optimization.
pub struct LinearOptimizerInput<'a> {
    /// Name given to the linear problem
    pub problem_name: &'a str,
    /// Every element of the perimeter
    pub cnecs: &'a [FlowCnec],
    /// Range actions the leaf may move
    pub range_actions: &'a [RangeAction],
    pub pre_perimeter: &'a PrePerimeterResult,
    pub objective: &'a ObjectiveFunction,
    pub parameters: &'a SearchTreeParameters,
    pub backend: &'a dyn SolverBackend,
}

pub struct IteratingLinearOptimizer<'a> {
    input: LinearOptimizerInput<'a>,
}

impl<'a> IteratingLinearOptimizer<'a> {
    pub fn new(input: LinearOptimizerInput<'a>) -> Self {
        Self { input }
    }

    /// Optimize from `start`, leaving `network` on the returned setpoints.
    ///
    /// Errors are contract violations of the fillers or network mutation
    /// failures; computation failures are statuses of the result.
    pub fn optimize<N, P>(&self, network: &mut N, provider: &P, start: LinearOptimizationResult) -> RaoResult<LinearOptimizationResult>
    where
        N: NetworkState,
        P: SensitivityProvider<N> + ?Sized,
    {
        let input = &self.input;
        let params = input.parameters;
        let range_actions = input.range_actions;
        if range_actions.is_empty() {
            return Ok(start);
        }

        // elements of failed states cannot be linearised
        let lp_cnecs: Vec<FlowCnec> = input
            .cnecs
            .iter()
            .filter(|c| start.sensitivities.status_for_state(&c.state) != ComputationStatus::Failure)
            .cloned()
            .collect();
        let network_name = network.name().to_string();
        let setup = FillerSetup {
            network_name: &network_name,
            cnecs: &lp_cnecs,
            range_actions,
            pre_perimeter_setpoints: &input.pre_perimeter.setpoints,
            pre_perimeter_flows: &input.pre_perimeter.flows,
            initial_flows: &input.pre_perimeter.initial_flows,
            parameters: params,
        };
        let mut fillers = build_fillers(&setup);
        let mut problem = LinearProblem::new(input.problem_name);
        let rounder = SetpointRounder::new(&lp_cnecs, range_actions, &input.pre_perimeter.setpoints, params.unit);
        let approximated_integers = params.linear_optimizer.pst_model == PstModel::ApproximatedIntegers
            && range_actions.iter().any(|ra| ra.tap_table().is_some());
        let started = Instant::now();

        let start_flows = start.flows.clone();
        let mut best = start.clone();
        let mut current = start;
        let fill_input = FillerInput {
            flows: &current.flows,
            sensitivities: &current.sensitivities,
            setpoints: &current.setpoints,
            iteration: 0,
        };
        for filler in fillers.iter_mut() {
            filler.fill(&mut problem, &fill_input)?;
        }

        for iteration in 1..=params.linear_optimizer.max_iterations {
            let status = problem.solve(input.backend);
            if !matches!(status, LinearProblemStatus::Optimal | LinearProblemStatus::Feasible) {
                if iteration == 1 {
                    warn!(target: TECHNICAL, problem = %input.problem_name, %status, "linear optimization failed at first iteration");
                    return self.finish(network, best, status, iteration);
                }
                warn!(
                    target: TECHNICAL,
                    problem = %input.problem_name, %status, iteration,
                    "linear optimization failed, keeping the best iteration"
                );
                return self.finish(network, best, LinearProblemStatus::Feasible, iteration);
            }

            let reference = FillerInput {
                flows: &current.flows,
                sensitivities: &current.sensitivities,
                setpoints: &current.setpoints,
                iteration,
            };
            let mut rounded = rounder.round(&read_setpoints(&problem, range_actions)?, &reference);
            if approximated_integers {
                for filler in fillers.iter_mut() {
                    filler.update_between_solve_iteration(&mut problem, &rounded)?;
                }
                let status = problem.solve(input.backend);
                if matches!(status, LinearProblemStatus::Optimal | LinearProblemStatus::Feasible) {
                    rounded = rounder.round(&read_setpoints(&problem, range_actions)?, &reference);
                }
            }

            if !rounded.differs_from(&current.setpoints) {
                debug!(target: TECHNICAL, problem = %input.problem_name, iteration, "setpoints are stable");
                return self.finish(network, best, LinearProblemStatus::Optimal, iteration);
            }

            apply_setpoints(network, range_actions, &rounded)?;
            let computation = provider.compute(network, input.cnecs, range_actions);
            if computation.sensitivities.status() == ComputationStatus::Failure {
                warn!(target: TECHNICAL, problem = %input.problem_name, iteration, "sensitivity computation failed");
                return self.finish(network, best, LinearProblemStatus::SensitivityComputationFailed, iteration);
            }
            let flows = self.keep_approximated_quantities(computation.flows, &start_flows);
            let objective = input.objective.evaluate(&flows, &computation.sensitivities);
            let candidate = LinearOptimizationResult {
                status: LinearProblemStatus::Optimal,
                iterations: iteration,
                setpoints: rounded,
                flows,
                sensitivities: computation.sensitivities,
                objective,
            };
            debug!(
                target: TECHNICAL,
                problem = %input.problem_name, iteration,
                cost = candidate.cost(), best = best.cost(),
                "linear optimization iteration"
            );

            if candidate.cost() >= best.cost() {
                if !params.linear_optimizer.ra_range_shrinking {
                    debug!(target: TECHNICAL, problem = %input.problem_name, iteration, "iteration degraded the cost");
                    return self.finish(network, best, LinearProblemStatus::Optimal, iteration);
                }
            } else {
                best = candidate.clone();
            }
            current = candidate;

            let update_input = FillerInput {
                flows: &current.flows,
                sensitivities: &current.sensitivities,
                setpoints: &current.setpoints,
                iteration,
            };
            for filler in fillers.iter_mut() {
                filler.update_between_sensi_iteration(&mut problem, &update_input)?;
            }
        }

        warn!(
            target: TECHNICAL,
            problem = %input.problem_name,
            max_iterations = params.linear_optimizer.max_iterations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "linear optimization reached the iteration limit"
        );
        let iterations = params.linear_optimizer.max_iterations;
        self.finish(network, best, LinearProblemStatus::MaxIterationReached, iterations)
    }

    /// Put `network` back on the setpoints of `best`.
    fn finish<N: NetworkState>(
        &self,
        network: &mut N,
        best: LinearOptimizationResult,
        status: LinearProblemStatus,
        iterations: usize,
    ) -> RaoResult<LinearOptimizationResult> {
        apply_setpoints(network, self.input.range_actions, &best.setpoints)?;
        Ok(best.with_status(status, iterations))
    }

    /// Commercial flows and PTDF sums follow PST moves only when configured to.
    fn keep_approximated_quantities(&self, flows: FlowResult, start_flows: &FlowResult) -> FlowResult {
        let params = self.input.parameters;
        let mut flows = flows;
        if let Some(loop_flow) = &params.loop_flow {
            if !loop_flow.ptdf_approximation.should_update_ptdf_with_pst_change() {
                flows = flows.with_commercial_flows_from(start_flows);
            }
        }
        if params.objective_function == ObjectiveFunctionType::MaxMinRelativeMargin
            && !params.relative_margins.ptdf_approximation.should_update_ptdf_with_pst_change()
        {
            flows = flows.with_ptdf_zonal_sums_from(start_flows);
        }
        flows
    }
}

fn read_setpoints(problem: &LinearProblem, range_actions: &[RangeAction]) -> RaoResult<RangeActionSetpoints> {
    let mut setpoints = RangeActionSetpoints::new();
    for ra in range_actions {
        let variable = problem.variable(&names::setpoint(&ra.id))?;
        setpoints.set(&ra.id, problem.solution_value(variable)?);
    }
    Ok(setpoints)
}
