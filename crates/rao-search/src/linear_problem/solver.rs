//! Solver backends for [`LinearProblem`].

use super::{LinearProblem, LinearProblemStatus};
#[cfg(feature = "solver-clarabel")]
use good_lp::solvers::clarabel::clarabel as clarabel_solver;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as highs_solver;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use rao_core::RaoError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};
use web_time::Instant;

#[cfg(not(any(feature = "solver-clarabel", feature = "solver-highs")))]
compile_error!("enable at least one of the `solver-clarabel` or `solver-highs` features");

/// Values of every variable, indexed like [`LinearProblem::variables`].
#[derive(Debug, Clone)]
pub struct LinearSolution {
    pub status: LinearProblemStatus,
    pub values: Vec<f64>,
}

impl LinearSolution {
    pub fn failed(status: LinearProblemStatus) -> Self {
        Self { status, values: Vec::new() }
    }
}

/// Strategy seam between the linear model and a concrete solver.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, problem: &LinearProblem) -> LinearSolution;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpSolverKind {
    /// Interior point, no integer support: integer variables are relaxed
    #[cfg(feature = "solver-clarabel")]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl Default for LpSolverKind {
    /// Clarabel when compiled in, HiGHS otherwise.
    fn default() -> Self {
        #[cfg(feature = "solver-clarabel")]
        {
            LpSolverKind::Clarabel
        }
        #[cfg(not(feature = "solver-clarabel"))]
        {
            LpSolverKind::Highs
        }
    }
}

impl LpSolverKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_LP_SOLVERS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => "highs",
        }
    }

    pub fn supports_integers(&self) -> bool {
        match self {
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => false,
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => true,
        }
    }
}

const AVAILABLE_LP_SOLVERS: &[&str] = &[
    #[cfg(feature = "solver-clarabel")]
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_solver_error(label: &str) -> RaoError {
    RaoError::Config(format!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        LpSolverKind::available().join(", ")
    ))
}

impl FromStr for LpSolverKind {
    type Err = RaoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "clarabel" => {
                #[cfg(feature = "solver-clarabel")]
                {
                    Ok(LpSolverKind::Clarabel)
                }
                #[cfg(not(feature = "solver-clarabel"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(LpSolverKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            other => Err(unknown_solver_error(other)),
        }
    }
}

/// Backend translating the model into a `good_lp` problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend {
    kind: LpSolverKind,
}

impl GoodLpBackend {
    pub fn new(kind: LpSolverKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> LpSolverKind {
        self.kind
    }
}

impl SolverBackend for GoodLpBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn solve(&self, problem: &LinearProblem) -> LinearSolution {
        let start = Instant::now();
        let relax = !self.kind.supports_integers();
        if relax && problem.variables().iter().any(|v| v.integer) {
            warn!(
                solver = self.kind.as_str(),
                problem = problem.name(),
                "integer variables are relaxed to continuous ones"
            );
        }

        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = problem
            .variables()
            .iter()
            .map(|v| {
                let mut definition = variable();
                if v.integer && !relax {
                    definition = definition.integer();
                }
                if v.lower.is_finite() {
                    definition = definition.min(v.lower);
                }
                if v.upper.is_finite() {
                    definition = definition.max(v.upper);
                }
                vars.add(definition)
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (id, coefficient) in problem.objective() {
            objective += coefficient * handles[id.index()];
        }

        let mut constraints: Vec<Constraint> = Vec::new();
        for c in problem.constraints() {
            let mut expr = Expression::from(0.0);
            let mut empty = true;
            for (id, coefficient) in c.coefficients() {
                expr += coefficient * handles[id.index()];
                empty = false;
            }
            if empty {
                // constant row: only its bounds can make the problem infeasible
                if c.lower > 1e-9 || c.upper < -1e-9 {
                    debug!(constraint = %c.name, "empty constraint excludes zero");
                    return LinearSolution::failed(LinearProblemStatus::Infeasible);
                }
                continue;
            }
            if c.lower.is_finite() && c.upper.is_finite() && (c.upper - c.lower).abs() < 1e-12 {
                constraints.push(constraint!(expr == c.lower));
                continue;
            }
            if c.lower.is_finite() {
                constraints.push(constraint!(expr.clone() >= c.lower));
            }
            if c.upper.is_finite() {
                constraints.push(constraint!(expr <= c.upper));
            }
        }

        let unsolved = vars.minimise(objective);
        let solution = match self.kind {
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => solve_model(unsolved.using(clarabel_solver), constraints, &handles),
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => solve_model(unsolved.using(highs_solver), constraints, &handles),
        };

        debug!(
            solver = self.kind.as_str(),
            problem = problem.name(),
            status = %solution.status,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "linear problem solved"
        );
        solution
    }
}

fn solve_model<M>(mut model: M, constraints: Vec<Constraint>, handles: &[Variable]) -> LinearSolution
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model.add_constraint(c);
    }
    match model.solve() {
        Ok(solution) => LinearSolution {
            status: LinearProblemStatus::Optimal,
            values: handles.iter().map(|h| solution.value(*h)).collect(),
        },
        Err(ResolutionError::Infeasible) => LinearSolution::failed(LinearProblemStatus::Infeasible),
        Err(ResolutionError::Unbounded) => LinearSolution::failed(LinearProblemStatus::Unbounded),
        Err(other) => {
            warn!(error = %other, "solver failed");
            LinearSolution::failed(LinearProblemStatus::Abnormal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "solver-clarabel")]
    fn parses_solver_names() {
        assert_eq!("Clarabel".parse::<LpSolverKind>().unwrap(), LpSolverKind::Clarabel);
        assert!(matches!("glpk".parse::<LpSolverKind>(), Err(RaoError::Config(_))));
        assert!(LpSolverKind::available().contains(&"clarabel"));
    }

    #[test]
    fn default_solver_is_compiled_in() {
        let kind = LpSolverKind::default();
        assert!(LpSolverKind::available().contains(&kind.as_str()));
        assert_eq!(kind.as_str().parse::<LpSolverKind>().unwrap(), kind);
    }

    #[test]
    #[cfg(not(feature = "solver-highs"))]
    fn highs_is_rejected_when_not_compiled_in() {
        let err = "highs".parse::<LpSolverKind>().unwrap_err();
        assert!(err.to_string().contains("supported values"));
    }

    #[test]
    fn solves_small_problem() {
        // max x + y  s.t.  x + 2y <= 4, x <= 3
        let mut problem = LinearProblem::new("small");
        let x = problem.add_variable("x", 0.0, 3.0).unwrap();
        let y = problem.add_variable("y", 0.0, f64::INFINITY).unwrap();
        let c = problem.add_constraint("c", f64::NEG_INFINITY, 4.0).unwrap();
        problem.set_coefficient(c, x, 1.0);
        problem.set_coefficient(c, y, 2.0);
        problem.set_objective_coefficient(x, -1.0);
        problem.set_objective_coefficient(y, -1.0);

        let status = problem.solve(&GoodLpBackend::default());
        assert_eq!(status, LinearProblemStatus::Optimal);
        assert!((problem.solution_value(x).unwrap() - 3.0).abs() < 1e-4);
        assert!((problem.solution_value(y).unwrap() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn equality_constraint_is_honoured() {
        let mut problem = LinearProblem::new("eq");
        let x = problem.add_variable("x", f64::NEG_INFINITY, f64::INFINITY).unwrap();
        let c = problem.add_constraint("fix", 2.5, 2.5).unwrap();
        problem.set_coefficient(c, x, 1.0);
        problem.set_objective_coefficient(x, 1.0);

        assert_eq!(problem.solve(&GoodLpBackend::default()), LinearProblemStatus::Optimal);
        assert!((problem.solution_value(x).unwrap() - 2.5).abs() < 1e-5);
    }

    #[test]
    fn contradictory_bounds_are_not_optimal() {
        let mut problem = LinearProblem::new("infeasible");
        let x = problem.add_variable("x", 0.0, 1.0).unwrap();
        let c = problem.add_constraint("c", 5.0, f64::INFINITY).unwrap();
        problem.set_coefficient(c, x, 1.0);
        problem.set_objective_coefficient(x, 1.0);

        let status = problem.solve(&GoodLpBackend::default());
        assert_ne!(status, LinearProblemStatus::Optimal);
        assert!(problem.solution_value(x).is_err());
    }
}
