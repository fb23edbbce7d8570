//! Mutable linear model shared by the problem fillers.
//!
//! Fillers add and later update named variables and constraints on a
//! [`LinearProblem`]; the problem is then handed to a [`SolverBackend`] which
//! translates it to a concrete solver. Keeping our own model (instead of
//! building a solver problem directly) lets fillers change coefficients and
//! bounds between iterations.
//!
//! Constraints have the form `lower ≤ Σ coef·x ≤ upper`; infinite bounds are
//! allowed on either side.

pub mod names;
mod solver;
mod status;

pub use solver::{GoodLpBackend, LinearSolution, LpSolverKind, SolverBackend};
pub use status::LinearProblemStatus;

use rao_core::{RaoError, RaoResult};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct LinearVariable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub integer: bool,
}

#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    coefficients: BTreeMap<VariableId, f64>,
}

impl LinearConstraint {
    pub fn coefficients(&self) -> impl Iterator<Item = (VariableId, f64)> + '_ {
        self.coefficients.iter().map(|(v, c)| (*v, *c))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    name: String,
    variables: Vec<LinearVariable>,
    variable_index: HashMap<String, VariableId>,
    constraints: Vec<LinearConstraint>,
    constraint_index: HashMap<String, ConstraintId>,
    objective: BTreeMap<VariableId, f64>,
    solution: Option<Vec<f64>>,
}

impl LinearProblem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> RaoResult<VariableId> {
        self.push_variable(name.into(), lower, upper, false)
    }

    /// Integer variable; backends without integer support relax it.
    pub fn add_integer_variable(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> RaoResult<VariableId> {
        self.push_variable(name.into(), lower, upper, true)
    }

    fn push_variable(&mut self, name: String, lower: f64, upper: f64, integer: bool) -> RaoResult<VariableId> {
        if self.variable_index.contains_key(&name) {
            return Err(RaoError::Contract(format!("variable {} already exists", name)));
        }
        let id = VariableId(self.variables.len());
        self.variable_index.insert(name.clone(), id);
        self.variables.push(LinearVariable { name, lower, upper, integer });
        Ok(id)
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> RaoResult<ConstraintId> {
        let name = name.into();
        if self.constraint_index.contains_key(&name) {
            return Err(RaoError::Contract(format!("constraint {} already exists", name)));
        }
        let id = ConstraintId(self.constraints.len());
        self.constraint_index.insert(name.clone(), id);
        self.constraints.push(LinearConstraint {
            name,
            lower,
            upper,
            coefficients: BTreeMap::new(),
        });
        Ok(id)
    }

    pub fn find_variable(&self, name: &str) -> Option<VariableId> {
        self.variable_index.get(name).copied()
    }

    /// Variable `name`, which another filler must have created.
    pub fn variable(&self, name: &str) -> RaoResult<VariableId> {
        self.find_variable(name)
            .ok_or_else(|| RaoError::Contract(format!("variable {} has not been created yet", name)))
    }

    pub fn find_constraint(&self, name: &str) -> Option<ConstraintId> {
        self.constraint_index.get(name).copied()
    }

    pub fn constraint(&self, name: &str) -> RaoResult<ConstraintId> {
        self.find_constraint(name)
            .ok_or_else(|| RaoError::Contract(format!("constraint {} has not been created yet", name)))
    }

    pub fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, coefficient: f64) {
        if let Some(c) = self.constraints.get_mut(constraint.0) {
            c.coefficients.insert(variable, coefficient);
        }
    }

    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> f64 {
        self.constraints
            .get(constraint.0)
            .and_then(|c| c.coefficients.get(&variable))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_variable_bounds(&mut self, variable: VariableId, lower: f64, upper: f64) {
        if let Some(v) = self.variables.get_mut(variable.0) {
            v.lower = lower;
            v.upper = upper;
        }
    }

    pub fn variable_bounds(&self, variable: VariableId) -> (f64, f64) {
        self.variables
            .get(variable.0)
            .map(|v| (v.lower, v.upper))
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn set_constraint_bounds(&mut self, constraint: ConstraintId, lower: f64, upper: f64) {
        if let Some(c) = self.constraints.get_mut(constraint.0) {
            c.lower = lower;
            c.upper = upper;
        }
    }

    pub fn constraint_bounds(&self, constraint: ConstraintId) -> (f64, f64) {
        self.constraints
            .get(constraint.0)
            .map(|c| (c.lower, c.upper))
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Coefficient of `variable` in the minimised objective.
    pub fn set_objective_coefficient(&mut self, variable: VariableId, coefficient: f64) {
        self.objective.insert(variable, coefficient);
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> f64 {
        self.objective.get(&variable).copied().unwrap_or(0.0)
    }

    pub fn objective(&self) -> impl Iterator<Item = (VariableId, f64)> + '_ {
        self.objective.iter().map(|(v, c)| (*v, *c))
    }

    pub fn variables(&self) -> &[LinearVariable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Solve with `backend`, keeping the solution when one is found.
    pub fn solve(&mut self, backend: &dyn SolverBackend) -> LinearProblemStatus {
        debug!(
            problem = %self.name,
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            backend = backend.name(),
            "solving linear problem"
        );
        let LinearSolution { status, values } = backend.solve(self);
        self.solution = if status.is_success() && values.len() == self.variables.len() {
            Some(values)
        } else {
            None
        };
        status
    }

    /// Value of `variable` in the last solution.
    pub fn solution_value(&self, variable: VariableId) -> RaoResult<f64> {
        self.solution
            .as_ref()
            .and_then(|values| values.get(variable.0))
            .copied()
            .ok_or_else(|| RaoError::Contract(format!("problem {} has no solution", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut problem = LinearProblem::new("test");
        problem.add_variable("x", 0.0, 1.0).unwrap();
        assert!(matches!(problem.add_variable("x", 0.0, 1.0), Err(RaoError::Contract(_))));
        problem.add_constraint("c", 0.0, 1.0).unwrap();
        assert!(problem.add_constraint("c", 0.0, 1.0).is_err());
    }

    #[test]
    fn missing_variable_is_a_contract_error() {
        let problem = LinearProblem::new("test");
        assert!(matches!(problem.variable("flow_x_left"), Err(RaoError::Contract(_))));
        assert!(problem.find_constraint("nope").is_none());
    }

    #[test]
    fn coefficients_and_bounds_can_be_updated() {
        let mut problem = LinearProblem::new("test");
        let x = problem.add_variable("x", 0.0, 1.0).unwrap();
        let c = problem.add_constraint("c", 0.0, 5.0).unwrap();
        problem.set_coefficient(c, x, 2.0);
        problem.set_coefficient(c, x, 3.0);
        problem.set_constraint_bounds(c, 1.0, 4.0);
        problem.set_variable_bounds(x, -1.0, 2.0);

        assert_eq!(problem.coefficient(c, x), 3.0);
        assert_eq!(problem.constraint_bounds(c), (1.0, 4.0));
        assert_eq!(problem.variable_bounds(x), (-1.0, 2.0));
        assert!(problem.solution_value(x).is_err());
    }
}
