use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a linear solve, or of a whole iterating optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearProblemStatus {
    Optimal,
    /// The solver stopped early with a feasible, maybe suboptimal, point
    Feasible,
    Infeasible,
    Unbounded,
    Abnormal,
    /// Iteration budget exhausted; the best iteration is kept
    MaxIterationReached,
    /// A sensitivity recomputation failed; the best iteration is kept
    SensitivityComputationFailed,
}

impl LinearProblemStatus {
    /// A solution usable by the caller.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            LinearProblemStatus::Optimal
                | LinearProblemStatus::Feasible
                | LinearProblemStatus::MaxIterationReached
                | LinearProblemStatus::SensitivityComputationFailed
        )
    }
}

impl fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinearProblemStatus::Optimal => "OPTIMAL",
            LinearProblemStatus::Feasible => "FEASIBLE",
            LinearProblemStatus::Infeasible => "INFEASIBLE",
            LinearProblemStatus::Unbounded => "UNBOUNDED",
            LinearProblemStatus::Abnormal => "ABNORMAL",
            LinearProblemStatus::MaxIterationReached => "MAX_ITERATION_REACHED",
            LinearProblemStatus::SensitivityComputationFailed => "SENSITIVITY_COMPUTATION_FAILED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_statuses_are_not_success() {
        assert!(LinearProblemStatus::Optimal.is_success());
        assert!(LinearProblemStatus::MaxIterationReached.is_success());
        assert!(!LinearProblemStatus::Infeasible.is_success());
        assert!(!LinearProblemStatus::Abnormal.is_success());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&LinearProblemStatus::MaxIterationReached).unwrap();
        assert_eq!(json, "\"max_iteration_reached\"");
    }
}
