//! # rao-search: search-tree remedial-action optimizer
//!
//! Finds the combination of network actions (topology changes) and range
//! action setpoints (PST taps, HVDC and injection setpoints) that maximises the
//! minimum flow margin of a perimeter.
//!
//! ## Architecture
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Tree | [`search_tree`] | Depth-by-depth exploration of network action combinations |
//! | Candidates | [`bloomer`], [`filters`] | Combinations to try from a leaf, filtered by usage limits |
//! | Leaf | [`leaf`] | One network copy, evaluated then optimized |
//! | Range actions | [`linear_optimizer`], [`range_action_limiter`] | Iterating MILP with relinearisation and rounding |
//! | Linear problem | [`linear_problem`], [`fillers`] | Variables and constraints filled by a filler chain, solved with `good_lp` |
//! | Cost | [`objective`] | Functional (min margin) and virtual (penalty) costs |
//!
//! ## Example
//!
//! ```no_run
//! use rao_search::{OptimizationPerimeter, PrePerimeterResult, RaoParameters, SearchTree, SearchTreeParameters};
//! use rao_core::synthetic::{LinearNetwork, LinearSensitivityProvider};
//! use rao_core::{FlowCnec, NetworkAction};
//! use std::sync::Arc;
//!
//! # fn main() -> rao_core::RaoResult<()> {
//! let network = LinearNetwork::new("case")
//!     .with_flow("line", 120.0)
//!     .with_flow_shift("open", &[("line", -30.0)]);
//! let perimeter = OptimizationPerimeter::new(
//!     "preventive",
//!     vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)],
//!     vec![NetworkAction::new("open")],
//!     vec![],
//! )?;
//! let provider = Arc::new(LinearSensitivityProvider::new());
//! let pre = PrePerimeterResult::compute(&network, &perimeter, provider.as_ref())?;
//! let params = SearchTreeParameters::preventive(&RaoParameters::default())?;
//! let result = SearchTree::new(network, perimeter, pre, provider, params)?.run();
//! println!("{}", result.best_leaf);
//! # Ok(())
//! # }
//! ```

pub mod bloomer;
pub mod fillers;
pub mod filters;
pub mod leaf;
pub mod linear_optimizer;
pub mod linear_problem;
pub mod logging;
pub mod objective;
pub mod parameters;
pub mod perimeter;
pub mod range_action_limiter;
pub mod search_tree;

pub use leaf::{ActivatedActions, Leaf, LeafStatus};
pub use linear_problem::{GoodLpBackend, LinearProblem, LinearProblemStatus, LpSolverKind, SolverBackend};
pub use objective::{ObjectiveFunction, ObjectiveFunctionResult};
pub use parameters::{RaoParameters, SearchTreeParameters, StopCriterion, TargetTieBreak, TreeParameters};
pub use perimeter::{OptimizationPerimeter, PrePerimeterResult};
pub use search_tree::{SearchTree, SearchTreeResult};
