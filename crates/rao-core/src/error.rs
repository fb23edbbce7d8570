//! Error types shared by the optimizer crates.
//!
//! Configuration problems and programming-contract violations are reported
//! through [`RaoError`]. Computation failures (sensitivity engine failure,
//! infeasible linear problems) are *not* errors: they travel as statuses on
//! results so that a single failing leaf never aborts a search.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn check_depth(depth: usize) -> RaoResult<()> {
//!     if depth == 0 {
//!         return Err(RaoError::Config("search depth must be positive".into()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Error type for all RAO operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (parameter files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid or contradictory parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inconsistent input data (thresholds, ranges, identifiers)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Linear solver errors that cannot be mapped to a problem status
    #[error("Solver error: {0}")]
    Solver(String),

    /// Sensitivity engine errors raised outside of a leaf evaluation
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// Network mutation errors (unknown element, unsupported action)
    #[error("Network error: {0}")]
    Network(String),

    /// A problem filler referenced a variable or constraint that does not
    /// exist, or tried to create one twice
    #[error("Linear problem contract violated: {0}")]
    Contract(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for RaoError {
    fn from(err: toml::de::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for RaoError {
    fn from(err: toml::ser::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}
