//! # rao-core: data model for remedial-action optimisation
//!
//! Shared types for the search-tree optimizer in `rao-search`:
//!
//! - [`FlowCnec`]: monitored branches with per-side thresholds
//! - [`NetworkAction`] / [`RangeAction`]: discrete and continuous remedial actions
//! - [`NetworkActionCombination`]: candidate action sets explored by the tree
//! - [`FlowResult`] / [`SensitivityResult`]: snapshots from the sensitivity engine
//! - [`NetworkState`] / [`SensitivityProvider`]: contracts of the external network
//!   model and load-flow engine
//!
//! The [`synthetic`] module provides a deterministic linear network that
//! implements both contracts.

pub mod actions;
pub mod cnec;
pub mod combination;
pub mod error;
pub mod network;
pub mod results;
pub mod synthetic;
pub mod units;

pub use actions::{
    Appliable, Boundable, ElementaryAction, NetworkAction, PerCategory, PstTapTable, RangeAction,
    RangeActionCategory, RangeActionKind, RangeActionSetpoint, SensitivityHandled, SwitchState,
    UsageMethod,
};
pub use cnec::{largest_cnec_threshold, FlowCnec, FlowThreshold};
pub use combination::NetworkActionCombination;
pub use error::{RaoError, RaoResult};
pub use network::{NetworkState, SensitivityComputation, SensitivityProvider};
pub use results::{
    ComputationStatus, FlowResult, PerSide, RangeActionSetpoints, SensitivityResult,
    SETPOINT_TOLERANCE,
};
pub use units::{flow_unit_multiplier, Side, Unit};
