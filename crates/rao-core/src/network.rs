//! Contracts of the external collaborators: the mutable network model and the
//! sensitivity engine.
//!
//! Each leaf of the search tree owns its own [`NetworkState`] (cloned from the
//! perimeter's base network), so implementations never need interior locking.

use crate::actions::{NetworkAction, RangeAction};
use crate::cnec::FlowCnec;
use crate::error::RaoResult;
use crate::results::{FlowResult, SensitivityResult};

/// A network that remedial actions can be applied to.
pub trait NetworkState: Clone + Send + Sync {
    /// Name of the network, used to seed tie-breaking noise
    fn name(&self) -> &str;

    fn apply_network_action(&mut self, action: &NetworkAction) -> RaoResult<()>;

    fn apply_range_action_setpoint(&mut self, action: &RangeAction, setpoint: f64) -> RaoResult<()>;

    /// Setpoint currently applied for `action`.
    fn range_action_setpoint(&self, action: &RangeAction) -> RaoResult<f64>;
}

/// Output of one sensitivity computation.
#[derive(Debug, Clone, Default)]
pub struct SensitivityComputation {
    pub flows: FlowResult,
    pub sensitivities: SensitivityResult,
}

/// Load-flow and sensitivity engine.
///
/// Failures are reported through [`SensitivityResult::status`] rather than as
/// errors: a failed computation only disqualifies the leaf that asked for it.
pub trait SensitivityProvider<N: NetworkState>: Send + Sync {
    fn compute(&self, network: &N, cnecs: &[FlowCnec], range_actions: &[RangeAction]) -> SensitivityComputation;
}
