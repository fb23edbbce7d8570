//! Logging setup and the summaries printed while the tree runs.
//!
//! Two targets separate user-facing summaries from optimizer internals:
//!
//! - [`BUSINESS`]: best leaf per depth, limiting elements, final summary
//! - [`TECHNICAL`]: iterations, filter counts, skipped leaves
//!
//! ```text
//! RUST_LOG=rao::business=info,rao::technical=debug
//! ```

use crate::leaf::Leaf;
use crate::objective::ObjectiveFunctionResult;
use rao_core::{NetworkState, RangeAction, RangeActionSetpoints, Unit};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const BUSINESS: &str = "rao::business";
pub const TECHNICAL: &str = "rao::technical";

/// Install a stderr subscriber honouring `RUST_LOG`, `default_level` otherwise.
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Log the `n` smallest margins of `objective`.
pub fn log_most_limiting_elements(prefix: &str, objective: &ObjectiveFunctionResult, unit: Unit, n: usize) {
    let elements = objective.most_limiting_elements(n);
    if elements.is_empty() {
        info!(target: BUSINESS, "{}: no limiting element", prefix);
        return;
    }
    for (rank, element) in elements.iter().enumerate() {
        info!(
            target: BUSINESS,
            "{}: limiting element #{:02}: margin = {:.2} {}, element {}",
            prefix,
            rank + 1,
            element.value,
            unit,
            element.cnec_id
        );
    }
    for name in objective.virtual_cost_names() {
        for element in objective.costly_elements(name, n) {
            info!(
                target: BUSINESS,
                "{}: {} violation of {:.2} on element {}",
                prefix,
                name,
                element.value,
                element.cnec_id
            );
        }
    }
}

/// Log the range actions moved away from their pre-perimeter setpoint.
pub fn log_range_actions(
    prefix: &str,
    range_actions: &[RangeAction],
    setpoints: &RangeActionSetpoints,
    pre_perimeter_setpoints: &RangeActionSetpoints,
) {
    let moved: Vec<String> = range_actions
        .iter()
        .filter_map(|ra| {
            let value = setpoints.get(&ra.id)?;
            let previous = pre_perimeter_setpoints.get(&ra.id)?;
            ((value - previous).abs() >= rao_core::SETPOINT_TOLERANCE).then(|| format!("{}: {:.2}", ra.name, value))
        })
        .collect();
    if moved.is_empty() {
        info!(target: BUSINESS, "{}: no range action activated", prefix);
    } else {
        info!(target: BUSINESS, "{}: range action(s): {}", prefix, moved.join(", "));
    }
}

/// Compare the situation before and after optimization.
pub fn log_optimization_summary<N: NetworkState>(
    perimeter: &str,
    functional_name: &str,
    initial: &ObjectiveFunctionResult,
    best: &Leaf<N>,
) {
    let network_actions: Vec<&str> = best.network_actions().iter().map(|a| a.name.as_str()).collect();
    info!(
        target: BUSINESS,
        "Scenario \"{}\": initial cost = {:.2} ({}: {:.2}, virtual: {:.2}), \
         network action(s) activated: {}, final cost = {:.2} ({}: {:.2}, virtual: {:.2})",
        perimeter,
        initial.cost(),
        functional_name,
        initial.functional_cost(),
        initial.virtual_cost(),
        if network_actions.is_empty() { "none".to_string() } else { network_actions.join(", ") },
        best.cost(),
        functional_name,
        best.functional_cost(),
        best.virtual_cost()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_installs_a_single_subscriber() {
        // another test may already own the global subscriber
        let _ = init_tracing("debug");
        assert!(!init_tracing("debug"));
        assert!(!init_tracing("not a directive ["));
    }
}
