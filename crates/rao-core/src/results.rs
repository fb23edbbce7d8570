//! Snapshots produced by the sensitivity engine and by the optimizer.

use crate::cnec::FlowCnec;
use crate::units::{Side, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Tolerance under which two setpoints are considered equal.
pub const SETPOINT_TOLERANCE: f64 = 1e-6;

/// Status of a sensitivity computation, globally or for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    #[default]
    Default,
    Failure,
}

impl fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputationStatus::Default => write!(f, "default"),
            ComputationStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A pair of optional values, one per branch side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerSide {
    pub left: Option<f64>,
    pub right: Option<f64>,
}

impl PerSide {
    pub fn get(&self, side: Side) -> Option<f64> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn set(&mut self, side: Side, value: f64) {
        match side {
            Side::Left => self.left = Some(value),
            Side::Right => self.right = Some(value),
        }
    }
}

/// Flows on monitored elements, keyed by CNEC id.
#[derive(Debug, Clone, Default)]
pub struct FlowResult {
    flows: HashMap<String, PerSide>,
    intensities: HashMap<String, PerSide>,
    ptdf_zonal_sums: HashMap<String, PerSide>,
    commercial_flows: HashMap<String, PerSide>,
}

impl FlowResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flow(&mut self, cnec_id: &str, side: Side, flow_mw: f64) {
        self.flows.entry(cnec_id.to_string()).or_default().set(side, flow_mw);
    }

    pub fn set_intensity(&mut self, cnec_id: &str, side: Side, intensity_a: f64) {
        self.intensities
            .entry(cnec_id.to_string())
            .or_default()
            .set(side, intensity_a);
    }

    pub fn set_ptdf_zonal_sum(&mut self, cnec_id: &str, side: Side, value: f64) {
        self.ptdf_zonal_sums
            .entry(cnec_id.to_string())
            .or_default()
            .set(side, value);
    }

    pub fn set_commercial_flow(&mut self, cnec_id: &str, side: Side, flow_mw: f64) {
        self.commercial_flows
            .entry(cnec_id.to_string())
            .or_default()
            .set(side, flow_mw);
    }

    pub fn has_flow(&self, cnec_id: &str, side: Side) -> bool {
        self.flows.get(cnec_id).and_then(|f| f.get(side)).is_some()
    }

    /// Flow in `unit`, `NaN` when the element was not computed.
    pub fn flow(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        let mw = self.flows.get(&cnec.id).and_then(|f| f.get(side));
        match unit {
            Unit::Megawatt => mw.unwrap_or(f64::NAN),
            Unit::Ampere => self
                .intensities
                .get(&cnec.id)
                .and_then(|i| i.get(side))
                .or_else(|| mw.map(|v| v * cnec.unit_multiplier(side, Unit::Ampere)))
                .unwrap_or(f64::NAN),
        }
    }

    /// Smallest margin over the monitored sides of `cnec`.
    pub fn margin(&self, cnec: &FlowCnec, unit: Unit) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| cnec.compute_margin(self.flow(cnec, side, unit), side, unit))
            .fold(f64::INFINITY, f64::min)
    }

    /// Margin where positive values are divided by the PTDF zonal sum,
    /// clipped below by `ptdf_sum_lower_bound`.
    pub fn relative_margin(&self, cnec: &FlowCnec, unit: Unit, ptdf_sum_lower_bound: f64) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| {
                let margin = cnec.compute_margin(self.flow(cnec, side, unit), side, unit);
                if margin > 0.0 {
                    margin / self.ptdf_zonal_sum(cnec, side).max(ptdf_sum_lower_bound)
                } else {
                    margin
                }
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Absolute PTDF zonal sum, 0 when unknown.
    pub fn ptdf_zonal_sum(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.ptdf_zonal_sums
            .get(&cnec.id)
            .and_then(|p| p.get(side))
            .unwrap_or(0.0)
    }

    /// Commercial flow in `unit`, 0 when unknown.
    pub fn commercial_flow(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        self.commercial_flows
            .get(&cnec.id)
            .and_then(|c| c.get(side))
            .unwrap_or(0.0)
            * cnec.unit_multiplier(side, unit)
    }

    pub fn loop_flow(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        self.flow(cnec, side, unit) - self.commercial_flow(cnec, side, unit)
    }

    /// Replace the commercial flows with those of `other`.
    pub fn with_commercial_flows_from(mut self, other: &FlowResult) -> Self {
        self.commercial_flows = other.commercial_flows.clone();
        self
    }

    /// Replace the PTDF zonal sums with those of `other`.
    pub fn with_ptdf_zonal_sums_from(mut self, other: &FlowResult) -> Self {
        self.ptdf_zonal_sums = other.ptdf_zonal_sums.clone();
        self
    }
}

/// Linear sensitivities of flows to range-action setpoints.
#[derive(Debug, Clone, Default)]
pub struct SensitivityResult {
    status: ComputationStatus,
    state_status: BTreeMap<String, ComputationStatus>,
    // cnec id → range action id → dMW / dsetpoint
    sensitivities: HashMap<String, HashMap<String, PerSide>>,
}

impl SensitivityResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result carrying only a global failure.
    pub fn failed() -> Self {
        Self {
            status: ComputationStatus::Failure,
            ..Self::default()
        }
    }

    pub fn status(&self) -> ComputationStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ComputationStatus) {
        self.status = status;
    }

    pub fn set_state_status(&mut self, state: &str, status: ComputationStatus) {
        self.state_status.insert(state.to_string(), status);
    }

    /// Status of `state`, falling back to the global status.
    pub fn status_for_state(&self, state: &str) -> ComputationStatus {
        if self.status == ComputationStatus::Failure {
            return ComputationStatus::Failure;
        }
        self.state_status.get(state).copied().unwrap_or(self.status)
    }

    pub fn failed_states(&self) -> Vec<&str> {
        self.state_status
            .iter()
            .filter(|(_, s)| **s == ComputationStatus::Failure)
            .map(|(state, _)| state.as_str())
            .collect()
    }

    pub fn set_sensitivity(&mut self, cnec_id: &str, side: Side, range_action_id: &str, value: f64) {
        self.sensitivities
            .entry(cnec_id.to_string())
            .or_default()
            .entry(range_action_id.to_string())
            .or_default()
            .set(side, value);
    }

    /// Sensitivity in MW per setpoint unit, 0 when unknown.
    pub fn sensitivity(&self, cnec_id: &str, side: Side, range_action_id: &str) -> f64 {
        self.sensitivities
            .get(cnec_id)
            .and_then(|by_ra| by_ra.get(range_action_id))
            .and_then(|s| s.get(side))
            .unwrap_or(0.0)
    }
}

/// Optimized setpoints keyed by range action id, in deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionSetpoints(BTreeMap<String, f64>);

impl RangeActionSetpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, range_action_id: &str) -> Option<f64> {
        self.0.get(range_action_id).copied()
    }

    pub fn set(&mut self, range_action_id: &str, setpoint: f64) {
        self.0.insert(range_action_id.to_string(), setpoint);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(id, v)| (id.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any setpoint moved by more than [`SETPOINT_TOLERANCE`].
    pub fn differs_from(&self, other: &RangeActionSetpoints) -> bool {
        self.0.iter().any(|(id, v)| match other.get(id) {
            Some(o) => (v - o).abs() >= SETPOINT_TOLERANCE,
            None => true,
        })
    }

    /// Ids whose setpoint differs from `reference`.
    pub fn activated_against(&self, reference: &RangeActionSetpoints) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(id, v)| reference.get(id).map_or(true, |r| (*v - r).abs() >= SETPOINT_TOLERANCE))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl FromIterator<(String, f64)> for RangeActionSetpoints {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_takes_worst_side() {
        let cnec = FlowCnec::new("line", "preventive")
            .with_threshold(Side::Left, None, Some(100.0))
            .with_threshold(Side::Right, None, Some(80.0));
        let mut flows = FlowResult::new();
        flows.set_flow("line", Side::Left, 50.0);
        flows.set_flow("line", Side::Right, 60.0);
        assert!((flows.margin(&cnec, Unit::Megawatt) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn relative_margin_only_divides_positive_margins() {
        let cnec = FlowCnec::new("line", "preventive").with_threshold(Side::Left, None, Some(100.0));
        let mut flows = FlowResult::new();
        flows.set_flow("line", Side::Left, 90.0);
        flows.set_ptdf_zonal_sum("line", Side::Left, 0.5);
        assert!((flows.relative_margin(&cnec, Unit::Megawatt, 0.01) - 20.0).abs() < 1e-12);

        flows.set_flow("line", Side::Left, 110.0);
        assert!((flows.relative_margin(&cnec, Unit::Megawatt, 0.01) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn ampere_flow_falls_back_to_conversion() {
        let cnec = FlowCnec::new("line", "preventive").with_symmetric_limit(100.0);
        let mut flows = FlowResult::new();
        flows.set_flow("line", Side::Left, 100.0);
        let expected = 100.0 * cnec.unit_multiplier(Side::Left, Unit::Ampere);
        assert!((flows.flow(&cnec, Side::Left, Unit::Ampere) - expected).abs() < 1e-9);
        flows.set_intensity("line", Side::Left, 150.0);
        assert_eq!(flows.flow(&cnec, Side::Left, Unit::Ampere), 150.0);
        assert!(flows.flow(&cnec, Side::Right, Unit::Megawatt).is_nan());
    }

    #[test]
    fn state_status_falls_back_to_global() {
        let mut sensi = SensitivityResult::new();
        sensi.set_state_status("co1", ComputationStatus::Failure);
        assert_eq!(sensi.status_for_state("co1"), ComputationStatus::Failure);
        assert_eq!(sensi.status_for_state("preventive"), ComputationStatus::Default);
        assert_eq!(sensi.failed_states(), vec!["co1"]);
        assert_eq!(SensitivityResult::failed().status_for_state("preventive"), ComputationStatus::Failure);
    }

    #[test]
    fn setpoint_changes_use_tolerance() {
        let a: RangeActionSetpoints = [("pst".to_string(), 1.0)].into_iter().collect();
        let b: RangeActionSetpoints = [("pst".to_string(), 1.0 + 1e-8)].into_iter().collect();
        let c: RangeActionSetpoints = [("pst".to_string(), 1.1)].into_iter().collect();
        assert!(!a.differs_from(&b));
        assert!(a.differs_from(&c));
        assert_eq!(c.activated_against(&a), vec!["pst"]);
    }
}
